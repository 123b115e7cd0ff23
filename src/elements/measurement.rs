use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, FieldValue>;

/// Typed value of a measurement field. Enrichment never reads or alters fields; they are carried
/// through as collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(that: bool) -> Self {
        Self::Boolean(that)
    }
}

impl From<i64> for FieldValue {
    fn from(that: i64) -> Self {
        Self::Integer(that)
    }
}

impl From<f64> for FieldValue {
    fn from(that: f64) -> Self {
        Self::Float(that)
    }
}

impl From<&str> for FieldValue {
    fn from(that: &str) -> Self {
        Self::Text(that.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(that: String) -> Self {
        Self::Text(that)
    }
}

/// A timestamped, named record of string tags and typed fields collected by an upstream stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub fields: Fields,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            fields: Fields::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, ..self }
    }

    #[inline]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_str())
    }

    /// Sets the tag, returning any value it replaced.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.tags.insert(key.into(), value.into())
    }

    /// Identity used when reporting on this measurement: its name and tag set.
    pub fn identity(&self) -> MeasurementIdentity<'_> {
        MeasurementIdentity(self)
    }
}

pub struct MeasurementIdentity<'m>(&'m Measurement);

impl fmt::Display for MeasurementIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)?;
        if !self.0.tags.is_empty() {
            let tags: Vec<String> = self.0.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, ",{}", tags.join(","))?;
        }
        Ok(())
    }
}
