use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::enrich::{normalize_max_parallel, TemplatePolicy, DEFAULT_MAX_PARALLEL};
use crate::error::SettingsError;

pub const DEFAULT_ROOT_ELEMENT: &str = "__root_element";

/// Scheme prefixing the token in the `Authorization` header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Token,
    Bearer,
}

impl Default for AuthScheme {
    fn default() -> Self {
        Self::Token
    }
}

impl AuthScheme {
    pub fn authorization(&self, token: &str) -> String {
        let scheme = match self {
            Self::Token => "Token",
            Self::Bearer => "Bearer",
        };
        format!("{} {}", scheme, token)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Graph query template, using `$variables` bound from measurement tags and `__tag_` aliases
    /// selecting the fields to merge back.
    pub query: String,

    pub url: Url,

    pub token: String,

    #[serde(default)]
    pub auth_scheme: AuthScheme,

    /// Key under the response `data` object holding the node to extract from.
    #[serde(default = "EnrichmentSettings::default_root_element")]
    pub root_element: String,

    /// Maximum concurrent enrichments in the streaming pipeline. Values below 1 are corrected to
    /// the default.
    #[serde(default = "EnrichmentSettings::default_max_parallel")]
    pub max_parallel: i64,

    #[serde(
        default,
        rename = "timeout_secs",
        serialize_with = "crate::serde::serialize_optional_duration_secs",
        deserialize_with = "crate::serde::deserialize_optional_duration_secs"
    )]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub template_policy: TemplatePolicy,
}

impl EnrichmentSettings {
    fn default_root_element() -> String {
        DEFAULT_ROOT_ELEMENT.to_string()
    }

    fn default_max_parallel() -> i64 {
        DEFAULT_MAX_PARALLEL as i64
    }

    pub fn effective_max_parallel(&self) -> usize {
        normalize_max_parallel(self.max_parallel)
    }
}

impl fmt::Debug for EnrichmentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentSettings")
            .field("query", &self.query)
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .field("auth_scheme", &self.auth_scheme)
            .field("root_element", &self.root_element)
            .field("max_parallel", &self.max_parallel)
            .field("timeout", &self.timeout)
            .field("template_policy", &self.template_policy)
            .finish()
    }
}

/// Loads settings from the optional configuration file, then from `APP__`-prefixed environment
/// variables; e.g., `APP__MAX_PARALLEL=4` sets `max_parallel`.
#[tracing::instrument(level = "info")]
pub fn load_settings(config_path: Option<&Path>) -> Result<EnrichmentSettings, SettingsError> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings: EnrichmentSettings = builder
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    tracing::info!(?settings, "enrichment settings loaded");
    Ok(settings)
}
