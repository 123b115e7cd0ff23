use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Error};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

/// Dynamically shaped node decoded from a graph query response.
///
/// Responses carry no fixed schema, so every node is one of the JSON shapes. Objects keep their
/// keys in the order they were received, which keeps aliased field extraction reproducible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseNode {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ResponseNode>),
    Object(ObjectNode),
}

impl Default for ResponseNode {
    fn default() -> Self {
        Self::Null
    }
}

impl ResponseNode {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ResponseNode]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Looks up `key` when this node is an object.
    pub fn get(&self, key: &str) -> Option<&ResponseNode> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Short description of the node's shape for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }
}

/// Tag-value rendering: strings are written verbatim, other scalars in JSON notation and
/// composite nodes as compact JSON.
impl fmt::Display for ResponseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
            composite => {
                let rep = serde_json::to_string(composite).map_err(|_| fmt::Error)?;
                f.write_str(&rep)
            },
        }
    }
}

impl From<&str> for ResponseNode {
    fn from(that: &str) -> Self {
        Self::String(that.to_string())
    }
}

impl From<String> for ResponseNode {
    fn from(that: String) -> Self {
        Self::String(that)
    }
}

impl From<bool> for ResponseNode {
    fn from(that: bool) -> Self {
        Self::Bool(that)
    }
}

impl From<i64> for ResponseNode {
    fn from(that: i64) -> Self {
        Self::Number(that.into())
    }
}

impl From<Vec<ResponseNode>> for ResponseNode {
    fn from(that: Vec<ResponseNode>) -> Self {
        Self::List(that)
    }
}

impl From<ObjectNode> for ResponseNode {
    fn from(that: ObjectNode) -> Self {
        Self::Object(that)
    }
}

/// Keyed mapping with unique keys, iterated in insertion order. Lookups go through a key index,
/// so building or probing a wide object stays linear in its size.
#[derive(Default, Clone)]
pub struct ObjectNode {
    entries: Vec<(String, ResponseNode)>,
    index: HashMap<String, usize>,
}

impl ObjectNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ResponseNode> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// Inserts the entry, replacing the value in place when the key is already present so that
    /// keys stay unique.
    pub fn insert(&mut self, key: impl Into<String>, value: ResponseNode) -> Option<ResponseNode> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResponseNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for ObjectNode {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for ObjectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl<K: Into<String>> FromIterator<(K, ResponseNode)> for ObjectNode {
    fn from_iter<I: IntoIterator<Item = (K, ResponseNode)>>(iter: I) -> Self {
        let mut object = Self::new();
        for (k, v) in iter {
            object.insert(k, v);
        }
        object
    }
}

impl Serialize for ResponseNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            },
            Self::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (k, v) in object.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            },
        }
    }
}

impl<'de> Deserialize<'de> for ResponseNode {
    fn deserialize<D>(deserializer: D) -> Result<ResponseNode, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NodeVisitor;

        impl<'de> de::Visitor<'de> for NodeVisitor {
            type Value = ResponseNode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any valid graph query response value")
            }

            #[inline]
            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E> {
                Ok(ResponseNode::Bool(value))
            }

            #[inline]
            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
                Ok(ResponseNode::Number(value.into()))
            }

            #[inline]
            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
                Ok(ResponseNode::Number(value.into()))
            }

            #[inline]
            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E> {
                // json cannot carry NaN or infinities; treat them as absent
                Ok(Number::from_f64(value).map_or(ResponseNode::Null, ResponseNode::Number))
            }

            #[inline]
            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                self.visit_string(String::from(value))
            }

            #[inline]
            fn visit_string<E>(self, value: String) -> Result<Self::Value, E> {
                Ok(ResponseNode::String(value))
            }

            #[inline]
            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(ResponseNode::Null)
            }

            #[inline]
            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            #[inline]
            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(ResponseNode::Null)
            }

            fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut items = Vec::with_capacity(visitor.size_hint().unwrap_or(0));
                while let Some(item) = visitor.next_element()? {
                    items.push(item);
                }
                Ok(ResponseNode::List(items))
            }

            fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut object = ObjectNode::with_capacity(visitor.size_hint().unwrap_or(0).min(4096));
                while let Some((key, value)) = visitor.next_entry::<String, ResponseNode>()? {
                    object.insert(key, value);
                }
                Ok(ResponseNode::Object(object))
            }
        }

        deserializer.deserialize_any(NodeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use claim::*;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_object_keeps_insertion_order() {
        let node: ResponseNode = assert_ok!(serde_json::from_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#));
        let keys: Vec<&str> = assert_some!(node.as_object()).iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_duplicate_key_replaces_in_place() {
        let node: ResponseNode = assert_ok!(serde_json::from_str(r#"{"a": 1, "b": 2, "a": 3}"#));
        let object = assert_some!(node.as_object());
        assert_eq!(object.len(), 2);
        assert_eq!(object.get("a"), Some(&ResponseNode::from(3_i64)));
        assert_eq!(object.iter().next().map(|(k, _)| k), Some("a"));
    }

    #[test]
    fn test_decode_wide_object() {
        const WIDTH: usize = 20_000;
        let mut body = String::from("{");
        for i in 0..WIDTH {
            body.push_str(&format!(r#""k{}": {},"#, i, i));
        }
        body.push_str(r#""k0": "last"}"#);

        let node: ResponseNode = assert_ok!(serde_json::from_str(&body));
        let object = assert_some!(node.as_object());
        assert_eq!(object.len(), WIDTH);
        assert_eq!(object.get("k0"), Some(&ResponseNode::from("last")));
        assert_eq!(object.get("k19999"), Some(&ResponseNode::from(19_999_i64)));
        assert_none!(object.get("k20000"));

        let keys: Vec<&str> = object.iter().map(|(k, _)| k).take(3).collect();
        assert_eq!(keys, vec!["k0", "k1", "k2"]);
        assert_eq!(object.iter().last().map(|(k, _)| k), Some("k19999"));
    }

    #[test]
    fn test_object_equality_ignores_lookup_index() {
        let mut replaced = ObjectNode::new();
        replaced.insert("a", ResponseNode::from(1_i64));
        replaced.insert("b", ResponseNode::from(2_i64));
        replaced.insert("a", ResponseNode::from(3_i64));

        let direct: ObjectNode = vec![("a", ResponseNode::from(3_i64)), ("b", ResponseNode::from(2_i64))]
            .into_iter()
            .collect();
        assert_eq!(replaced, direct);
        assert!(format!("{:?}", direct).starts_with(r#"{"a": "#));
    }

    #[test]
    fn test_decode_heterogeneous_tree() {
        let node: ResponseNode = assert_ok!(serde_json::from_str(
            r#"{"list": [true, null, 1.5, "x", {"nested": []}], "n": -7}"#
        ));

        let list = assert_some!(node.get("list").and_then(|l| l.as_list()));
        assert_eq!(list.len(), 5);
        assert_eq!(list[0], ResponseNode::Bool(true));
        assert_eq!(list[1], ResponseNode::Null);
        assert_eq!(list[2].kind(), "number");
        assert_eq!(list[3], ResponseNode::from("x"));
        assert_eq!(list[4].get("nested"), Some(&ResponseNode::List(vec![])));
        assert_eq!(node.get("n"), Some(&ResponseNode::from(-7_i64)));
    }

    #[test]
    fn test_display_as_tag_value() {
        assert_eq!(ResponseNode::from("NYC").to_string(), "NYC");
        assert_eq!(ResponseNode::from(42_i64).to_string(), "42");
        assert_eq!(ResponseNode::Bool(false).to_string(), "false");
        assert_eq!(ResponseNode::Null.to_string(), "null");

        let coords: ResponseNode = assert_ok!(serde_json::from_str(r#"{"lat": 40.7, "tags": ["a", "b"]}"#));
        assert_eq!(coords.to_string(), r#"{"lat":40.7,"tags":["a","b"]}"#);
    }
}
