use std::collections::{BTreeMap, HashMap};

use super::template::AliasMap;
use crate::elements::ResponseNode;

/// Flat mapping of clean tag key to stringified value found in a response.
pub type ExtractionResult = BTreeMap<String, String>;

/// Walks the response tree depth-first, in key insertion order, collecting every field whose key
/// is an alias marker. Matching values are recorded under their clean key and still descended
/// into, since they may carry nested aliased fields. When several nodes share a marker, the last
/// one visited wins.
pub fn extract_aliased_fields(node: &ResponseNode, aliases: &AliasMap) -> ExtractionResult {
    let by_marker: HashMap<&str, &str> = aliases
        .iter()
        .map(|(clean_key, marker)| (marker.as_str(), clean_key.as_str()))
        .collect();

    let mut result = ExtractionResult::new();
    if !by_marker.is_empty() {
        visit(node, &by_marker, &mut result);
    }
    result
}

fn visit(node: &ResponseNode, by_marker: &HashMap<&str, &str>, result: &mut ExtractionResult) {
    match node {
        ResponseNode::Object(object) => {
            for (key, value) in object.iter() {
                if let Some(clean_key) = by_marker.get(key) {
                    result.insert(clean_key.to_string(), value.to_string());
                }
                visit(value, by_marker, result);
            }
        },
        ResponseNode::List(items) => {
            for item in items {
                visit(item, by_marker, result);
            }
        },
        ResponseNode::Null | ResponseNode::Bool(_) | ResponseNode::Number(_) | ResponseNode::String(_) => (),
    }
}
