use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// Alias prefix marking a query field whose value becomes a measurement tag.
pub const TAG_MARKER_PREFIX: &str = "__tag_";

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\w+)").expect("failed to compile query variable pattern"));

static TAG_ALIAS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(__tag_[a-zA-Z0-9_]+)\s*:\s*[a-zA-Z0-9_]+").expect("failed to compile tag alias pattern")
});

/// Mapping from clean tag key to the aliased field marker in the query; e.g.,
/// `"site" -> "__tag_site"`.
pub type AliasMap = BTreeMap<String, String>;

/// Finds the query variables (`$name`) referenced in the template, de-duplicated in first-seen
/// order. A template without variables yields an empty set.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    VARIABLE_PATTERN
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .filter(|name| seen.insert(*name))
        .map(|name| name.to_string())
        .collect()
}

/// Finds aliased tag fields (`__tag_<key>: <field>`) in the template. When two markers share a
/// clean key the later occurrence wins.
pub fn extract_alias_map(template: &str) -> AliasMap {
    TAG_ALIAS_PATTERN
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|marker| {
            let marker = marker.as_str();
            let key = marker.trim_start_matches(TAG_MARKER_PREFIX);
            (key.to_string(), marker.to_string())
        })
        .collect()
}

/// Query template text paired with its variable set and alias map. Analysis happens once, at
/// construction; the result is immutable and cheap to share across workers.
#[derive(Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    text: Arc<str>,
    variables: Vec<String>,
    aliases: AliasMap,
}

impl QueryTemplate {
    #[tracing::instrument(level = "debug", skip(text))]
    pub fn parse(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let variables = extract_variables(&text);
        let aliases = extract_alias_map(&text);
        tracing::debug!(?variables, ?aliases, "analyzed query template");
        Self { text, variables, aliases }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    #[inline]
    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    /// A template without tag aliases can never add tags to a measurement.
    pub fn is_inert(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl fmt::Debug for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTemplate")
            .field("variables", &self.variables)
            .field("aliases", &self.aliases)
            .field("text_len", &self.text.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const NETBOX_QUERY: &str = r#"
      query ($url: String) {
        __root_element: device_list(filters: {name: {exact: $url}}) {
          __tag_status: status
          site {
            __tag_site: name
            __tag_latitude: latitude
            __tag_longitude: longitude
            __tag_address: physical_address
          }
        }
      }
    "#;

    #[test]
    fn test_extract_variables_dedups_in_first_seen_order() {
        let template = "query($b: String, $a: String) { x(b: $b, a: $a, again: $b) }";
        assert_eq!(extract_variables(template), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(extract_variables(NETBOX_QUERY), vec!["url".to_string()]);
    }

    #[test]
    fn test_extract_variables_none_found() {
        assert!(extract_variables("{ device_list { name } }").is_empty());
        assert!(extract_variables("").is_empty());
    }

    #[test]
    fn test_extract_alias_map() {
        let template = "{ __tag_status: status site { __tag_site: site_name } }";
        let expected = maplit::btreemap! {
            "status".to_string() => "__tag_status".to_string(),
            "site".to_string() => "__tag_site".to_string(),
        };
        assert_eq!(extract_alias_map(template), expected);

        let aliases = extract_alias_map(NETBOX_QUERY);
        assert_eq!(aliases.len(), 5);
        assert_eq!(aliases.get("address").map(|s| s.as_str()), Some("__tag_address"));
    }

    #[test]
    fn test_alias_map_ignores_non_tag_aliases_and_bare_markers() {
        let template = "{ __root_element: item { __tag_name: name __tag_orphan other: __tag_x } }";
        let expected = maplit::btreemap! { "name".to_string() => "__tag_name".to_string() };
        assert_eq!(extract_alias_map(template), expected);
    }

    #[test]
    fn test_malformed_template_yields_partial_analysis() {
        let template = QueryTemplate::parse("query($id { __tag_name: name ");
        assert_eq!(template.variables(), &["id".to_string()]);
        assert_eq!(template.aliases().len(), 1);
        assert!(!template.is_inert());

        let inert = QueryTemplate::parse("not a query at all");
        assert!(inert.variables().is_empty());
        assert!(inert.is_inert());
    }
}
