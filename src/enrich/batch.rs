use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::client::QueryVariables;
use super::enricher::{Enricher, Enrichment};
use super::template::QueryTemplate;
use crate::elements::Measurement;

/// When the batch controller analyzes its query template.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatePolicy {
    /// Analyze once, when the template is set.
    Cached,
    /// Analyze the current template text at the start of every `apply`.
    ReparseEachApply,
}

impl Default for TemplatePolicy {
    fn default() -> Self {
        Self::Cached
    }
}

/// Synchronous batch enrichment.
///
/// Each template variable is bound on its own: for every variable, every measurement carrying it
/// as a tag gets one round trip binding just that variable. Measurements are processed one at a
/// time and returned in input order.
pub struct BatchEnrichment {
    enricher: Enricher,
    template_text: Arc<str>,
    policy: TemplatePolicy,
}

impl BatchEnrichment {
    pub fn new(enricher: Enricher, policy: TemplatePolicy) -> Self {
        let template_text = Arc::from(enricher.template().text());
        Self { enricher, template_text, policy }
    }

    pub fn policy(&self) -> TemplatePolicy {
        self.policy
    }

    pub fn template_text(&self) -> &str {
        &self.template_text
    }

    /// Replaces the query template. Under `Cached` the new text is analyzed immediately.
    pub fn set_template(&mut self, text: impl Into<Arc<str>>) {
        self.template_text = text.into();
        if self.policy == TemplatePolicy::Cached {
            self.reanalyze();
        }
    }

    fn reanalyze(&mut self) {
        let template = QueryTemplate::parse(Arc::clone(&self.template_text));
        self.enricher = self.enricher.with_template(Arc::new(template));
    }

    #[tracing::instrument(level = "debug", skip(self, measurements), fields(enricher=%self.enricher.name(), nr_measurements=%measurements.len(), policy=?self.policy))]
    pub async fn apply(&mut self, mut measurements: Vec<Measurement>) -> Vec<Measurement> {
        if self.policy == TemplatePolicy::ReparseEachApply {
            self.reanalyze();
        }

        let variables = self.enricher.template().variables().to_vec();
        let mut nr_round_trips = 0_usize;
        let mut nr_failures = 0_usize;
        for variable in variables {
            for measurement in measurements.iter_mut() {
                let value = match measurement.tag(&variable) {
                    Some(value) => value.to_string(),
                    None => continue,
                };

                let binding: QueryVariables = std::iter::once((variable.clone(), value)).collect();
                nr_round_trips += 1;
                if self.enricher.enrich_with(measurement, &binding).await == Enrichment::Failed {
                    nr_failures += 1;
                }
            }
        }

        tracing::debug!(%nr_round_trips, %nr_failures, "batch enrichment applied");
        measurements
    }
}

impl fmt::Debug for BatchEnrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEnrichment")
            .field("enricher", &self.enricher)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_test::{assert_tokens, Token};

    use super::*;
    use crate::elements::ResponseNode;
    use crate::enrich::enricher::tests::{widget_response, ScriptedClient};
    use crate::error::EnrichmentError;

    const TEMPLATE: &str = "query($host: String, $site: String) { __root_element: item(host: $host, site: $site) { \
        __tag_name: name } }";

    fn batch(client: Arc<ScriptedClient>, policy: TemplatePolicy) -> BatchEnrichment {
        let enricher = Enricher::new("test_batch", Arc::new(QueryTemplate::parse(TEMPLATE)), client);
        BatchEnrichment::new(enricher, policy)
    }

    fn echo_response(variables: &QueryVariables) -> Result<Option<ResponseNode>, EnrichmentError> {
        let bound: Vec<String> = variables.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let mut node = crate::elements::ObjectNode::new();
        node.insert("__tag_name", ResponseNode::from(bound.join(",")));
        Ok(Some(node.into()))
    }

    #[test]
    fn test_template_policy_serde_tokens() {
        assert_tokens(&TemplatePolicy::Cached, &[Token::UnitVariant { name: "TemplatePolicy", variant: "cached" }]);
        assert_tokens(
            &TemplatePolicy::ReparseEachApply,
            &[Token::UnitVariant { name: "TemplatePolicy", variant: "reparse_each_apply" }],
        );
        assert_eq!(TemplatePolicy::default(), TemplatePolicy::Cached);
    }

    #[tokio::test]
    async fn test_apply_binds_one_variable_per_round_trip() {
        let client = Arc::new(ScriptedClient::new(echo_response));
        let mut batch = batch(client.clone(), TemplatePolicy::Cached);
        let input = vec![
            Measurement::new("a").with_tag("host", "h1").with_tag("site", "s1"),
            Measurement::new("b"),
            Measurement::new("c").with_tag("site", "s3"),
        ];

        let actual = batch.apply(input.clone()).await;
        let names: Vec<&str> = actual.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let calls: Vec<String> = client
            .calls()
            .into_iter()
            .map(|c| c.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(","))
            .collect();
        assert_eq!(calls, vec!["host=h1", "site=s1", "site=s3"]);

        assert_eq!(actual[0].tag("name"), Some("site=s1"));
        assert_eq!(actual[1], input[1]);
        assert_eq!(actual[2].tag("name"), Some("site=s3"));
    }

    #[tokio::test]
    async fn test_apply_empty_batch() {
        let client = Arc::new(ScriptedClient::new(widget_response));
        let mut batch = batch(client.clone(), TemplatePolicy::Cached);
        assert!(batch.apply(Vec::new()).await.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_template_under_each_policy() {
        for policy in [TemplatePolicy::Cached, TemplatePolicy::ReparseEachApply] {
            let client = Arc::new(ScriptedClient::new(widget_response));
            let mut batch = batch(client.clone(), policy);
            batch.set_template("query($id: String) { __root_element: item(id: $id) { __tag_name: name } }");
            assert_eq!(batch.policy(), policy);

            let input = vec![Measurement::new("ping").with_tag("id", "9").with_tag("host", "h1")];
            let actual = batch.apply(input).await;
            assert_eq!(actual[0].tag("name"), Some("widget"));
            assert_eq!(client.calls(), vec![maplit::btreemap! { "id".to_string() => "9".to_string() }]);
        }
    }
}
