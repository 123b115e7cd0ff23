use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};

use super::client::{GraphQueryClient, QueryVariables};
use super::extract::extract_aliased_fields;
use super::template::QueryTemplate;
use crate::elements::Measurement;
use crate::error::{EnrichmentError, MetricLabel};
use crate::graph;

pub static ENRICHMENT_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_enrichment_outcomes",
            "Number of measurement enrichment attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed creating enricher_enrichment_outcomes metric")
});

const OUTCOME_ENRICHED: &str = "enriched";
const OUTCOME_EMPTY: &str = "empty";
const OUTCOME_FAILED: &str = "failed";

#[inline]
fn track_outcome(outcome: &str) {
    ENRICHMENT_OUTCOMES.with_label_values(&[outcome]).inc()
}

/// Result of a single enrichment round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    /// Number of tags set on the measurement.
    Tagged(usize),
    /// The service found nothing for the measurement.
    Empty,
    /// The round trip failed; the measurement was left untouched.
    Failed,
}

/// Enriches one measurement at a time: binds the template variables the measurement carries as
/// tags, queries the graph service and merges the aliased response fields back as tags.
///
/// An enricher never loses a measurement. Every failure is logged and counted, and the
/// measurement is passed through unchanged.
#[derive(Clone)]
pub struct Enricher {
    name: Arc<str>,
    template: Arc<QueryTemplate>,
    client: Arc<dyn GraphQueryClient>,
}

impl fmt::Debug for Enricher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enricher")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("client", &self.client)
            .finish()
    }
}

impl Enricher {
    pub fn new(name: impl Into<Arc<str>>, template: Arc<QueryTemplate>, client: Arc<dyn GraphQueryClient>) -> Self {
        let name = name.into();
        if template.is_inert() {
            let err = EnrichmentError::Config(format!(
                "template declares no `{}` aliased fields; measurements will pass through unchanged",
                super::template::TAG_MARKER_PREFIX
            ));
            tracing::warn!(enricher=%name, error=%err, variables=?template.variables(), "inert query template");
        }

        Self { name, template, client }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Same enricher, using another template against the same client.
    pub fn with_template(&self, template: Arc<QueryTemplate>) -> Self {
        Self::new(Arc::clone(&self.name), template, Arc::clone(&self.client))
    }

    /// Binds each template variable found as a tag on the measurement. Variables the measurement
    /// does not carry are left out of the bindings entirely.
    pub fn bind_variables(&self, measurement: &Measurement) -> QueryVariables {
        let mut variables = QueryVariables::new();
        for name in self.template.variables() {
            match measurement.tag(name) {
                Some(value) => {
                    variables.insert(name.clone(), value.to_string());
                },
                None => {
                    tracing::debug!(
                        variable=%name, measurement=%measurement.identity(),
                        "query variable not found as tag on measurement"
                    );
                },
            }
        }
        variables
    }

    /// Enriches the measurement using all of its bound variables, returning it in every case.
    #[tracing::instrument(level = "debug", skip(self, measurement), fields(enricher=%self.name, measurement=%measurement.name))]
    pub async fn process(&self, mut measurement: Measurement) -> Measurement {
        let variables = self.bind_variables(&measurement);
        self.enrich_with(&mut measurement, &variables).await;
        measurement
    }

    /// Performs one enrichment round trip with the given bindings, merging any extracted tags
    /// into the measurement. Extracted tags replace prior values for the same keys.
    pub async fn enrich_with(&self, measurement: &mut Measurement, variables: &QueryVariables) -> Enrichment {
        tracing::debug!(measurement=%measurement.identity(), ?variables, "sending graph query");

        let root = match self.client.query(&self.template, variables).await {
            Ok(Some(root)) => root,
            Ok(None) => {
                tracing::debug!(measurement=%measurement.identity(), "empty graph query result - no enrichment");
                track_outcome(OUTCOME_EMPTY);
                return Enrichment::Empty;
            },
            Err(err) => {
                tracing::error!(
                    measurement=%measurement.identity(), error=%err, error_type=%err.label(),
                    "graph query failed - passing measurement through unchanged"
                );
                graph::track_errors(&self.name, &err);
                track_outcome(OUTCOME_FAILED);
                return Enrichment::Failed;
            },
        };

        let extracted = extract_aliased_fields(&root, self.template.aliases());
        let nr_tags = extracted.len();
        for (key, value) in extracted {
            if let Some(prior) = measurement.set_tag(key.as_str(), value.as_str()) {
                tracing::trace!(tag=%key, %prior, %value, "enrichment replaced existing tag");
            }
        }

        tracing::debug!(measurement=%measurement.identity(), %nr_tags, "enriched measurement");
        track_outcome(OUTCOME_ENRICHED);
        Enrichment::Tagged(nr_tags)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;

    use super::*;
    use crate::elements::ResponseNode;

    /// Client double replaying a canned response and recording the bindings it was sent.
    #[derive(Debug)]
    pub(crate) struct ScriptedClient {
        pub response: fn(&QueryVariables) -> Result<Option<ResponseNode>, EnrichmentError>,
        pub calls: Mutex<Vec<QueryVariables>>,
    }

    impl ScriptedClient {
        pub fn new(response: fn(&QueryVariables) -> Result<Option<ResponseNode>, EnrichmentError>) -> Self {
            Self { response, calls: Mutex::new(Vec::new()) }
        }

        pub fn calls(&self) -> Vec<QueryVariables> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl GraphQueryClient for ScriptedClient {
        async fn query(
            &self, _template: &QueryTemplate, variables: &QueryVariables,
        ) -> Result<Option<ResponseNode>, EnrichmentError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(variables.clone());
            }
            (self.response)(variables)
        }
    }

    pub(crate) fn widget_response(_: &QueryVariables) -> Result<Option<ResponseNode>, EnrichmentError> {
        let node = serde_json::from_str(r#"{"__tag_name": "widget", "site": {"__tag_site": "NYC"}}"#)?;
        Ok(Some(node))
    }

    const TEMPLATE: &str = "query($id: String, $url: String, $missing: String) { \
        __root_element: item(id: $id, url: $url, m: $missing) { __tag_name: name site { __tag_site: name } } }";

    fn enricher_with(client: Arc<ScriptedClient>) -> Enricher {
        Enricher::new("test", Arc::new(QueryTemplate::parse(TEMPLATE)), client)
    }

    #[test]
    fn test_bind_only_present_variables() {
        let enricher = enricher_with(Arc::new(ScriptedClient::new(widget_response)));
        let m = Measurement::new("ping").with_tag("url", "device1").with_tag("host", "h1");
        let expected = maplit::btreemap! { "url".to_string() => "device1".to_string() };
        assert_eq!(enricher.bind_variables(&m), expected);

        assert!(enricher.bind_variables(&Measurement::new("bare")).is_empty());
    }

    #[tokio::test]
    async fn test_process_merges_extracted_tags() {
        let client = Arc::new(ScriptedClient::new(widget_response));
        let enricher = enricher_with(Arc::clone(&client));
        let m = Measurement::new("ping").with_tag("id", "42").with_tag("site", "stale").with_field("rtt", 1.5);

        let actual = enricher.process(m.clone()).await;
        assert_eq!(actual.tag("name"), Some("widget"));
        assert_eq!(actual.tag("site"), Some("NYC"));
        assert_eq!(actual.tag("id"), Some("42"));
        assert_eq!(actual.fields, m.fields);
        assert_eq!(actual.name, m.name);
        assert_eq!(actual.timestamp, m.timestamp);

        assert_eq!(client.calls(), vec![maplit::btreemap! { "id".to_string() => "42".to_string() }]);
    }

    #[tokio::test]
    async fn test_process_passes_through_on_every_failure() {
        let failures: Vec<fn(&QueryVariables) -> Result<Option<ResponseNode>, EnrichmentError>> = vec![
            |_| Err(EnrichmentError::Service { status: StatusCode::INTERNAL_SERVER_ERROR, body: "boom".into() }),
            |_| Err(EnrichmentError::Query(vec!["bad query".to_string()])),
            |_| Err(EnrichmentError::Shape("missing data".to_string())),
            |_| Err(serde_json::from_str::<ResponseNode>("{").unwrap_err().into()),
            |_| Ok(None),
        ];

        for response in failures {
            let enricher = enricher_with(Arc::new(ScriptedClient::new(response)));
            let m = Measurement::new("ping").with_tag("url", "device1");
            let actual = enricher.process(m.clone()).await;
            assert_eq!(actual, m);
        }
    }

    #[tokio::test]
    async fn test_enrich_with_reports_outcome() {
        let enricher = enricher_with(Arc::new(ScriptedClient::new(widget_response)));
        let mut m = Measurement::new("ping");
        let outcome = enricher.enrich_with(&mut m, &QueryVariables::new()).await;
        assert_eq!(outcome, Enrichment::Tagged(2));

        let enricher = enricher_with(Arc::new(ScriptedClient::new(|_| Ok(None))));
        let outcome = enricher.enrich_with(&mut Measurement::new("ping"), &QueryVariables::new()).await;
        assert_eq!(outcome, Enrichment::Empty);

        let enricher = enricher_with(Arc::new(ScriptedClient::new(|_| {
            Err(EnrichmentError::Shape("nope".to_string()))
        })));
        let outcome = enricher.enrich_with(&mut Measurement::new("ping"), &QueryVariables::new()).await;
        assert_eq!(outcome, Enrichment::Failed);
    }
}
