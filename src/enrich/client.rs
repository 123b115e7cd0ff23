use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Serialize;
use url::Url;

use super::template::QueryTemplate;
use crate::elements::ResponseNode;
use crate::error::{EnrichmentError, SettingsError};
use crate::settings::EnrichmentSettings;

pub static GRAPH_QUERY_TIME: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "enricher_graph_query_time_seconds",
            "Time spent on graph query round trips, in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("failed creating enricher_graph_query_time_seconds metric")
});

const DATA_KEY: &str = "data";
const ERRORS_KEY: &str = "errors";
const MESSAGE_KEY: &str = "message";

/// Variable bindings for a single query, keyed by variable name.
pub type QueryVariables = BTreeMap<String, String>;

/// Wire body of a graph query request.
#[derive(Debug, Serialize)]
pub struct QueryRequest<'q> {
    pub query: &'q str,
    pub variables: &'q QueryVariables,
}

/// Executes a query template against a graph query service.
///
/// A successful query resolves to the designated root element of the response, or `None` when
/// the root element is empty; there is nothing to enrich from in that case.
#[async_trait]
pub trait GraphQueryClient: fmt::Debug + Send + Sync {
    async fn query(
        &self, template: &QueryTemplate, variables: &QueryVariables,
    ) -> Result<Option<ResponseNode>, EnrichmentError>;
}

/// `GraphQueryClient` over HTTP. Each query is a single POST attempt.
#[derive(Clone)]
pub struct HttpGraphQueryClient {
    client: reqwest::Client,
    url: Url,
    root_element: String,
}

impl fmt::Debug for HttpGraphQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGraphQueryClient")
            .field("url", &self.url.as_str())
            .field("root_element", &self.root_element)
            .finish()
    }
}

impl HttpGraphQueryClient {
    /// Wraps an already configured client. Authorization is expected to be among the client's
    /// default headers.
    pub fn new(client: reqwest::Client, url: Url, root_element: impl Into<String>) -> Self {
        Self { client, url, root_element: root_element.into() }
    }

    #[tracing::instrument(level = "debug", skip(settings), fields(url=%settings.url))]
    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self, SettingsError> {
        let mut auth = HeaderValue::from_str(&settings.auth_scheme.authorization(&settings.token))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::new(builder.build()?, settings.url.clone(), settings.root_element.clone()))
    }

    pub fn root_element(&self) -> &str {
        self.root_element.as_str()
    }
}

#[async_trait]
impl GraphQueryClient for HttpGraphQueryClient {
    #[tracing::instrument(level = "debug", skip(self, template), fields(url=%self.url))]
    async fn query(
        &self, template: &QueryTemplate, variables: &QueryVariables,
    ) -> Result<Option<ResponseNode>, EnrichmentError> {
        let body = QueryRequest { query: template.text(), variables };

        let timer = GRAPH_QUERY_TIME.start_timer();
        let response = self.client.post(self.url.clone()).json(&body).send().await?;
        let status = response.status();
        let payload = response.text().await?;
        timer.observe_duration();

        tracing::trace!(%status, %payload, "graph query response received");
        classify_response(status, &payload, &self.root_element)
    }
}

/// Classifies a graph query response, resolving the root element on success.
///
/// Checked in order: non-success status, undecodable body, service-reported query errors,
/// missing `data` or root element. An empty list, null or scalar root element resolves to
/// `None`; a list resolves to its first element.
pub fn classify_response(
    status: StatusCode, payload: &str, root_element: &str,
) -> Result<Option<ResponseNode>, EnrichmentError> {
    if !status.is_success() {
        return Err(EnrichmentError::Service { status, body: payload.trim().to_string() });
    }

    let response: ResponseNode = serde_json::from_str(payload)?;

    let errors = error_messages(&response);
    if !errors.is_empty() {
        return Err(EnrichmentError::Query(errors));
    }

    let data = match response.get(DATA_KEY) {
        Some(data @ ResponseNode::Object(_)) => data,
        Some(other) => {
            return Err(EnrichmentError::Shape(format!(
                "expected `{}` object but found {}",
                DATA_KEY,
                other.kind()
            )))
        },
        None => return Err(EnrichmentError::Shape(format!("missing `{}` in response", DATA_KEY))),
    };

    let root = data.get(root_element).ok_or_else(|| {
        EnrichmentError::Shape(format!("missing root element `{}` in response data", root_element))
    })?;

    match root {
        ResponseNode::List(items) => Ok(items.first().cloned()),
        ResponseNode::Null => Ok(None),
        ResponseNode::Object(_) => Ok(Some(root.clone())),
        scalar => {
            tracing::debug!(%root_element, kind=%scalar.kind(), "root element carries no tags - skipping");
            Ok(None)
        },
    }
}

fn error_messages(response: &ResponseNode) -> Vec<String> {
    response
        .get(ERRORS_KEY)
        .and_then(|errors| errors.as_list())
        .map(|errors| {
            errors
                .iter()
                .map(|e| match e.get(MESSAGE_KEY) {
                    Some(message) => message.to_string(),
                    None => e.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}
