use either::{Either, Left};
use reqwest::StatusCode;
use thiserror::Error;

use super::MetricLabel;
use crate::SharedString;

/// Set of errors occurring while enriching a single measurement. None of these are fatal to the
/// pipeline; the enricher logs them and passes the measurement through unchanged.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The query template yields nothing to bind or extract.
    #[error("query template is not usable for enrichment: {0}")]
    Config(String),

    /// Connection, DNS, timeout or body read failure.
    #[error("failed to reach graph query service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("graph query service responded with {status}: {body}")]
    Service { status: StatusCode, body: String },

    /// The service reported errors for the query itself.
    #[error("graph query failed: {}", .0.join("; "))]
    Query(Vec<String>),

    #[error("could not decode graph query response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Well-formed response missing the expected containers.
    #[error("unexpected graph query response shape: {0}")]
    Shape(String),
}

impl MetricLabel for EnrichmentError {
    fn slug(&self) -> SharedString {
        "enrichment".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Config(_) => Left("config".into()),
            Self::Transport(_) => Left("http::transport".into()),
            Self::Service { .. } => Left("http::status".into()),
            Self::Query(_) => Left("query".into()),
            Self::Decode(_) => Left("decode".into()),
            Self::Shape(_) => Left("shape".into()),
        }
    }
}
