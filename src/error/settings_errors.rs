use either::{Either, Left};
use thiserror::Error;

use super::MetricLabel;
use crate::SharedString;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load enrichment settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to parse graph query url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("invalid authorization header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("failed to build graph query http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl MetricLabel for SettingsError {
    fn slug(&self) -> SharedString {
        "settings".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Load(_) => Left("load".into()),
            Self::UrlParse(_) => Left("url".into()),
            Self::InvalidHeader(_) => Left("http::header".into()),
            Self::HttpClient(_) => Left("http::client".into()),
            Self::Io(_) => Left("io".into()),
        }
    }
}
