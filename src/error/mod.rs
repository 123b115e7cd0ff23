use std::fmt::Debug;

use either::{Either, Left, Right};
use thiserror::Error;

use crate::SharedString;

mod enrichment_errors;
mod graph_errors;
mod pipeline_errors;
mod port_errors;
mod settings_errors;
mod stage_errors;

pub use enrichment_errors::EnrichmentError;
pub use graph_errors::GraphError;
pub use pipeline_errors::PipelineError;
pub use port_errors::PortError;
pub use settings_errors::SettingsError;
pub use stage_errors::StageError;

/// Hierarchical classification of an error, used to label error metrics; e.g.,
/// `enricher::enrichment::http::status`.
pub trait MetricLabel {
    fn label(&self) -> SharedString {
        match self.next() {
            Either::Right(n) => format!("{}::{}", self.slug(), n.label()).into(),
            Either::Left(ls) => format!("{}::{}", self.slug(), ls).into(),
        }
    }

    fn slug(&self) -> SharedString;
    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>>;
}

#[derive(Debug, Error)]
pub enum EnricherError {
    #[error("{0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    Metrics(#[from] prometheus::Error),
}

impl MetricLabel for EnricherError {
    fn slug(&self) -> SharedString {
        "enricher".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Enrichment(e) => Right(Box::new(e)),
            Self::Pipeline(e) => Right(Box::new(e)),
            Self::Graph(e) => Right(Box::new(e)),
            Self::Settings(e) => Right(Box::new(e)),
            Self::Metrics(_) => Left("prometheus".into()),
        }
    }
}

impl From<PortError> for EnricherError {
    fn from(that: PortError) -> Self {
        Self::Graph(that.into())
    }
}

impl From<StageError> for EnricherError {
    fn from(that: StageError) -> Self {
        Self::Graph(that.into())
    }
}
