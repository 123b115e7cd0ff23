use either::{Either, Left, Right};
use thiserror::Error;

use super::{GraphError, MetricLabel};
use crate::elements::Measurement;
use crate::SharedString;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The measurement could not be accepted and is handed back to the caller.
    #[error("enrichment pipeline is not running; returning measurement {}", .0.name)]
    NotRunning(Measurement),

    #[error("cannot {action} enrichment pipeline in {state} state")]
    InvalidState { action: SharedString, state: SharedString },

    #[error("enrichment pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Graph(#[from] GraphError),
}

impl MetricLabel for PipelineError {
    fn slug(&self) -> SharedString {
        "pipeline".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::NotRunning(_) => Left("not_running".into()),
            Self::InvalidState { .. } => Left("invalid_state".into()),
            Self::Task(_) => Left("task".into()),
            Self::Graph(e) => Right(Box::new(e)),
        }
    }
}
