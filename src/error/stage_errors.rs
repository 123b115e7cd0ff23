use either::{Either, Left, Right};
use thiserror::Error;

use super::{MetricLabel, PortError};
use crate::SharedString;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failure while materializing graph stage value: {0}")]
    Materialization(String),

    #[error("enrichment worker in stage {stage} failed: {source}")]
    Worker {
        stage: SharedString,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("{0}")]
    Port(#[from] PortError),
}

impl MetricLabel for StageError {
    fn slug(&self) -> SharedString {
        "stage".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Materialization(_) => Left("materialization".into()),
            Self::Worker { .. } => Left("worker".into()),
            Self::Port(e) => Right(Box::new(e)),
        }
    }
}
