use either::{Either, Left, Right};
use thiserror::Error;

use super::{MetricLabel, PortError, StageError};
use crate::SharedString;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{0}")]
    Stage(#[from] StageError),

    #[error("could not join graph node task: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Port(#[from] PortError),
}

impl MetricLabel for GraphError {
    fn slug(&self) -> SharedString {
        "graph".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Stage(e) => Right(Box::new(e)),
            Self::Join(_) => Left("join".into()),
            Self::Port(e) => Right(Box::new(e)),
        }
    }
}
