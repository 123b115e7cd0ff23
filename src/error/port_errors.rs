use std::fmt::Debug;

use either::{Either, Left};
use thiserror::Error;

use super::MetricLabel;
use crate::SharedString;

#[derive(Debug, Error)]
pub enum PortError {
    /// The port was used before being attached to a channel.
    #[error("cannot use detached port, {0}.")]
    Detached(String),

    /// The receiving half of the port's channel has hung up.
    #[error("could not send {item_type} across {port} channel: receiver closed")]
    Channel { port: String, item_type: &'static str },
}

impl PortError {
    pub fn closed_channel<T>(port: impl Into<String>) -> Self {
        Self::Channel { port: port.into(), item_type: std::any::type_name::<T>() }
    }
}

impl MetricLabel for PortError {
    fn slug(&self) -> SharedString {
        "port".into()
    }

    fn next(&self) -> Either<SharedString, Box<&dyn MetricLabel>> {
        match self {
            Self::Detached(_) => Left("detached".into()),
            Self::Channel { .. } => Left("channel".into()),
        }
    }
}
