mod sink;
mod source;

use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramTimer, HistogramVec};

pub use self::sink::*;
pub use self::source::*;
use super::{SinkShape, SourceShape, ThroughShape};
use crate::EnricherResult;

pub static STAGE_EVAL_TIME: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "enricher_stage_eval_time_seconds",
            "Time spent in a stage handling each item, in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["stage"],
    )
    .expect("failed creating enricher_stage_eval_time_seconds metric")
});

#[inline]
pub fn start_stage_eval_time(stage: &str) -> HistogramTimer {
    STAGE_EVAL_TIME.with_label_values(&[stage]).start_timer()
}

pub trait SourceStage<Out>: Stage + SourceShape<Out = Out> + 'static {}
impl<Out, T: 'static + Stage + SourceShape<Out = Out>> SourceStage<Out> for T {}

pub trait SinkStage<In>: Stage + SinkShape<In = In> + 'static {}
impl<In, T: 'static + Stage + SinkShape<In = In>> SinkStage<In> for T {}

pub trait ThroughStage<In, Out>: Stage + ThroughShape<In = In, Out = Out> + 'static {}
impl<In, Out, T: 'static + Stage + ThroughShape<In = In, Out = Out>> ThroughStage<In, Out> for T {}

/// Behavior driving graph stage lifecycle: `check` verifies ports are attached, `run` processes
/// until the stage's input is exhausted, and `close` releases its ports.
#[async_trait]
pub trait Stage: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> EnricherResult<()>;
    async fn run(&mut self) -> EnricherResult<()>;
    async fn close(self: Box<Self>) -> EnricherResult<()>;
}
