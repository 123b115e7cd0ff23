use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use once_cell::sync::Lazy;
use prometheus::IntGauge;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use super::enricher::Enricher;
use crate::elements::Measurement;
use crate::error::{EnricherError, MetricLabel, PipelineError, PortError, StageError};
use crate::graph::stage::{self, Stage};
use crate::graph::{self, Graph, Inlet, Outlet, Port, SinkShape, SourceShape, PORT_DATA};
use crate::{EnricherResult, SharedString};

pub static ENRICHMENT_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "enricher_enrich_in_flight",
        "Number of measurement enrichments currently awaiting the graph query service",
    )
    .expect("failed creating enricher_enrich_in_flight metric")
});

pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// Corrects a configured concurrency budget; zero or negative budgets fall back to the default.
pub fn normalize_max_parallel(configured: i64) -> usize {
    if configured <= 0 {
        tracing::warn!(
            %configured, corrected=%DEFAULT_MAX_PARALLEL,
            "max_parallel must be positive - using default"
        );
        DEFAULT_MAX_PARALLEL
    } else {
        usize::try_from(configured).unwrap_or(DEFAULT_MAX_PARALLEL)
    }
}

type WorkerOutcome = Result<(), PortError>;

/// Through-stage enriching measurements with at most `max_parallel` graph queries in flight.
///
/// A worker permit is acquired before the next measurement is read from the inlet and held until
/// the enriched result is accepted by the outlet, so a saturated stage or a slow downstream
/// applies backpressure upstream. Results are sent to the outlet as each worker completes;
/// output order is not preserved. Once the inlet is depleted, the stage waits for
/// every in-flight enrichment to be delivered before completing.
pub struct EnrichStage {
    name: SharedString,
    enricher: Enricher,
    max_parallel: usize,
    inlet: Inlet<Measurement>,
    outlet: Outlet<Measurement>,
}

impl EnrichStage {
    pub fn new(name: impl Into<SharedString>, enricher: Enricher, max_parallel: i64) -> Self {
        let name = name.into();
        let inlet = Inlet::new(name.clone(), PORT_DATA);
        let outlet = Outlet::new(name.clone(), PORT_DATA);
        Self {
            name,
            enricher,
            max_parallel: normalize_max_parallel(max_parallel),
            inlet,
            outlet,
        }
    }

    #[inline]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    fn spawn_worker(
        &self, workers: &mut JoinSet<WorkerOutcome>, permit: tokio::sync::OwnedSemaphorePermit,
        measurement: Measurement,
    ) {
        let enricher = self.enricher.clone();
        let outlet = self.outlet.clone();
        let name = self.name.clone();

        workers.spawn(async move {
            // released only once downstream accepts the result
            let _permit = permit;
            let enriched = {
                let _timer = stage::start_stage_eval_time(name.as_ref());
                ENRICHMENT_IN_FLIGHT.inc();
                let enriched = enricher.process(measurement).await;
                ENRICHMENT_IN_FLIGHT.dec();
                enriched
            };

            outlet.send(enriched).await
        });
    }

    fn handle_completed(&self, completed: Result<WorkerOutcome, JoinError>, failure: &mut Option<EnricherError>) {
        let err: EnricherError = match completed {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.into(),
            Err(err) => StageError::Worker { stage: self.name.clone(), source: err }.into(),
        };

        tracing::error!(stage=%self.name, error=?err, "failed to deliver enriched measurement");
        graph::track_errors(self.name.as_ref(), &err);
        if failure.is_none() {
            *failure = Some(err);
        }
    }
}

impl SourceShape for EnrichStage {
    type Out = Measurement;

    #[inline]
    fn outlet(&self) -> Outlet<Self::Out> {
        self.outlet.clone()
    }
}

impl SinkShape for EnrichStage {
    type In = Measurement;

    #[inline]
    fn inlet(&self) -> Inlet<Self::In> {
        self.inlet.clone()
    }
}

#[async_trait]
impl Stage for EnrichStage {
    #[inline]
    fn name(&self) -> &str {
        self.name.as_ref()
    }

    async fn check(&self) -> EnricherResult<()> {
        self.inlet.check_attachment().await?;
        self.outlet.check_attachment().await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", name = "run enrich through", skip(self), fields(stage=%self.name, max_parallel=%self.max_parallel))]
    async fn run(&mut self) -> EnricherResult<()> {
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut workers = JoinSet::new();
        let mut failure = None;

        loop {
            let permit = Arc::clone(&permits).acquire_owned().await.map_err(|err| {
                StageError::Materialization(format!("enrichment worker permits closed: {}", err))
            })?;

            while let Some(Some(completed)) = workers.join_next().now_or_never() {
                self.handle_completed(completed, &mut failure);
            }

            let next = self.inlet.recv().await;
            match next {
                Some(measurement) => self.spawn_worker(&mut workers, permit, measurement),
                None => break,
            }
        }

        tracing::debug!(in_flight=%workers.len(), "enrich inlet depleted - draining workers");
        while let Some(completed) = workers.join_next().await {
            self.handle_completed(completed, &mut failure);
        }

        match failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    async fn close(mut self: Box<Self>) -> EnricherResult<()> {
        tracing::trace!(stage=%self.name, "closing enrich-through ports.");
        self.inlet.close().await;
        self.outlet.close().await;
        Ok(())
    }
}

impl fmt::Debug for EnrichStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichStage")
            .field("name", &self.name)
            .field("enricher", &self.enricher)
            .field("max_parallel", &self.max_parallel)
            .field("inlet", &self.inlet)
            .field("outlet", &self.outlet)
            .finish()
    }
}

/// Observable lifecycle state of a `StreamingEnrichment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Started,
    Stopped,
}

impl PipelineState {
    fn label(&self) -> SharedString {
        match self {
            Self::Created => "created".into(),
            Self::Started => "started".into(),
            Self::Stopped => "stopped".into(),
        }
    }
}

enum Lifecycle {
    Created(EnrichStage),
    Started {
        tx: mpsc::Sender<Measurement>,
        handle: JoinHandle<EnricherResult<()>>,
    },
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> PipelineState {
        match self {
            Self::Created(_) => PipelineState::Created,
            Self::Started { .. } => PipelineState::Started,
            Self::Stopped => PipelineState::Stopped,
        }
    }
}

/// Streaming enrichment controller, driving an `EnrichStage` through its
/// `Created -> Started -> Stopped` lifecycle.
pub struct StreamingEnrichment {
    name: SharedString,
    capacity: usize,
    lifecycle: Lifecycle,
}

impl StreamingEnrichment {
    pub fn new(enricher: Enricher, max_parallel: i64) -> Self {
        let name: SharedString = format!("{}_streaming", enricher.name()).into();
        let stage = EnrichStage::new(name.clone(), enricher, max_parallel);
        Self {
            name,
            capacity: stage.max_parallel(),
            lifecycle: Lifecycle::Created(stage),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    /// Starts enriching; every enqueued measurement is delivered exactly once to `downstream`.
    #[tracing::instrument(level = "info", skip(self, downstream), fields(pipeline=%self.name))]
    pub async fn start(&mut self, downstream: mpsc::Sender<Measurement>) -> Result<(), PipelineError> {
        let stage = match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Created(stage) => stage,
            other => {
                let state = other.state();
                self.lifecycle = other;
                return Err(PipelineError::InvalidState { action: "start".into(), state: state.label() });
            },
        };

        let (tx, rx) = mpsc::channel(self.capacity);
        stage.inlet().attach(format!("{}::enqueue", self.name).into(), rx).await;
        stage.outlet().attach(format!("{}::downstream", self.name).into(), downstream).await;

        let mut graph = Graph::default();
        graph.push_back(Box::new(stage));
        let handle = tokio::spawn(graph.run());

        tracing::info!(max_parallel=%self.capacity, "streaming enrichment started");
        self.lifecycle = Lifecycle::Started { tx, handle };
        Ok(())
    }

    /// Hands a measurement to the running pipeline, waiting only while its input buffer is full.
    /// If the pipeline is not running the measurement is returned in the error.
    pub async fn enqueue(&self, measurement: Measurement) -> Result<(), PipelineError> {
        match &self.lifecycle {
            Lifecycle::Started { tx, .. } => tx
                .send(measurement)
                .await
                .map_err(|mpsc::error::SendError(m)| PipelineError::NotRunning(m)),
            _ => Err(PipelineError::NotRunning(measurement)),
        }
    }

    /// Closes pipeline input and waits until every accepted measurement is delivered. Stopping
    /// an already stopped pipeline does nothing.
    #[tracing::instrument(level = "info", skip(self), fields(pipeline=%self.name))]
    pub async fn stop(&mut self) -> EnricherResult<()> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Started { tx, handle } => {
                drop(tx);
                let result = handle.await.map_err(PipelineError::Task)?;
                if let Err(err) = &result {
                    tracing::error!(error=?err, error_type=%err.label(), "streaming enrichment stopped with failure");
                } else {
                    tracing::info!("streaming enrichment stopped");
                }
                result
            },
            Lifecycle::Created(_) => {
                tracing::info!("streaming enrichment stopped before it started");
                Ok(())
            },
            Lifecycle::Stopped => {
                tracing::debug!("streaming enrichment already stopped");
                Ok(())
            },
        }
    }
}

impl fmt::Debug for StreamingEnrichment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingEnrichment")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .finish()
    }
}
