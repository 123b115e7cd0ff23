mod node;
mod port;
mod shape;
pub mod stage;

use std::collections::VecDeque;
use std::fmt;

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use tracing::Instrument;

use self::node::Node;
pub use self::port::{connect_out_to_in, Connect};
pub use self::port::{Inlet, Outlet, Port, PORT_DATA};
pub use self::port::{STAGE_EGRESS_COUNTS, STAGE_INGRESS_COUNTS};
pub use self::shape::*;
use self::stage::Stage;
use crate::error::{EnricherError, GraphError, MetricLabel};
use crate::EnricherResult;

pub static GRAPH_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_graph_errors",
            "Number of recoverable errors occurring in graph processing",
        ),
        &["stage", "error_type"],
    )
    .expect("failed creating enricher_graph_errors metric")
});

#[inline]
pub fn track_errors(stage: &str, error: &impl MetricLabel) {
    GRAPH_ERRORS.with_label_values(&[stage, error.label().as_ref()]).inc()
}

/// A Graph represents a runnable stream processing graph.
///
/// A Graph has one or more source nodes, zero or more through nodes and one or more sink nodes,
/// connected to each other via their `Inlet` and `Outlet` ports. Running the graph spawns a task
/// per node (via `tokio::spawn`); the nodes execute until their sources complete.
///
/// # Examples
///
/// ```
/// use enricher::graph::stage;
/// use enricher::graph::{Connect, Graph, SinkShape, SourceShape};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let source = stage::Sequence::new("my_data", vec![1, 2, 3, 4, 5]);
///     let mut sum = stage::Fold::new("sum", 0, |acc, x: i32| acc + x * x);
///     let rx_sum_sq = sum.take_final_rx().unwrap();
///
///     (source.outlet(), sum.inlet()).connect().await;
///     let mut g = Graph::default();
///     g.push_back(Box::new(source));
///     g.push_back(Box::new(sum));
///     g.run().await?;
///
///     assert_eq!(rx_sum_sq.await?, 55);
///     Ok(())
/// }
/// ```
#[derive(Default, fmt::Debug)]
pub struct Graph {
    nodes: VecDeque<Node>,
}

impl Graph {
    pub fn push_front(&mut self, stage: Box<dyn Stage>) {
        self.nodes.push_front(Node::new(stage));
    }

    pub fn push_back(&mut self, stage: Box<dyn Stage>) {
        self.nodes.push_back(Node::new(stage));
    }

    fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn check(&self) -> EnricherResult<()> {
        tracing::debug!(nodes=?self.node_names(), "checking graph nodes.");
        for node in self.nodes.iter() {
            node.check().await?;
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run(self) -> EnricherResult<()> {
        self.check().await?;

        let tasks = self.nodes.into_iter().map(|node| node.run()).collect::<Vec<_>>();

        let results: Vec<EnricherResult<()>> = futures::future::try_join_all(tasks)
            .instrument(tracing::debug_span!("graph_run_join_all"))
            .await
            .map_err(|err| EnricherError::Graph(GraphError::Join(err)))?;

        results.into_iter().collect()
    }
}
