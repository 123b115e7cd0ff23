use prometheus::Registry;

use crate::enrich::{ENRICHMENT_IN_FLIGHT, ENRICHMENT_OUTCOMES, GRAPH_QUERY_TIME};
use crate::error::EnricherError;
use crate::graph;

#[tracing::instrument(level = "info", skip(registry))]
pub fn register_enrichment_metrics(registry: &Registry) -> Result<(), EnricherError> {
    registry.register(Box::new(graph::GRAPH_ERRORS.clone()))?;
    registry.register(Box::new(graph::STAGE_INGRESS_COUNTS.clone()))?;
    registry.register(Box::new(graph::STAGE_EGRESS_COUNTS.clone()))?;
    registry.register(Box::new(graph::stage::STAGE_EVAL_TIME.clone()))?;
    registry.register(Box::new(ENRICHMENT_OUTCOMES.clone()))?;
    registry.register(Box::new(ENRICHMENT_IN_FLIGHT.clone()))?;
    registry.register(Box::new(GRAPH_QUERY_TIME.clone()))?;
    Ok(())
}
