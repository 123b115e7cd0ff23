//! Measurement enrichment from a graph query service.
//!
//! A query template is analyzed once for the `$variables` it binds from measurement tags and the
//! `__tag_`-aliased fields it selects. Each measurement is enriched by one query whose aliased
//! response fields are merged back as tags. `StreamingEnrichment` runs enrichments concurrently
//! under a bounded budget; `BatchEnrichment` runs them one at a time.

mod batch;
mod client;
mod enricher;
mod extract;
mod streaming;
mod template;

pub use self::batch::{BatchEnrichment, TemplatePolicy};
pub use self::client::{classify_response, GraphQueryClient, HttpGraphQueryClient, QueryRequest, QueryVariables};
pub use self::client::GRAPH_QUERY_TIME;
pub use self::enricher::{Enricher, Enrichment, ENRICHMENT_OUTCOMES};
pub use self::extract::{extract_aliased_fields, ExtractionResult};
pub use self::streaming::{normalize_max_parallel, EnrichStage, PipelineState, StreamingEnrichment};
pub use self::streaming::{DEFAULT_MAX_PARALLEL, ENRICHMENT_IN_FLIGHT};
pub use self::template::{extract_alias_map, extract_variables, AliasMap, QueryTemplate, TAG_MARKER_PREFIX};
