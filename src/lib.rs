pub mod app_data;
pub mod elements;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod serde;
pub mod settings;
pub mod tracing;

use std::borrow::Cow;

pub use app_data::AppData;
pub use elements::{FieldValue, Measurement, ResponseNode};
pub use enrich::{BatchEnrichment, EnrichStage, Enricher, QueryTemplate, StreamingEnrichment};
pub use settings::EnrichmentSettings;

pub type SharedString = Cow<'static, str>;

pub type EnricherResult<T> = Result<T, error::EnricherError>;
