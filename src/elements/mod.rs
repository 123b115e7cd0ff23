mod measurement;
mod response;

pub use measurement::{FieldValue, Fields, Measurement, MeasurementIdentity, Tags};
pub use response::{ObjectNode, ResponseNode};
