use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize_optional_duration_secs<S: Serializer>(
    that: &Option<Duration>, serializer: S,
) -> Result<S::Ok, S::Error> {
    match that {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize_optional_duration_secs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let secs: Option<u64> = Deserialize::deserialize(deserializer)?;
    Ok(secs.map(Duration::from_secs))
}
