//! Seeds travel as strings so JSON consumers never lose precision above 2^53.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(seed: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(seed)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SeedInput {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    match SeedInput::deserialize(deserializer)? {
        SeedInput::Text(raw) => raw.trim().parse::<u64>().map_err(D::Error::custom),
        SeedInput::Unsigned(seed) => Ok(seed),
        SeedInput::Signed(seed) => u64::try_from(seed)
            .map_err(|_| D::Error::custom(format!("seed must be non-negative, got {seed}"))),
    }
}
