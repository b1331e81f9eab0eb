//! Versioned JSON envelopes for the entity and view files

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};

pub const ENTITY_FORMAT_VERSION: &str = "1.0";
pub const VIEW_FORMAT_VERSION: &str = "1.0";

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

/// Pretty-printed `{ "version": ..., <body fields> }`.
pub fn encode<T: Serialize>(version: &str, body: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&Envelope { version, body })?)
}

/// Decode a file written by [`encode`]. The version tag must be the
/// expected string; older and newer files are refused, never upgraded.
pub fn decode<T: DeserializeOwned>(kind: &'static str, expected: &'static str, bytes: &[u8]) -> Result<T> {
    let mut value: serde_json::Value = serde_json::from_slice(bytes)?;

    let found = value.as_object_mut().and_then(|map| map.remove("version"));
    match found {
        Some(serde_json::Value::String(version)) if version == expected => {
            Ok(serde_json::from_value(value)?)
        }
        Some(other) => Err(StoreError::VersionMismatch {
            kind,
            expected,
            found: other
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        }),
        None => Err(StoreError::VersionMismatch {
            kind,
            expected,
            found: "<missing>".to_string(),
        }),
    }
}
