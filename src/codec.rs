use serde_json::Value;

use crate::{Error, Result};

/// Pluggable JSON handling for the storage API's response bodies.
pub trait JsonCodec: Send + Sync + 'static {
    fn decode(&self, body: &[u8]) -> Result<Value>;
}

/// The stock codec, backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeJsonCodec;

impl JsonCodec for SerdeJsonCodec {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        serde_json::from_slice(body)
            .map_err(|e| Error::transport(None, format!("Malformed JSON response: {}", e)))
    }
}
