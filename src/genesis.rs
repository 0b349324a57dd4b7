//! Genesis anchor records.
//!
//! The anchor is the system's birth certificate: a hex-encoded hash fixed
//! once at first run, plus the timestamp and an optional attestation blob
//! from whatever sealed environment produced it.  The chain binds the
//! anchor's hash bytes as its first accumulated element, so the same anchor
//! must be supplied identically across restarts.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or decoding an anchor record.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// Anchor file could not be read.
    #[error("io error: {0}")]
    Io(String),
    /// Anchor content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Immutable genesis anchor: set once, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAnchor {
    /// Hex-encoded genesis hash; its raw bytes seed the chain.
    pub hash: String,
    /// RFC 3339 timestamp of the anchor's creation.
    pub timestamp: String,
    /// Optional attestation from the environment that sealed the anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

impl GenesisAnchor {
    /// Creates an anchor without attestation.
    pub fn new(hash: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            timestamp: timestamp.into(),
            attestation: None,
        }
    }

    /// Creates an anchor carrying an attestation blob.
    pub fn with_attestation(
        hash: impl Into<String>,
        timestamp: impl Into<String>,
        attestation: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            timestamp: timestamp.into(),
            attestation: Some(attestation.into()),
        }
    }

    /// Loads an anchor from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, AnchorError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| AnchorError::Io(err.to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Parses an anchor previously emitted by
    /// [`GenesisAnchor::to_json_string`].
    pub fn from_json_str(input: &str) -> Result<Self, AnchorError> {
        serde_json::from_str(input).map_err(|err| AnchorError::Decode(err.to_string()))
    }

    /// Serializes the anchor to a JSON string.
    pub fn to_json_string(&self) -> String {
        let mut value = json!({
            "hash": self.hash,
            "timestamp": self.timestamp,
        });
        if let Some(attestation) = &self.attestation {
            value["attestation"] = json!(attestation);
        }
        value.to_string()
    }

    /// Decodes the anchor's hash into the raw bytes the chain accumulates.
    pub fn genesis_bytes(&self) -> Result<Vec<u8>, AnchorError> {
        hex::decode(&self.hash)
            .map_err(|err| AnchorError::Decode(format!("anchor hash is not hex: {err}")))
    }
}
