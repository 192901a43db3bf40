//! Wire envelope parsing and validation
//!
//! Envelopes arrive as JSON with short field names, every field base64 text:
//!
//! ```text
//! { "d": <ciphertext>, "k": <wrapped key>, "n": <nonce>, "t": <auth tag> }
//! ```
//!
//! All four fields are mandatory. Validation happens in two steps, presence
//! then per-field base64 decode, and both fail before any cryptographic
//! operation is attempted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Errors raised while turning wire bytes into a decoded [`Envelope`]
///
/// Every variant means the input was structurally invalid; no key material
/// has been touched when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
    #[error("envelope missing required field '{0}'")]
    MissingField(&'static str),
    #[error("envelope field '{field}' is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        source: base64::DecodeError,
    },
    #[error("envelope nonce must be {expected} bytes, got {got}")]
    NonceLength { expected: usize, got: usize },
}

/// Envelope as it appears on the wire
///
/// Fields are optional so that absence surfaces as a
/// [`EnvelopeError::MissingField`] from [`RawEnvelope::decode`] instead of an
/// opaque deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// Ciphertext
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Wrapped symmetric key
    #[serde(rename = "k", skip_serializing_if = "Option::is_none")]
    pub wrapped_key: Option<String>,
    /// Nonce
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Authentication tag
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,
}

impl RawEnvelope {
    /// Parse wire bytes into a raw envelope
    pub fn from_json(raw: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Validate field presence and base64-decode each field independently
    pub fn decode(&self) -> Result<Envelope, EnvelopeError> {
        Ok(Envelope {
            data: decode_field("d", self.data.as_deref())?,
            wrapped_key: decode_field("k", self.wrapped_key.as_deref())?,
            nonce: decode_field("n", self.nonce.as_deref())?,
            auth_tag: decode_field("t", self.auth_tag.as_deref())?,
        })
    }
}

fn decode_field(name: &'static str, value: Option<&str>) -> Result<Vec<u8>, EnvelopeError> {
    let value = value.ok_or(EnvelopeError::MissingField(name))?;
    BASE64
        .decode(value)
        .map_err(|source| EnvelopeError::Base64 {
            field: name,
            source,
        })
}

/// Fully decoded envelope, ready for decryption
#[derive(Debug, Clone)]
pub struct Envelope {
    pub data: Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

impl Envelope {
    /// Parse and decode wire bytes in one step
    pub fn from_json(raw: &[u8]) -> Result<Self, EnvelopeError> {
        RawEnvelope::from_json(raw)?.decode()
    }

    /// Re-encode into the wire form
    pub fn to_raw(&self) -> RawEnvelope {
        RawEnvelope {
            data: Some(BASE64.encode(&self.data)),
            wrapped_key: Some(BASE64.encode(&self.wrapped_key)),
            nonce: Some(BASE64.encode(&self.nonce)),
            auth_tag: Some(BASE64.encode(&self.auth_tag)),
        }
    }
}
