//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Decoding of the nested signed envelopes carried by a license."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
//! The `signature` field of a license nests two self-similar envelopes:
//!
//! ```text
//! base64(JSON { "licenseData": base64(inner), "innerSignature": base64(sig) })
//! inner = JSON { "licenseData": base64(snapshot), "signature": base64(sig) }
//! ```
//!
//! Both levels decode through [`SignedEnvelope::decode`]. Decoding only
//! lifts the payload bytes out of base64; interpreting those bytes is left
//! to the caller once the signature over them has been checked.

use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Map, Value};

use crate::error::{Result, VerifyError};

const PAYLOAD_KEY: &str = "licenseData";

/// Nesting level of a [`SignedEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeLevel {
    /// Envelope carried in the license `signature` field.
    Outer,
    /// Envelope carried in the outer payload.
    Inner,
}

impl EnvelopeLevel {
    /// JSON key holding the signature at this level.
    #[must_use]
    pub fn signature_key(&self) -> &'static str {
        match self {
            EnvelopeLevel::Outer => "innerSignature",
            EnvelopeLevel::Inner => "signature",
        }
    }

    fn malformed(&self, context: &'static str, reason: impl std::fmt::Display) -> VerifyError {
        match self {
            EnvelopeLevel::Outer => VerifyError::malformed_input(context, reason),
            EnvelopeLevel::Inner => VerifyError::malformed_payload(context, reason),
        }
    }
}

/// A payload together with the signature computed over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    /// Signed bytes, base64-decoded but otherwise uninterpreted.
    pub payload: Vec<u8>,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

/// Envelope decoded from the license `signature` field.
pub type OuterEnvelope = SignedEnvelope;
/// Envelope decoded from the verified outer payload; its payload is the canonical snapshot.
pub type InnerPayload = SignedEnvelope;

impl SignedEnvelope {
    /// Decode the JSON form of an envelope at `level`.
    pub fn decode(json: &[u8], level: EnvelopeLevel) -> Result<Self> {
        let fields: Map<String, Value> = serde_json::from_slice(json)
            .map_err(|err| level.malformed("signed envelope is not a JSON object", err))?;
        Ok(Self {
            payload: decode_field(&fields, PAYLOAD_KEY, level)?,
            signature: decode_field(&fields, level.signature_key(), level)?,
        })
    }

    /// Encode the envelope into its JSON form at `level`.
    #[must_use]
    pub fn to_json(&self, level: EnvelopeLevel) -> Vec<u8> {
        let mut fields = Map::new();
        fields.insert(
            PAYLOAD_KEY.to_owned(),
            json!(general_purpose::STANDARD.encode(&self.payload)),
        );
        fields.insert(
            level.signature_key().to_owned(),
            json!(general_purpose::STANDARD.encode(&self.signature)),
        );
        Value::Object(fields).to_string().into_bytes()
    }
}

fn decode_field(fields: &Map<String, Value>, key: &'static str, level: EnvelopeLevel) -> Result<Vec<u8>> {
    let text = match fields.get(key) {
        Some(Value::String(text)) => text,
        Some(_) => return Err(level.malformed("signed envelope field is not a string", key)),
        None => return Err(level.malformed("signed envelope field is missing", key)),
    };
    general_purpose::STANDARD
        .decode(text)
        .map_err(|err| level.malformed("signed envelope field must be base64 encoded", format!("{key}: {err}")))
}

/// Decode the license `signature` text into the outer envelope.
pub fn decode_outer(signature: &str) -> Result<OuterEnvelope> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(VerifyError::malformed_input(
            "license is not signed",
            "signature field is empty",
        ));
    }
    let json = general_purpose::STANDARD
        .decode(signature)
        .map_err(|err| VerifyError::malformed_input("license signature must be base64 encoded", err))?;
    SignedEnvelope::decode(&json, EnvelopeLevel::Outer)
}

/// Decode the verified outer payload into the inner payload.
///
/// Must only be called on bytes whose outer signature has been verified.
pub fn decode_inner(license_data: &[u8]) -> Result<InnerPayload> {
    SignedEnvelope::decode(license_data, EnvelopeLevel::Inner)
}
