//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Error taxonomy for license verification."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::fmt;

use thiserror::Error;

use crate::signature::SignatureError;

/// Result alias used throughout the licensing crate.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Signature stage that produced an [`VerifyError::InvalidSignature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStage {
    /// Signature over the whole envelope payload, checked with the vendor key.
    Outer,
    /// Signature over the embedded canonical snapshot.
    Inner,
}

impl SignatureStage {
    /// Label used in error messages and log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStage::Outer => "license",
            SignatureStage::Inner => "inner",
        }
    }
}

impl fmt::Display for SignatureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a license verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The license record or its outer envelope could not be decoded.
    #[error("{context}: {reason}")]
    MalformedInput {
        /// What was being decoded.
        context: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },
    /// The verified envelope payload could not be decoded.
    #[error("{context}: {reason}")]
    MalformedPayload {
        /// What was being decoded.
        context: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },
    /// A license field cannot be represented in the canonical encoding.
    #[error("failed to encode license snapshot: {0}")]
    Encoding(String),
    /// A cryptographic signature check failed.
    #[error("failed to verify {stage} signature: {source}")]
    InvalidSignature {
        /// Stage whose signature was rejected.
        stage: SignatureStage,
        /// Opaque crypto failure.
        #[source]
        source: SignatureError,
    },
    /// A live field diverges from the value recorded in the signed snapshot.
    #[error("\"{field}\" field has changed")]
    FieldTampered {
        /// Wire name of the tampered field.
        field: &'static str,
    },
    /// Public key material could not be used.
    #[error("invalid public key: {0}")]
    Key(String),
}

/// Coarse classification of a [`VerifyError`], stable for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`VerifyError::MalformedInput`].
    MalformedInput,
    /// See [`VerifyError::MalformedPayload`].
    MalformedPayload,
    /// See [`VerifyError::Encoding`].
    Encoding,
    /// See [`VerifyError::InvalidSignature`].
    InvalidSignature,
    /// See [`VerifyError::FieldTampered`].
    FieldTampered,
    /// See [`VerifyError::Key`].
    Key,
}

impl ErrorKind {
    /// Snake-case label for the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::MalformedPayload => "malformed_payload",
            ErrorKind::Encoding => "encoding",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::FieldTampered => "field_tampered",
            ErrorKind::Key => "key",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VerifyError {
    pub(crate) fn malformed_input(context: &'static str, reason: impl fmt::Display) -> Self {
        VerifyError::MalformedInput {
            context,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed_payload(context: &'static str, reason: impl fmt::Display) -> Self {
        VerifyError::MalformedPayload {
            context,
            reason: reason.to_string(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::MalformedInput { .. } => ErrorKind::MalformedInput,
            VerifyError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            VerifyError::Encoding(_) => ErrorKind::Encoding,
            VerifyError::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            VerifyError::FieldTampered { .. } => ErrorKind::FieldTampered,
            VerifyError::Key(_) => ErrorKind::Key,
        }
    }
}
