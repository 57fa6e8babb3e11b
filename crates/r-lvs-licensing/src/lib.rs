//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Offline verification of double-signed license documents."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
//! R-LVS licensing crate: decodes the nested signed envelope carried by a
//! license, verifies the outer and inner signatures, and checks the live
//! license fields against the snapshot the vendor signed.

pub mod canonical;
pub mod consistency;
pub mod envelope;
pub mod error;
pub mod license;
pub mod signature;
pub mod telemetry;
pub mod verifier;

pub use canonical::{encode, CanonicalSnapshot};
pub use consistency::{check_consistency, CheckedField, FieldSet, UnknownField};
pub use envelope::{decode_inner, decode_outer, EnvelopeLevel, SignedEnvelope};
pub use error::{ErrorKind, Result, SignatureStage, VerifyError};
pub use license::{EntitlementField, EntitlementValue, License, LicenseSpec};
pub use signature::{verify_inner, verify_outer, PublicKey, SignatureAlgorithm, SignatureError};
pub use telemetry::VerificationMetrics;
pub use verifier::{verify_license, LicenseVerifier, VerifiedLicense};
