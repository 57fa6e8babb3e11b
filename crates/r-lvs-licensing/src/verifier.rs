//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Orchestration of the license verification pipeline."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::ops::Deref;

use tracing::{debug, debug_span};

use crate::canonical::CanonicalSnapshot;
use crate::consistency::{check_consistency, FieldSet};
use crate::envelope::{decode_inner, decode_outer};
use crate::error::Result;
use crate::license::License;
use crate::signature::{verify_inner, verify_outer, PublicKey};
use crate::telemetry::{record_license_rejected, record_license_verified, VerificationMetrics};

/// A license that passed both signature checks and the tamper check.
///
/// Holds the input document unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedLicense {
    license: License,
    snapshot: CanonicalSnapshot,
    outer_key_fingerprint: String,
    inner_key_fingerprint: String,
}

impl VerifiedLicense {
    /// The verified license document.
    #[must_use]
    pub fn license(&self) -> &License {
        &self.license
    }

    /// The signed snapshot the license was checked against.
    #[must_use]
    pub fn snapshot(&self) -> &CanonicalSnapshot {
        &self.snapshot
    }

    /// Fingerprint of the key that verified the outer signature.
    #[must_use]
    pub fn outer_key_fingerprint(&self) -> &str {
        &self.outer_key_fingerprint
    }

    /// Fingerprint of the key that verified the inner signature.
    #[must_use]
    pub fn inner_key_fingerprint(&self) -> &str {
        &self.inner_key_fingerprint
    }

    /// Drop the verification annotation.
    #[must_use]
    pub fn into_inner(self) -> License {
        self.license
    }
}

impl Deref for VerifiedLicense {
    type Target = License;

    fn deref(&self) -> &License {
        &self.license
    }
}

/// Verifies licenses against a fixed pair of public keys.
///
/// Verification is a pure function of the license and the keys, so a
/// verifier can be shared freely across threads.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    outer_key: PublicKey,
    inner_key: PublicKey,
    checked_fields: FieldSet,
    metrics: Option<VerificationMetrics>,
}

impl LicenseVerifier {
    /// Verifier checking every canonical field.
    #[must_use]
    pub fn new(outer_key: PublicKey, inner_key: PublicKey) -> Self {
        Self {
            outer_key,
            inner_key,
            checked_fields: FieldSet::all(),
            metrics: None,
        }
    }

    /// Replace the list of fields compared against the signed snapshot.
    #[must_use]
    pub fn with_checked_fields(mut self, checked_fields: FieldSet) -> Self {
        self.checked_fields = checked_fields;
        self
    }

    /// Record outcomes in the given metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: VerificationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Key used for the outer signature.
    #[must_use]
    pub fn outer_key(&self) -> &PublicKey {
        &self.outer_key
    }

    /// Key used for the inner signature.
    #[must_use]
    pub fn inner_key(&self) -> &PublicKey {
        &self.inner_key
    }

    /// Fields compared against the signed snapshot.
    #[must_use]
    pub fn checked_fields(&self) -> &FieldSet {
        &self.checked_fields
    }

    /// Run every verification stage, stopping at the first failure.
    pub fn verify(&self, license: &License) -> Result<VerifiedLicense> {
        let span = debug_span!("license_verify", license_id = %license.spec.license_id);
        let _entered = span.enter();

        match self.verify_stages(license) {
            Ok(snapshot) => {
                record_license_verified(self.metrics.as_ref(), license);
                Ok(VerifiedLicense {
                    license: license.clone(),
                    snapshot,
                    outer_key_fingerprint: self.outer_key.fingerprint().to_owned(),
                    inner_key_fingerprint: self.inner_key.fingerprint().to_owned(),
                })
            }
            Err(err) => {
                record_license_rejected(self.metrics.as_ref(), &err);
                Err(err)
            }
        }
    }

    fn verify_stages(&self, license: &License) -> Result<CanonicalSnapshot> {
        let outer = decode_outer(&license.spec.signature)?;
        verify_outer(&outer.payload, &outer.signature, &self.outer_key)?;
        debug!(
            key = %self.outer_key.fingerprint(),
            algorithm = %self.outer_key.algorithm(),
            "outer signature verified"
        );

        let inner = decode_inner(&outer.payload)?;
        verify_inner(&inner.payload, &inner.signature, &self.inner_key)?;
        debug!(
            key = %self.inner_key.fingerprint(),
            algorithm = %self.inner_key.algorithm(),
            "inner signature verified"
        );

        let snapshot = CanonicalSnapshot::from_bytes(&inner.payload)?;
        check_consistency(license, &snapshot, &self.checked_fields)?;
        debug!(
            fields = self.checked_fields.fields().len(),
            "license fields match signed snapshot"
        );
        Ok(snapshot)
    }
}

/// One-shot verification with an explicit key pair.
pub fn verify_license(
    license: &License,
    outer_key: &PublicKey,
    inner_key: &PublicKey,
) -> Result<VerifiedLicense> {
    LicenseVerifier::new(outer_key.clone(), inner_key.clone()).verify(license)
}
