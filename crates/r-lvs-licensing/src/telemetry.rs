//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Verification counters and structured log events."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing::{info, warn};

use crate::error::VerifyError;
use crate::license::License;

/// Verification metrics exported via Prometheus.
#[derive(Clone)]
pub struct VerificationMetrics {
    registry: Arc<Registry>,
    verifications_total: IntCounter,
    rejections_total: IntCounterVec,
}

impl std::fmt::Debug for VerificationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationMetrics").finish_non_exhaustive()
    }
}

impl VerificationMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let verifications_total = IntCounter::new(
            "license_verifications_total",
            "Total number of licenses that passed verification",
        )?;
        let rejections_total = IntCounterVec::new(
            Opts::new(
                "license_rejections_total",
                "Total number of licenses rejected, by failure kind",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(verifications_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;

        Ok(Self {
            registry,
            verifications_total,
            rejections_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count of accepted licenses.
    pub fn accepted(&self) -> u64 {
        self.verifications_total.get()
    }

    /// Count of rejections for the given kind label.
    pub fn rejected(&self, kind: &str) -> u64 {
        self.rejections_total.with_label_values(&[kind]).get()
    }

    fn inc_accepted(&self) {
        self.verifications_total.inc();
    }

    fn inc_rejected(&self, error: &VerifyError) {
        self.rejections_total
            .with_label_values(&[error.kind().as_str()])
            .inc();
    }
}

/// Record a license that passed every verification stage.
pub fn record_license_verified(metrics: Option<&VerificationMetrics>, license: &License) {
    if let Some(metrics) = metrics {
        metrics.inc_accepted();
    }
    info!(
        license_id = %license.spec.license_id,
        customer = %license.spec.customer_name,
        channel_id = %license.spec.channel_id,
        "license verified"
    );
}

/// Record a rejected license.
pub fn record_license_rejected(metrics: Option<&VerificationMetrics>, error: &VerifyError) {
    if let Some(metrics) = metrics {
        metrics.inc_rejected(error);
    }
    warn!(kind = %error.kind(), error = %error, "license rejected");
}
