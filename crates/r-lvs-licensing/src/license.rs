//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "License document model and transport decoding."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VerifyError};

/// Expected `kind` of a license document.
pub const LICENSE_KIND: &str = "License";

/// A license document as distributed to the customer.
///
/// The document is untrusted until it has passed
/// [`LicenseVerifier::verify`](crate::verifier::LicenseVerifier::verify).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Schema version of the transport document.
    #[serde(default)]
    pub api_version: String,
    /// Object kind, always `License`.
    pub kind: String,
    /// Object metadata.
    #[serde(default)]
    pub metadata: LicenseMetadata,
    /// License body.
    pub spec: LicenseSpec,
}

/// Metadata wrapper of the transport document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseMetadata {
    /// Object name, usually the customer slug.
    #[serde(default)]
    pub name: String,
}

/// Identity, policy and entitlement fields of a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSpec {
    /// Application the license is issued for.
    #[serde(default)]
    pub app_slug: String,
    /// Unique license identifier.
    #[serde(rename = "licenseID")]
    pub license_id: String,
    /// Commercial license type, e.g. `prod` or `trial`.
    #[serde(default)]
    pub license_type: String,
    /// Licensed customer.
    #[serde(default)]
    pub customer_name: String,
    /// Customer contact address, when the issuer recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Release channel identifier.
    #[serde(rename = "channelID", default)]
    pub channel_id: String,
    /// Release channel display name.
    #[serde(default)]
    pub channel_name: String,
    /// Issuance sequence number, bumped on every re-issue.
    #[serde(default)]
    pub license_sequence: i64,
    /// Callback endpoint the licensed application trusts.
    pub endpoint: String,
    /// Entitlements keyed by name.
    #[serde(default)]
    pub entitlements: BTreeMap<String, EntitlementField>,
    /// Air-gapped installs allowed.
    #[serde(default)]
    pub is_airgap_supported: bool,
    /// GitOps delivery allowed.
    #[serde(default)]
    pub is_git_ops_supported: bool,
    /// Snapshots allowed.
    #[serde(default)]
    pub is_snapshot_supported: bool,
    /// Support bundle upload allowed.
    #[serde(default)]
    pub is_support_bundle_upload_supported: bool,
    /// Identity service allowed.
    #[serde(default)]
    pub is_identity_service_supported: bool,
    /// Releases must follow semantic versioning.
    #[serde(default)]
    pub is_semver_required: bool,
    /// Base64 text of the outer signed envelope.
    pub signature: String,
}

/// A single entitlement granted by the license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementField {
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Granted value; `null` or a missing key decode as [`EntitlementValue::Null`].
    #[serde(default)]
    pub value: EntitlementValue,
    /// Declared type name, e.g. `Integer` or `Text`.
    #[serde(default)]
    pub value_type: String,
    /// Whether the entitlement is hidden from the customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

/// Scalar value of an entitlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntitlementValue {
    /// Explicitly unset.
    #[default]
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Whole number.
    Int(i64),
    /// Floating point number; never produced by a valid issuer.
    Float(f64),
    /// Free text.
    Str(String),
}

impl fmt::Display for EntitlementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementValue::Null => Ok(()),
            EntitlementValue::Bool(value) => write!(f, "{value}"),
            EntitlementValue::Int(value) => write!(f, "{value}"),
            EntitlementValue::Float(value) => write!(f, "{value}"),
            EntitlementValue::Str(value) => f.write_str(value),
        }
    }
}

impl License {
    /// Decode a license from its YAML transport form.
    pub fn from_yaml_slice(raw: &[u8]) -> Result<Self> {
        let license: License = serde_yaml::from_slice(raw)
            .map_err(|err| VerifyError::malformed_input("failed to decode license document", err))?;
        license.ensure_kind()?;
        debug!(
            license_id = %license.spec.license_id,
            name = %license.metadata.name,
            "license document decoded"
        );
        Ok(license)
    }

    /// Decode a license from YAML text.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Self::from_yaml_slice(raw.as_bytes())
    }

    /// Identifier of the license.
    #[must_use]
    pub fn license_id(&self) -> &str {
        &self.spec.license_id
    }

    /// Trusted callback endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.spec.endpoint
    }

    fn ensure_kind(&self) -> Result<()> {
        if self.kind != LICENSE_KIND {
            return Err(VerifyError::malformed_input(
                "unexpected document kind",
                format!("expected {LICENSE_KIND}, found {:?}", self.kind),
            ));
        }
        Ok(())
    }
}
