//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Deterministic encoding of the security-critical license fields."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
//! Canonical snapshot of the fields a license signature protects.
//!
//! Fields are serialised as compact JSON in declaration order and
//! entitlements are kept in a [`BTreeMap`], so two logically identical
//! licenses always encode to the same bytes whatever order their source
//! document listed the entitlements in.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifyError};
use crate::license::{EntitlementField, EntitlementValue, LicenseSpec};

/// Declared type of an entitlement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitlementType {
    /// Boolean flag.
    Boolean,
    /// Whole number.
    Integer,
    /// Single line text.
    String,
    /// Multi line text.
    Text,
    /// Encoded file contents.
    File,
}

impl EntitlementType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementType::Boolean => "Boolean",
            EntitlementType::Integer => "Integer",
            EntitlementType::String => "String",
            EntitlementType::Text => "Text",
            EntitlementType::File => "File",
        }
    }
}

impl fmt::Display for EntitlementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitlementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Boolean" => Ok(EntitlementType::Boolean),
            "Integer" => Ok(EntitlementType::Integer),
            "String" => Ok(EntitlementType::String),
            "Text" => Ok(EntitlementType::Text),
            "File" => Ok(EntitlementType::File),
            other => Err(format!("unsupported value type {other:?}")),
        }
    }
}

/// Entitlement value restricted to the representable scalar kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    /// Explicitly unset value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Text value.
    Str(String),
}

/// Canonical form of a single entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEntitlement {
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Optional description, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value checked against `value_type`.
    pub value: CanonicalValue,
    /// Declared type.
    pub value_type: EntitlementType,
    /// Hidden entitlements are not shown to the customer; omitted when false.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hidden: bool,
}

/// The security-critical fields of a license, in canonical order.
///
/// Field order is the encoding order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSnapshot {
    /// Unique license identifier.
    #[serde(rename = "licenseID")]
    pub license_id: String,
    /// Commercial license type, e.g. `prod` or `trial`.
    #[serde(default)]
    pub license_type: String,
    /// Licensed customer.
    #[serde(default)]
    pub customer_name: String,
    /// Customer contact, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    /// Application the license is issued for.
    #[serde(default)]
    pub app_slug: String,
    /// Release channel identifier.
    #[serde(rename = "channelID", default)]
    pub channel_id: String,
    /// Release channel display name.
    #[serde(default)]
    pub channel_name: String,
    /// Issuance sequence number.
    #[serde(default)]
    pub license_sequence: i64,
    /// Trusted callback endpoint.
    pub endpoint: String,
    /// Entitlements keyed by name.
    #[serde(default)]
    pub entitlements: BTreeMap<String, CanonicalEntitlement>,
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
}

impl CanonicalSnapshot {
    /// Project the security-critical fields out of a live license.
    pub fn from_spec(spec: &LicenseSpec) -> Result<Self> {
        let entitlements = canonical_entitlements(&spec.entitlements)?;

        Ok(Self {
            license_id: spec.license_id.clone(),
            license_type: spec.license_type.clone(),
            customer_name: spec.customer_name.clone(),
            customer_email: spec.customer_email.clone(),
            app_slug: spec.app_slug.clone(),
            channel_id: spec.channel_id.clone(),
            channel_name: spec.channel_name.clone(),
            license_sequence: spec.license_sequence,
            endpoint: spec.endpoint.clone(),
            entitlements,
            is_airgap_supported: spec.is_airgap_supported,
            is_git_ops_supported: spec.is_git_ops_supported,
            is_snapshot_supported: spec.is_snapshot_supported,
            is_support_bundle_upload_supported: spec.is_support_bundle_upload_supported,
            is_identity_service_supported: spec.is_identity_service_supported,
            is_semver_required: spec.is_semver_required,
        })
    }

    /// Serialise into the canonical byte representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| VerifyError::Encoding(err.to_string()))
    }

    /// Decode a snapshot previously produced by [`CanonicalSnapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| VerifyError::malformed_payload("failed to decode license snapshot", err))
    }
}

/// Encode the security-critical fields of `spec` into canonical bytes.
pub fn encode(spec: &LicenseSpec) -> Result<Vec<u8>> {
    CanonicalSnapshot::from_spec(spec)?.to_bytes()
}

/// Canonical form of every entitlement, keyed and ordered by name.
pub fn canonical_entitlements(
    entitlements: &BTreeMap<String, EntitlementField>,
) -> Result<BTreeMap<String, CanonicalEntitlement>> {
    entitlements
        .iter()
        .map(|(name, field)| Ok((name.clone(), canonical_entitlement(name, field)?)))
        .collect()
}

fn canonical_entitlement(name: &str, field: &EntitlementField) -> Result<CanonicalEntitlement> {
    let value_type = field
        .value_type
        .parse::<EntitlementType>()
        .map_err(|reason| VerifyError::Encoding(format!("entitlement {name:?}: {reason}")))?;

    // Values are never echoed back: hidden entitlements carry secrets.
    let value = match (value_type, &field.value) {
        (_, EntitlementValue::Null) => CanonicalValue::Null,
        (EntitlementType::Boolean, EntitlementValue::Bool(value)) => CanonicalValue::Bool(*value),
        (EntitlementType::Integer, EntitlementValue::Int(value)) => CanonicalValue::Int(*value),
        (
            EntitlementType::String | EntitlementType::Text | EntitlementType::File,
            EntitlementValue::Str(value),
        ) => CanonicalValue::Str(value.clone()),
        (_, EntitlementValue::Float(_)) => {
            return Err(VerifyError::Encoding(format!(
                "entitlement {name:?}: floating point values are not supported"
            )))
        }
        (expected, _) => {
            return Err(VerifyError::Encoding(format!(
                "entitlement {name:?}: value does not match value type {expected}"
            )))
        }
    };

    Ok(CanonicalEntitlement {
        title: field.title.clone(),
        description: field.description.clone(),
        value,
        value_type,
        is_hidden: field.is_hidden.unwrap_or(false),
    })
}
