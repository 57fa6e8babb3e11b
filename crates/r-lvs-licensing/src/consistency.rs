//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Tamper checks between a live license and its signed snapshot."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::fmt;

use thiserror::Error;

use crate::canonical::{canonical_entitlements, CanonicalSnapshot};
use crate::error::{Result, VerifyError};
use crate::license::{License, LicenseSpec};

/// A license field covered by the tamper check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckedField {
    /// `licenseID`, always checked.
    LicenseId,
    /// `licenseType`.
    LicenseType,
    /// `customerName`.
    CustomerName,
    /// `customerEmail`.
    CustomerEmail,
    /// `appSlug`.
    AppSlug,
    /// `channelID`.
    ChannelId,
    /// `channelName`.
    ChannelName,
    /// `licenseSequence`.
    LicenseSequence,
    /// `endpoint`, always checked.
    Endpoint,
    /// The whole entitlement map, compared in canonical form.
    Entitlements,
    /// `isAirgapSupported`.
    IsAirgapSupported,
    /// `isGitOpsSupported`.
    IsGitOpsSupported,
    /// `isSnapshotSupported`.
    IsSnapshotSupported,
    /// `isSupportBundleUploadSupported`.
    IsSupportBundleUploadSupported,
    /// `isIdentityServiceSupported`.
    IsIdentityServiceSupported,
    /// `isSemverRequired`.
    IsSemverRequired,
}

impl CheckedField {
    /// Every field, in canonical encoding order.
    pub const ALL: [CheckedField; 16] = [
        CheckedField::LicenseId,
        CheckedField::LicenseType,
        CheckedField::CustomerName,
        CheckedField::CustomerEmail,
        CheckedField::AppSlug,
        CheckedField::ChannelId,
        CheckedField::ChannelName,
        CheckedField::LicenseSequence,
        CheckedField::Endpoint,
        CheckedField::Entitlements,
        CheckedField::IsAirgapSupported,
        CheckedField::IsGitOpsSupported,
        CheckedField::IsSnapshotSupported,
        CheckedField::IsSupportBundleUploadSupported,
        CheckedField::IsIdentityServiceSupported,
        CheckedField::IsSemverRequired,
    ];

    /// Fields that can never be dropped from a [`FieldSet`].
    pub const MANDATORY: [CheckedField; 2] = [CheckedField::LicenseId, CheckedField::Endpoint];

    /// Wire name of the field, as used in tamper messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CheckedField::LicenseId => "licenseID",
            CheckedField::LicenseType => "licenseType",
            CheckedField::CustomerName => "customerName",
            CheckedField::CustomerEmail => "customerEmail",
            CheckedField::AppSlug => "appSlug",
            CheckedField::ChannelId => "channelID",
            CheckedField::ChannelName => "channelName",
            CheckedField::LicenseSequence => "licenseSequence",
            CheckedField::Endpoint => "endpoint",
            CheckedField::Entitlements => "entitlements",
            CheckedField::IsAirgapSupported => "isAirgapSupported",
            CheckedField::IsGitOpsSupported => "isGitOpsSupported",
            CheckedField::IsSnapshotSupported => "isSnapshotSupported",
            CheckedField::IsSupportBundleUploadSupported => "isSupportBundleUploadSupported",
            CheckedField::IsIdentityServiceSupported => "isIdentityServiceSupported",
            CheckedField::IsSemverRequired => "isSemverRequired",
        }
    }

    /// Look a field up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Whether the live value differs from the signed one. A live
    /// entitlement map that has no canonical form cannot equal the signed
    /// one and counts as a difference.
    fn differs(&self, live: &LicenseSpec, signed: &CanonicalSnapshot) -> bool {
        match self {
            CheckedField::LicenseId => live.license_id != signed.license_id,
            CheckedField::LicenseType => live.license_type != signed.license_type,
            CheckedField::CustomerName => live.customer_name != signed.customer_name,
            CheckedField::CustomerEmail => live.customer_email != signed.customer_email,
            CheckedField::AppSlug => live.app_slug != signed.app_slug,
            CheckedField::ChannelId => live.channel_id != signed.channel_id,
            CheckedField::ChannelName => live.channel_name != signed.channel_name,
            CheckedField::LicenseSequence => live.license_sequence != signed.license_sequence,
            CheckedField::Endpoint => live.endpoint != signed.endpoint,
            CheckedField::Entitlements => canonical_entitlements(&live.entitlements)
                .map_or(true, |entitlements| entitlements != signed.entitlements),
            CheckedField::IsAirgapSupported => {
                live.is_airgap_supported != signed.is_airgap_supported
            }
            CheckedField::IsGitOpsSupported => {
                live.is_git_ops_supported != signed.is_git_ops_supported
            }
            CheckedField::IsSnapshotSupported => {
                live.is_snapshot_supported != signed.is_snapshot_supported
            }
            CheckedField::IsSupportBundleUploadSupported => {
                live.is_support_bundle_upload_supported
                    != signed.is_support_bundle_upload_supported
            }
            CheckedField::IsIdentityServiceSupported => {
                live.is_identity_service_supported != signed.is_identity_service_supported
            }
            CheckedField::IsSemverRequired => live.is_semver_required != signed.is_semver_required,
        }
    }
}

impl fmt::Display for CheckedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name that does not match any [`CheckedField`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown license field {0:?}")]
pub struct UnknownField(pub String);

/// Ordered list of fields compared by [`check_consistency`].
///
/// The first mismatching field in this order is the one reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<CheckedField>,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldSet {
    /// Every canonical field, in canonical order.
    #[must_use]
    pub fn all() -> Self {
        Self {
            fields: CheckedField::ALL.to_vec(),
        }
    }

    /// Build a set checked in the given order.
    ///
    /// Duplicates are dropped. Mandatory fields missing from `fields` are
    /// checked first.
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = CheckedField>) -> Self {
        let requested: Vec<CheckedField> = fields.into_iter().collect();
        let mut ordered: Vec<CheckedField> = CheckedField::MANDATORY
            .into_iter()
            .filter(|field| !requested.contains(field))
            .collect();
        for field in requested {
            if !ordered.contains(&field) {
                ordered.push(field);
            }
        }
        Self { fields: ordered }
    }

    /// Build a set from wire names.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> std::result::Result<Self, UnknownField> {
        let fields = names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                CheckedField::from_name(name).ok_or_else(|| UnknownField(name.to_owned()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self::new(fields))
    }

    /// Fields in check order.
    #[must_use]
    pub fn fields(&self) -> &[CheckedField] {
        &self.fields
    }

    /// Whether `field` is checked.
    #[must_use]
    pub fn contains(&self, field: CheckedField) -> bool {
        self.fields.contains(&field)
    }

    /// First field whose live value differs from the signed value.
    ///
    /// Only the fields in the set are looked at on the live side.
    #[must_use]
    pub fn first_mismatch(
        &self,
        live: &LicenseSpec,
        signed: &CanonicalSnapshot,
    ) -> Option<CheckedField> {
        self.fields
            .iter()
            .copied()
            .find(|field| field.differs(live, signed))
    }
}

/// Compare the live license against the verified snapshot.
///
/// Live fields outside `fields` are never inspected, so an entitlement
/// nobody checks cannot fail verification.
pub fn check_consistency(
    live: &License,
    snapshot: &CanonicalSnapshot,
    fields: &FieldSet,
) -> Result<()> {
    match fields.first_mismatch(&live.spec, snapshot) {
        Some(field) => Err(VerifyError::FieldTampered {
            field: field.name(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::canonical::CanonicalValue;
    use crate::license::{EntitlementField, EntitlementValue};

    fn live() -> LicenseSpec {
        let mut entitlements = BTreeMap::new();
        entitlements.insert(
            "int_field".to_owned(),
            EntitlementField {
                title: "Int Field".to_owned(),
                description: None,
                value: EntitlementValue::Int(123),
                value_type: "Integer".to_owned(),
                is_hidden: None,
            },
        );
        LicenseSpec {
            app_slug: "my-app".to_owned(),
            license_id: "1vusOokxAVp1tkRGuyxnF23PJcq".to_owned(),
            license_type: "prod".to_owned(),
            customer_name: "Test Customer".to_owned(),
            customer_email: None,
            channel_id: "1vusIYZLAVxMG6q760OJmRKj5i5".to_owned(),
            channel_name: "My Channel".to_owned(),
            license_sequence: 7,
            endpoint: "https://replicated.app".to_owned(),
            entitlements,
            is_airgap_supported: true,
            is_git_ops_supported: true,
            is_snapshot_supported: true,
            is_support_bundle_upload_supported: false,
            is_identity_service_supported: false,
            is_semver_required: false,
            signature: String::new(),
        }
    }

    fn signed() -> CanonicalSnapshot {
        CanonicalSnapshot::from_spec(&live()).expect("fixture encodes")
    }

    #[test]
    fn names_round_trip() {
        for field in CheckedField::ALL {
            assert_eq!(CheckedField::from_name(field.name()), Some(field));
        }
        assert_eq!(CheckedField::from_name("licenseId"), None);
    }

    #[test]
    fn first_mismatch_follows_set_order() {
        let signed = signed();
        let mut live = live();
        live.endpoint = "https://replicated.app.modified".to_owned();
        live.license_id.push_str("-modified");

        assert_eq!(
            FieldSet::all().first_mismatch(&live, &signed),
            Some(CheckedField::LicenseId)
        );
        let reversed = FieldSet::new([CheckedField::Endpoint, CheckedField::LicenseId]);
        assert_eq!(
            reversed.first_mismatch(&live, &signed),
            Some(CheckedField::Endpoint)
        );
    }

    #[test]
    fn mismatches_are_independent() {
        let signed = signed();
        let mut live = live();
        live.endpoint = "https://attacker.example".to_owned();
        assert_eq!(
            FieldSet::all().first_mismatch(&live, &signed),
            Some(CheckedField::Endpoint)
        );

        let mut live = self::live();
        live.entitlements
            .get_mut("int_field")
            .expect("entitlement present")
            .value = EntitlementValue::Int(9999);
        assert_eq!(
            FieldSet::all().first_mismatch(&live, &signed),
            Some(CheckedField::Entitlements)
        );
        assert_eq!(FieldSet::all().first_mismatch(&self::live(), &signed), None);
    }

    #[test]
    fn unencodable_live_entitlement_is_a_mismatch() {
        let signed = signed();
        for value in [
            EntitlementValue::Float(123.5),
            EntitlementValue::Str("unlimited".to_owned()),
        ] {
            let mut live = live();
            live.entitlements
                .get_mut("int_field")
                .expect("entitlement present")
                .value = value;
            assert_eq!(
                FieldSet::all().first_mismatch(&live, &signed),
                Some(CheckedField::Entitlements)
            );
        }
    }

    #[test]
    fn unchecked_entitlements_are_not_inspected() {
        let signed = signed();
        let mut live = live();
        live.entitlements
            .get_mut("int_field")
            .expect("entitlement present")
            .value_type = "Select".to_owned();
        let narrowed = FieldSet::new([CheckedField::ChannelId]);
        assert_eq!(narrowed.first_mismatch(&live, &signed), None);
        assert_eq!(
            FieldSet::all().first_mismatch(&live, &signed),
            Some(CheckedField::Entitlements)
        );
    }

    #[test]
    fn null_values_compare_equal() {
        let mut live = live();
        live.entitlements
            .get_mut("int_field")
            .expect("entitlement present")
            .value = EntitlementValue::Null;
        let signed = CanonicalSnapshot::from_spec(&live).expect("null encodes");
        assert_eq!(signed.entitlements["int_field"].value, CanonicalValue::Null);
        assert_eq!(FieldSet::all().first_mismatch(&live, &signed), None);
    }

    #[test]
    fn mandatory_fields_cannot_be_dropped() {
        let set = FieldSet::new([CheckedField::ChannelId, CheckedField::ChannelId]);
        assert_eq!(
            set.fields(),
            &[
                CheckedField::LicenseId,
                CheckedField::Endpoint,
                CheckedField::ChannelId
            ]
        );

        let signed = signed();
        let mut live = live();
        live.is_airgap_supported = false;
        assert_eq!(set.first_mismatch(&live, &signed), None);
        assert!(!set.contains(CheckedField::IsAirgapSupported));
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let set = FieldSet::parse(&["endpoint", " channelID "]).expect("known names");
        assert_eq!(
            set.fields(),
            &[CheckedField::LicenseId, CheckedField::Endpoint, CheckedField::ChannelId]
        );
        let err = FieldSet::parse(&["licenseId"]).expect_err("case sensitive");
        assert_eq!(err.to_string(), r#"unknown license field "licenseId""#);
    }
}
