//! ---
//! lvs_section: "15-testing-qa-runbook"
//! lvs_subsection: "integration-tests"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Verification of issued license fixtures."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
mod support;

use r_lvs_licensing::{
    CheckedField, ErrorKind, FieldSet, LicenseVerifier, SignatureStage, VerifyError,
};
use support::{fixture_license, rsa_public_key, rsa_verifier};

#[test]
fn verifies_fixture_licenses() {
    struct Case {
        name: &'static str,
        fixture: &'static str,
        want_err: Option<&'static str>,
    }

    let cases = [
        Case {
            name: "basic valid signature",
            fixture: "valid",
            want_err: None,
        },
        Case {
            name: "invalid signature",
            fixture: "corrupt_outer_signature",
            want_err: Some("failed to verify license signature: signature is invalid"),
        },
        Case {
            name: "licenseID field changed",
            fixture: "license_id_changed",
            want_err: Some(r#""licenseID" field has changed"#),
        },
        Case {
            name: "endpoint field changed",
            fixture: "endpoint_changed",
            want_err: Some(r#""endpoint" field has changed"#),
        },
        Case {
            name: "inner snapshot re-wrapped without inner signature",
            fixture: "forged_inner_snapshot",
            want_err: Some("failed to verify inner signature: signature is invalid"),
        },
    ];

    let verifier = rsa_verifier();
    for case in cases {
        let license = fixture_license(case.fixture);
        let result = verifier.verify(&license);
        match (case.want_err, result) {
            (None, Ok(verified)) => {
                assert_eq!(verified.license(), &license, "{}", case.name);
            }
            (Some(message), Err(err)) => assert_eq!(err.to_string(), message, "{}", case.name),
            (want, got) => panic!("{}: expected {want:?}, got {got:?}", case.name),
        }
    }
}

#[test]
fn verified_license_keeps_identity_fields() {
    let license = fixture_license("valid");
    let verified = rsa_verifier().verify(&license).expect("valid license");

    assert_eq!(verified.spec.license_id, "1vusOokxAVp1tkRGuyxnF23PJcq");
    assert_eq!(verified.spec.customer_name, "Test Customer");
    assert_eq!(verified.spec.channel_id, "1vusIYZLAVxMG6q760OJmRKj5i5");
    assert_eq!(verified.endpoint(), "https://replicated.app");
    assert_eq!(verified.snapshot().license_id, verified.spec.license_id);
    assert_eq!(
        verified.outer_key_fingerprint(),
        rsa_public_key("outer").fingerprint()
    );
    assert_ne!(
        verified.outer_key_fingerprint(),
        verified.inner_key_fingerprint()
    );
    assert_eq!(verified.into_inner(), license);
}

#[test]
fn failure_kinds_are_distinguishable() {
    let verifier = rsa_verifier();

    let err = verifier
        .verify(&fixture_license("corrupt_outer_signature"))
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::InvalidSignature {
            stage: SignatureStage::Outer,
            ..
        }
    ));

    let err = verifier
        .verify(&fixture_license("forged_inner_snapshot"))
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::InvalidSignature {
            stage: SignatureStage::Inner,
            ..
        }
    ));

    let err = verifier
        .verify(&fixture_license("license_id_changed"))
        .unwrap_err();
    assert_eq!(err, VerifyError::FieldTampered { field: "licenseID" });
    assert_eq!(err.kind(), ErrorKind::FieldTampered);
}

#[test]
fn swapped_keys_fail_at_the_outer_signature() {
    let verifier = LicenseVerifier::new(rsa_public_key("inner"), rsa_public_key("outer"));
    let err = verifier.verify(&fixture_license("valid")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to verify license signature: signature is invalid"
    );
}

#[test]
fn verification_is_repeatable_and_non_mutating() {
    let verifier = rsa_verifier();
    let license = fixture_license("endpoint_changed");
    let before = license.clone();

    let first = verifier.verify(&license);
    let second = verifier.verify(&license);
    assert_eq!(first, second);
    assert_eq!(license, before);

    let valid = fixture_license("valid");
    assert_eq!(
        verifier.verify(&valid).expect("valid"),
        verifier.verify(&valid).expect("valid")
    );
}

#[test]
fn tamper_checks_do_not_bleed_into_each_other() {
    let verifier = rsa_verifier().with_checked_fields(FieldSet::new([
        CheckedField::Endpoint,
        CheckedField::LicenseId,
    ]));
    // Endpoint is checked first here, but only licenseID was edited.
    let err = verifier
        .verify(&fixture_license("license_id_changed"))
        .unwrap_err();
    assert_eq!(err.to_string(), r#""licenseID" field has changed"#);

    let err = verifier
        .verify(&fixture_license("endpoint_changed"))
        .unwrap_err();
    assert_eq!(err.to_string(), r#""endpoint" field has changed"#);
}

#[test]
fn concurrent_verification_shares_one_verifier() {
    let verifier = rsa_verifier();
    let fixtures = ["valid", "license_id_changed", "endpoint_changed", "valid"];

    std::thread::scope(|scope| {
        let handles: Vec<_> = fixtures
            .iter()
            .map(|fixture| {
                let verifier = &verifier;
                scope.spawn(move || verifier.verify(&fixture_license(fixture)).is_ok())
            })
            .collect();
        let outcomes: Vec<bool> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect();
        assert_eq!(outcomes, vec![true, false, false, true]);
    });
}
