//! ---
//! lvs_section: "15-testing-qa-runbook"
//! lvs_subsection: "integration-tests"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Fixture loading and test-only license issuance."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use r_lvs_licensing::canonical::CanonicalSnapshot;
use r_lvs_licensing::signature::max_pss_salt_len;
use r_lvs_licensing::{
    EnvelopeLevel, License, LicenseVerifier, PublicKey, SignatureAlgorithm, SignedEnvelope,
};
use rand::SeedableRng;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pss, RsaPrivateKey};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture should exist")
}

pub fn fixture_license(name: &str) -> License {
    License::from_yaml_str(&fixture_text(&format!("{name}.yaml"))).expect("fixture decodes")
}

pub fn rsa_public_key(role: &str) -> PublicKey {
    PublicKey::from_rsa_pem(
        &fixture_text(&format!("{role}_public.pem")),
        SignatureAlgorithm::RsaPssMd5,
    )
    .expect("fixture public key parses")
}

pub fn rsa_verifier() -> LicenseVerifier {
    LicenseVerifier::new(rsa_public_key("outer"), rsa_public_key("inner"))
}

static OUTER_RSA: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaPrivateKey::from_pkcs8_pem(&fixture_text("outer_private.pem")).expect("outer key parses")
});
static INNER_RSA: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaPrivateKey::from_pkcs8_pem(&fixture_text("inner_private.pem")).expect("inner key parses")
});

/// Signs messages the way an issuer would, for one of the supported schemes.
pub enum TestSigner {
    RsaPssMd5(&'static RsaPrivateKey),
    Ed25519(SigningKey),
}

impl TestSigner {
    pub fn outer_rsa() -> Self {
        TestSigner::RsaPssMd5(&OUTER_RSA)
    }

    pub fn inner_rsa() -> Self {
        TestSigner::RsaPssMd5(&INNER_RSA)
    }

    pub fn ed25519(seed: u8) -> Self {
        TestSigner::Ed25519(SigningKey::from_bytes(&[seed; 32]))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            TestSigner::RsaPssMd5(key) => {
                PublicKey::from_rsa(key.to_public_key(), SignatureAlgorithm::RsaPssMd5)
                    .expect("rsa public key")
            }
            TestSigner::Ed25519(key) => PublicKey::from_ed25519(key.verifying_key()),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            TestSigner::RsaPssMd5(key) => {
                let salt = max_pss_salt_len::<Md5>(&key.to_public_key());
                let mut rng = rand::rngs::StdRng::seed_from_u64(42);
                key.sign_with_rng(&mut rng, Pss::new_with_salt::<Md5>(salt), &Md5::digest(message))
                    .expect("rsa signing succeeds")
            }
            TestSigner::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
        }
    }
}

/// Pieces of an issued signature, kept apart so tests can tamper with each.
pub struct Issued {
    pub snapshot: Vec<u8>,
    pub inner_signature: Vec<u8>,
    pub inner_json: Vec<u8>,
    pub outer_signature: Vec<u8>,
}

impl Issued {
    pub fn new(snapshot: Vec<u8>, outer: &TestSigner, inner: &TestSigner) -> Self {
        let inner_signature = inner.sign(&snapshot);
        let inner_json = SignedEnvelope {
            payload: snapshot.clone(),
            signature: inner_signature.clone(),
        }
        .to_json(EnvelopeLevel::Inner);
        let outer_signature = outer.sign(&inner_json);
        Self {
            snapshot,
            inner_signature,
            inner_json,
            outer_signature,
        }
    }

    pub fn for_license(license: &License, outer: &TestSigner, inner: &TestSigner) -> Self {
        let snapshot = CanonicalSnapshot::from_spec(&license.spec)
            .and_then(|snapshot| snapshot.to_bytes())
            .expect("license encodes");
        Self::new(snapshot, outer, inner)
    }

    pub fn signature_text(&self) -> String {
        let outer = SignedEnvelope {
            payload: self.inner_json.clone(),
            signature: self.outer_signature.clone(),
        };
        general_purpose::STANDARD.encode(outer.to_json(EnvelopeLevel::Outer))
    }
}

/// Issue `license` with the given signers, replacing its signature.
pub fn issue(mut license: License, outer: &TestSigner, inner: &TestSigner) -> License {
    license.spec.signature = Issued::for_license(&license, outer, inner).signature_text();
    license
}

pub fn unsigned_license() -> License {
    let mut license = fixture_license("valid");
    license.spec.signature = String::new();
    license
}
