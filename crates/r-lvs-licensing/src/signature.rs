//! ---
//! lvs_section: "02-license-verification"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Public key handling and signature verification primitives."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, VerifyingKey};
use md5::Md5;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, Pss, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{Result, SignatureStage, VerifyError};

/// Opaque reason a signature was rejected.
///
/// Deliberately carries no detail about where verification diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature does not verify under the key.
    #[error("signature is invalid")]
    Rejected,
    /// The signature is not the size the key produces.
    #[error("signature has invalid length")]
    InvalidLength,
}

/// Signature algorithm bound to a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// RSA-PSS with MD5 digest and maximum salt length, as used by issued licenses.
    RsaPssMd5,
    /// RSA-PSS with SHA-256 digest and maximum salt length.
    RsaPssSha256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RsaPkcs1v15Sha256,
    /// Ed25519 in strict mode.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Configuration name of the algorithm.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaPssMd5 => "rsa-pss-md5",
            SignatureAlgorithm::RsaPssSha256 => "rsa-pss-sha256",
            SignatureAlgorithm::RsaPkcs1v15Sha256 => "rsa-pkcs1v15-sha256",
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }

    /// True for the RSA family.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        !matches!(self, SignatureAlgorithm::Ed25519)
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa-pss-md5" => Ok(SignatureAlgorithm::RsaPssMd5),
            "rsa-pss-sha256" => Ok(SignatureAlgorithm::RsaPssSha256),
            "rsa-pkcs1v15-sha256" => Ok(SignatureAlgorithm::RsaPkcs1v15Sha256),
            "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            other => Err(VerifyError::Key(format!(
                "unknown signature algorithm {other:?}"
            ))),
        }
    }
}

#[derive(Clone)]
enum KeyMaterial {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

/// Verification key together with the algorithm it is used with.
///
/// Keys are immutable once built; rotating a key means building a new
/// [`PublicKey`] and a new verifier around it.
#[derive(Clone)]
pub struct PublicKey {
    material: KeyMaterial,
    algorithm: SignatureAlgorithm,
    fingerprint: String,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl PublicKey {
    /// Wrap an RSA key for one of the RSA algorithms.
    pub fn from_rsa(key: RsaPublicKey, algorithm: SignatureAlgorithm) -> Result<Self> {
        if !algorithm.is_rsa() {
            return Err(VerifyError::Key(format!(
                "algorithm {algorithm} cannot be used with an RSA key"
            )));
        }
        let der = key
            .to_public_key_der()
            .map_err(|err| VerifyError::Key(format!("failed to encode RSA key: {err}")))?;
        Ok(Self {
            fingerprint: fingerprint(der.as_bytes()),
            material: KeyMaterial::Rsa(key),
            algorithm,
        })
    }

    /// Parse an RSA key from SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_rsa_pem(pem: &str, algorithm: SignatureAlgorithm) -> Result<Self> {
        let pem = pem.trim();
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|err| VerifyError::Key(format!("failed to parse RSA public key PEM: {err}")))?;
        Self::from_rsa(key, algorithm)
    }

    /// Wrap an Ed25519 verifying key.
    #[must_use]
    pub fn from_ed25519(key: VerifyingKey) -> Self {
        Self {
            fingerprint: fingerprint(key.as_bytes()),
            material: KeyMaterial::Ed25519(key),
            algorithm: SignatureAlgorithm::Ed25519,
        }
    }

    /// Build an Ed25519 key from its 32 raw bytes.
    pub fn from_ed25519_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(bytes)
            .map_err(|err| VerifyError::Key(format!("invalid Ed25519 public key: {err}")))?;
        Ok(Self::from_ed25519(key))
    }

    /// Build an Ed25519 key from hex or base64 text of its raw bytes.
    pub fn from_ed25519_encoded(text: &str) -> Result<Self> {
        let text = text.trim();
        let bytes = if text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit()) {
            hex::decode(text).map_err(|err| VerifyError::Key(err.to_string()))?
        } else {
            general_purpose::STANDARD
                .decode(text)
                .map_err(|err| VerifyError::Key(format!("Ed25519 key must be hex or base64: {err}")))?
        };
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| VerifyError::Key("Ed25519 public key must be 32 bytes".to_owned()))?;
        Self::from_ed25519_bytes(&raw)
    }

    /// Parse key text in the encoding appropriate for `algorithm`.
    pub fn parse(text: &str, algorithm: SignatureAlgorithm) -> Result<Self> {
        if algorithm.is_rsa() {
            Self::from_rsa_pem(text, algorithm)
        } else {
            Self::from_ed25519_encoded(text)
        }
    }

    /// Algorithm this key verifies with.
    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// SHA-256 hex fingerprint of the encoded key; safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> std::result::Result<(), SignatureError> {
        match &self.material {
            KeyMaterial::Rsa(key) => verify_rsa(key, self.algorithm, message, signature),
            KeyMaterial::Ed25519(key) => {
                let signature =
                    Signature::from_slice(signature).map_err(|_| SignatureError::InvalidLength)?;
                key.verify_strict(message, &signature)
                    .map_err(|_| SignatureError::Rejected)
            }
        }
    }
}

/// Largest PSS salt that fits the modulus of `key` for digest `D`.
///
/// Issuers sign with the "auto" salt length, which is this value.
#[must_use]
pub fn max_pss_salt_len<D: Digest>(key: &RsaPublicKey) -> usize {
    let em_bits = key.n().bits().saturating_sub(1);
    let em_len = (em_bits + 7) / 8;
    em_len.saturating_sub(<D as Digest>::output_size() + 2)
}

fn verify_rsa(
    key: &RsaPublicKey,
    algorithm: SignatureAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> std::result::Result<(), SignatureError> {
    if signature.len() != key.size() {
        return Err(SignatureError::InvalidLength);
    }
    let outcome = match algorithm {
        SignatureAlgorithm::RsaPssMd5 => key.verify(
            Pss::new_with_salt::<Md5>(max_pss_salt_len::<Md5>(key)),
            &Md5::digest(message),
            signature,
        ),
        SignatureAlgorithm::RsaPssSha256 => key.verify(
            Pss::new_with_salt::<Sha256>(max_pss_salt_len::<Sha256>(key)),
            &Sha256::digest(message),
            signature,
        ),
        SignatureAlgorithm::RsaPkcs1v15Sha256 => key.verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &Sha256::digest(message),
            signature,
        ),
        SignatureAlgorithm::Ed25519 => return Err(SignatureError::Rejected),
    };
    outcome.map_err(|_| SignatureError::Rejected)
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Verify the outer signature over the exact envelope payload bytes.
pub fn verify_outer(license_data: &[u8], signature: &[u8], key: &PublicKey) -> Result<()> {
    verify_stage(SignatureStage::Outer, license_data, signature, key)
}

/// Verify the inner signature over the embedded canonical snapshot bytes.
pub fn verify_inner(snapshot: &[u8], signature: &[u8], key: &PublicKey) -> Result<()> {
    verify_stage(SignatureStage::Inner, snapshot, signature, key)
}

fn verify_stage(
    stage: SignatureStage,
    message: &[u8],
    signature: &[u8],
    key: &PublicKey,
) -> Result<()> {
    key.verify(message, signature)
        .map_err(|source| VerifyError::InvalidSignature { stage, source })
}
