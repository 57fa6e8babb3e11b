//! ---
//! lvs_section: "01-core-functionality"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "License document loading and verification authorities."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::fs;

use anyhow::{anyhow, Context, Result};
use r_lvs_licensing::{License, LicenseVerifier, VerifiedLicense};
use tracing::debug;

use crate::config::{LicenseSourceConfig, VerifierConfig};

/// Trait abstraction for license verification strategies.
pub trait LicenseAuthority {
    /// Load and verify the license, returning the verified document.
    fn verify(&self) -> Result<VerifiedLicense>;
}

/// Reads license documents from the configured file or environment variable.
#[derive(Debug, Clone)]
pub struct LicenseLoader {
    config: LicenseSourceConfig,
}

impl LicenseLoader {
    #[must_use]
    pub fn new(config: &LicenseSourceConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Load and decode the license. A configured path that does not exist
    /// falls through to the environment variable.
    pub fn load(&self) -> Result<License> {
        let raw = self
            .load_material()?
            .ok_or_else(|| anyhow!("license material missing"))?;
        License::from_yaml_str(&raw).context("failed to decode license document")
    }

    fn load_material(&self) -> Result<Option<String>> {
        if let Some(path) = &self.config.path {
            if path.exists() {
                debug!(license_path = %path.display(), "loading license file");
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("unable to read license file {}", path.display()))?;
                return Ok(Some(raw));
            }
        }

        match std::env::var(&self.config.env_var) {
            Ok(value) if !value.trim().is_empty() => {
                debug!(env = %self.config.env_var, "loaded license material from environment");
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }
}

/// Production authority: loads the license and runs it through a verifier.
#[derive(Debug, Clone)]
pub struct ConfiguredAuthority {
    loader: LicenseLoader,
    verifier: LicenseVerifier,
}

impl ConfiguredAuthority {
    #[must_use]
    pub fn new(loader: LicenseLoader, verifier: LicenseVerifier) -> Self {
        Self { loader, verifier }
    }

    /// Build an authority from configuration, loading both public keys.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        Ok(Self::new(
            LicenseLoader::new(&config.license),
            config.build_verifier()?,
        ))
    }

    pub fn verifier(&self) -> &LicenseVerifier {
        &self.verifier
    }
}

impl LicenseAuthority for ConfiguredAuthority {
    fn verify(&self) -> Result<VerifiedLicense> {
        let license = self.loader.load()?;
        self.verifier
            .verify(&license)
            .with_context(|| format!("license {} failed verification", license.license_id()))
    }
}

/// Mock authority returning a predetermined response, useful for tests and examples.
#[derive(Debug, Clone)]
pub struct MockLicenseAuthority {
    response: VerifiedLicense,
}

impl MockLicenseAuthority {
    #[must_use]
    pub fn new(response: VerifiedLicense) -> Self {
        Self { response }
    }
}

impl LicenseAuthority for MockLicenseAuthority {
    fn verify(&self) -> Result<VerifiedLicense> {
        Ok(self.response.clone())
    }
}
