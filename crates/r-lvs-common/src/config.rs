//! ---
//! lvs_section: "01-core-functionality"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Verifier configuration loading and key material resolution."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use r_lvs_licensing::{FieldSet, LicenseVerifier, PublicKey, SignatureAlgorithm};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_key_algorithm() -> SignatureAlgorithm {
    SignatureAlgorithm::RsaPssMd5
}

fn default_env_license_var() -> String {
    "R_LVS_LICENSE".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_write_file() -> bool {
    true
}

/// Configuration for verifying licenses offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Vendor key checking the outer envelope signature.
    pub outer_key: KeyConfig,
    /// Key checking the signature over the embedded snapshot.
    pub inner_key: KeyConfig,
    /// Wire names of the fields compared against the signed snapshot.
    /// Every canonical field is checked when absent.
    #[serde(default)]
    pub checked_fields: Option<Vec<String>>,
    /// Where the license document is read from.
    #[serde(default)]
    pub license: LicenseSourceConfig,
    /// Subscriber settings used by [`VerifierConfig::init_logging`].
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`VerifierConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedVerifierConfig {
    pub config: VerifierConfig,
    pub source: PathBuf,
}

impl VerifierConfig {
    pub const ENV_CONFIG_PATH: &str = "R_LVS_CONFIG";

    /// Load configuration from disk, respecting the `R_LVS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedVerifierConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedVerifierConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedVerifierConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading verifier configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<VerifierConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants without touching key material.
    pub fn validate(&self) -> Result<()> {
        self.outer_key.validate("outer_key")?;
        self.inner_key.validate("inner_key")?;
        self.field_set()?;
        Ok(())
    }

    /// Resolve the configured field names into a [`FieldSet`].
    pub fn field_set(&self) -> Result<FieldSet> {
        match &self.checked_fields {
            Some(names) => FieldSet::parse(names).context("invalid checked_fields"),
            None => Ok(FieldSet::all()),
        }
    }

    /// Install the tracing subscriber from the `[logging]` table.
    ///
    /// Returns `false` when the host already installed a subscriber.
    pub fn init_logging(&self, service_name: &str) -> Result<bool> {
        crate::logging::init_tracing(service_name, &self.logging)
    }

    /// Load both public keys and assemble a verifier. Key material is read on
    /// every call.
    pub fn build_verifier(&self) -> Result<LicenseVerifier> {
        let outer = self
            .outer_key
            .load()
            .context("failed to load outer public key")?;
        let inner = self
            .inner_key
            .load()
            .context("failed to load inner public key")?;
        debug!(
            outer_key = outer.fingerprint(),
            inner_key = inner.fingerprint(),
            "verifier keys loaded"
        );
        Ok(LicenseVerifier::new(outer, inner).with_checked_fields(self.field_set()?))
    }
}

impl std::str::FromStr for VerifierConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: VerifierConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where one public key comes from. Sources are tried as file, inline text,
/// then environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Signature scheme the key is used with; `rsa-pss-md5` when omitted.
    #[serde(default = "default_key_algorithm")]
    pub algorithm: SignatureAlgorithm,
    /// PEM file for RSA keys, hex or base64 text file for Ed25519 keys.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Key text embedded in the configuration.
    #[serde(default)]
    pub inline: Option<String>,
    /// Environment variable holding the key text.
    #[serde(default)]
    pub env_var: Option<String>,
}

impl KeyConfig {
    pub fn validate(&self, table: &str) -> Result<()> {
        if self.path.is_none() && self.inline.is_none() && self.env_var.is_none() {
            return Err(anyhow!(
                "{} must set one of path, inline or env_var",
                table
            ));
        }
        Ok(())
    }

    /// Read the key text from the first available source and parse it.
    pub fn load(&self) -> Result<PublicKey> {
        let text = self.material()?;
        PublicKey::parse(&text, self.algorithm)
            .with_context(|| format!("unable to parse {} public key", self.algorithm))
    }

    fn material(&self) -> Result<String> {
        if let Some(path) = &self.path {
            debug!(key_path = %path.display(), "reading public key file");
            return fs::read_to_string(path)
                .with_context(|| format!("unable to read key file {}", path.display()));
        }
        if let Some(inline) = &self.inline {
            return Ok(inline.clone());
        }
        if let Some(var) = &self.env_var {
            return match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(anyhow!("environment variable {} is not set", var)),
            };
        }
        Err(anyhow!("no key source configured"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseSourceConfig {
    /// License YAML file; ignored when it does not exist.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Environment variable holding the license YAML, `R_LVS_LICENSE` by default.
    #[serde(default = "default_env_license_var")]
    pub env_var: String,
}

impl Default for LicenseSourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            env_var: default_env_license_var(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Stdout format; the file is always JSON.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// File name prefix, the service name when unset.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `R_LVS_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Disable to log to stdout only.
    #[serde(default = "default_write_file")]
    pub write_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
            write_file: default_write_file(),
        }
    }
}

impl LoggingConfig {
    /// Base name of the rolling log file; the appender adds a date suffix.
    pub fn file_name(&self, service_name: &str) -> String {
        match &self.file_prefix {
            Some(prefix) => format!("{prefix}-{service_name}.log"),
            None => format!("{service_name}.log"),
        }
    }
}
