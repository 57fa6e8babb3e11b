//! ---
//! lvs_section: "01-core-functionality"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Shared plumbing around the license verification engine."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
//! Shared plumbing for hosts embedding R-LVS.
//! This crate exposes configuration loading, logging setup, and license
//! loading on top of the `r-lvs-licensing` engine.

pub mod config;
pub mod license;
pub mod logging;

pub use config::{
    KeyConfig, LicenseSourceConfig, LoadedVerifierConfig, LoggingConfig, VerifierConfig,
};
pub use license::{ConfiguredAuthority, LicenseAuthority, LicenseLoader, MockLicenseAuthority};
pub use logging::{init_tracing, LogFormat};
