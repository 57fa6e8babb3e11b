//! ---
//! lvs_section: "01-core-functionality"
//! lvs_subsection: "module"
//! lvs_type: "source"
//! lvs_scope: "code"
//! lvs_description: "Tracing subscriber setup for hosts embedding the verifier."
//! lvs_version: "v0.0.0-prealpha"
//! lvs_owner: "tbd"
//! ---
//! Verification events are emitted through `tracing` by the engine crate.
//! Hosts without a subscriber of their own call [`init_tracing`] once at
//! startup; hosts that already install one simply skip it.

use std::io;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Filter directive override, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "R_LVS_LOG";

static GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Output formats for the stdout layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    StructuredJson,
    /// Human readable, multi-field lines.
    Pretty,
}

/// Event filter: `R_LVS_LOG`, then `RUST_LOG`, then `fallback`.
pub fn env_filter(fallback: &str) -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        match EnvFilter::try_new(&directive) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring invalid {LOG_ENV} directive {directive:?}: {err}"),
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().boxed(),
        LogFormat::Pretty => layer.with_target(true).boxed(),
    }
}

fn file_layer<S>(writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_ansi(false)
        .json()
        .with_writer(writer)
        .boxed()
}

/// Install the global subscriber described by `config`.
///
/// Returns `Ok(false)` when a subscriber was already installed; the
/// existing one is kept.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<bool> {
    let mut guards = Vec::with_capacity(2);

    let (stdout_writer, guard) = tracing_appender::non_blocking(io::stdout());
    guards.push(guard);

    let file = if config.write_file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!(
                "unable to create log directory {}",
                config.directory.display()
            )
        })?;
        let appender = rolling::daily(&config.directory, config.file_name(service_name));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(file_layer(writer))
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(stdout_layer(config.format, stdout_writer))
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        let _ = GUARDS.set(guards);
        let log_file = config.write_file.then(|| config.file_name(service_name));
        info!(
            service = %service_name,
            format = ?config.format,
            log_file = ?log_file,
            "tracing initialised"
        );
    }
    Ok(installed)
}
