//! Tracing subscriber setup for the server binary.
//!
//! [`LogMode::from_env`] picks the output shape from `JACKTRACK_ENV`:
//!
//! | Mode          | stdout                        | file                                     |
//! |---------------|-------------------------------|------------------------------------------|
//! | `Development` | pretty, ANSI, span open/close | none                                     |
//! | `Production`  | compact, plain                | JSON, rotated daily in [`log_directory`] |
//!
//! The level filter is `RUST_LOG` when set, then `JACKTRACK_LOG_LEVEL`, then
//! `info`.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVEL_VAR: &str = "JACKTRACK_LOG_LEVEL";
const DIR_VAR: &str = "JACKTRACK_LOG_DIR";
const MODE_VAR: &str = "JACKTRACK_ENV";
const FILE_PREFIX: &str = "jacktrack";

// Dropping a guard flushes and stops its writer thread.
static WRITER_GUARDS: OnceLock<[WorkerGuard; 2]> = OnceLock::new();

/// Where and how logs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Human-readable output on stdout.
    Development,
    /// Structured file output for collection, plus plain stdout for journald.
    Production,
}

impl LogMode {
    /// `Production` when `JACKTRACK_ENV` is `production` (any case).
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var(MODE_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Install the global subscriber for `mode`.
///
/// # Errors
///
/// Fails if the level filter does not parse, or if the production log
/// directory cannot be created.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let filter = level_filter(std::env::var(LEVEL_VAR).ok().as_deref())?;
    match mode {
        LogMode::Development => init_development(filter),
        LogMode::Production => init_production(filter)?,
    }
    Ok(())
}

fn level_filter(fallback: Option<&str>) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = fallback.unwrap_or("info");
    EnvFilter::try_new(directive).with_context(|| format!("invalid {LEVEL_VAR} '{directive}'"))
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &dir,
        FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = WRITER_GUARDS.set([file_guard, stdout_guard]);
    Ok(())
}

fn init_development(filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

/// Directory for production log files.
///
/// `JACKTRACK_LOG_DIR` if set; otherwise `/var/log/jacktrack` on Linux and
/// a `logs` folder under the platform data directory elsewhere.
#[must_use]
pub fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(DIR_VAR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    default_log_directory()
}

#[cfg(target_os = "linux")]
fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/log/jacktrack")
}

#[cfg(not(target_os = "linux"))]
fn default_log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", FILE_PREFIX)
        .map_or_else(|| PathBuf::from("logs"), |dirs| dirs.data_dir().join("logs"))
}
