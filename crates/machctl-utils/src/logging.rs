//! # Logging Utilities
//!
//! Subscriber setup for machctl using `tracing`.
//!
//! - Pretty (development) or JSON (production) output
//! - Level filtering through `RUST_LOG`
//! - Optional file output through a non-blocking appender
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use machctl_utils::init_logging;
//!
//! // Reads RUST_LOG, MACHCTL_LOG_FORMAT and MACHCTL_LOG_FILE
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("debugger started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `RUST_LOG=debug`, `RUST_LOG=machctl_core=trace`)
//! - `MACHCTL_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `MACHCTL_LOG_FILE`: also write to this file, rotated daily
//!
//! Every initializer uses `try_init`, so a second call (common when several
//! tests share a process) returns [`LoggingError::InitializationFailed`]
//! instead of panicking.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "MACHCTL_LOG_FORMAT";

/// Environment variable naming an additional log file.
pub const LOG_FILE_ENV: &str = "MACHCTL_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    #[default]
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize logging from the environment
///
/// - `RUST_LOG`: filter; defaults to `info`
/// - `MACHCTL_LOG_FORMAT`: `json` or `pretty`; unknown values fall back to `pretty`
/// - `MACHCTL_LOG_FILE`: optional additional file output
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or_default();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    let log_file = env::var(LOG_FILE_ENV).ok().map(PathBuf::from);

    install(console_layer(format, filter.clone()), log_file.map(|path| file_layer(&path, format, filter)))
}

/// Initialize console logging with an explicit level and format
///
/// `RUST_LOG` is ignored; `MACHCTL_LOG_FILE` is still honored.
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    let filter = EnvFilter::new(Level::from(level).to_string());
    let log_file = env::var(LOG_FILE_ENV).ok().map(PathBuf::from);

    install(console_layer(format, filter.clone()), log_file.map(|path| file_layer(&path, format, filter)))
}

/// Initialize file-only logging (nothing on stdout)
///
/// Useful when stdout belongs to the debuggee or to a front end. The parent
/// directory is created if missing.
///
/// ## Errors
///
/// - `FileError`: the directory could not be created
/// - `InitializationFailed`: a global subscriber is already installed
pub fn init_logging_to_file(path: &Path, level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let filter = EnvFilter::new(Level::from(level).to_string());
    Registry::default()
        .with(file_layer(path, format, filter))
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// `~/.machctl/YYYY-MM-DD-machctl.log`, or the same name under the temp
/// directory when `HOME` is unset.
pub fn default_log_path() -> PathBuf
{
    let file_name = format!("{}-machctl.log", Utc::now().format("%Y-%m-%d"));
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".machctl").join(file_name),
        None => env::temp_dir().join(file_name),
    }
}

fn install(console: BoxedLayer, file: Option<BoxedLayer>) -> Result<(), LoggingError>
{
    let mut layers = vec![console];
    layers.extend(file);
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(path: &Path, format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().unwrap_or_default();
    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    // The subscriber is global and lives for the whole process; so must the
    // flushing worker.
    std::mem::forget(guard);

    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false) // No ANSI in files
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
