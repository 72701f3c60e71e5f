//! # machctl Utilities
//!
//! Logging setup shared by binaries and tests that embed `machctl-core`.
//!
//! The core crate only emits `tracing` events; installing a subscriber is
//! left to whoever owns `main`, through the functions re-exported here.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{default_log_path, init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
