//! # Controller Configuration
//!
//! Knobs that belong to the runtime being debugged or to the debugger session
//! rather than to the kernel protocol:
//!
//! - which functions count as "parked in a blocking call" for `blocked()`
//! - how long `single_step()` waits for its trap by default
//! - what happens to the trap flag when that wait fails
//!
//! ## Environment Variables
//!
//! - `MACHCTL_BLOCKED_FUNCTIONS`: comma-separated function names, replaces the defaults
//! - `MACHCTL_STEP_TIMEOUT_MS`: default step timeout; `0` waits forever
//! - `MACHCTL_STEP_CLEANUP`: `clear` (default) or `leave`

use std::collections::BTreeSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Go runtime routines a goroutine-hosting thread parks in on Darwin.
pub const GO_RUNTIME_PARK_FUNCTIONS: &[&str] = &["runtime.kevent", "runtime.mach_semaphore_wait", "runtime.usleep"];

/// Default name of the trace-control worker thread.
pub const DEFAULT_TRACE_THREAD_NAME: &str = "machctl-ptrace";

/// Set of fully-qualified function names that mark a thread as blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedFunctions(BTreeSet<String>);

impl BlockedFunctions
{
    /// A set that matches nothing, so `blocked()` is always false.
    pub fn empty() -> Self
    {
        Self(BTreeSet::new())
    }

    /// The Go runtime's park routines.
    pub fn go_runtime() -> Self
    {
        GO_RUNTIME_PARK_FUNCTIONS.iter().copied().collect()
    }

    /// Whether `name` is in the set (exact match).
    pub fn contains(&self, name: &str) -> bool
    {
        self.0.contains(name)
    }

    /// Add a name.
    pub fn insert(&mut self, name: impl Into<String>)
    {
        self.0.insert(name.into());
    }

    /// Number of names in the set.
    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }
}

impl Default for BlockedFunctions
{
    fn default() -> Self
    {
        Self::go_runtime()
    }
}

impl<S: Into<String>> FromIterator<S> for BlockedFunctions
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self
    {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// What `single_step()` does with the trap flag when resume or the trap wait fails
///
/// The flag has been set at that point and nobody knows whether the
/// instruction ran. Leaving it set keeps the thread state intact for
/// inspection but means the next resume traps after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepCleanup
{
    /// Clear the flag after the wait returns, on success and failure alike
    #[default]
    ClearOnError,
    /// Leave the flag set on failure; only a successful wait clears it
    LeaveArmed,
}

impl FromStr for StepCleanup
{
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim().to_lowercase().as_str() {
            "clear" | "clear-on-error" => Ok(StepCleanup::ClearOnError),
            "leave" | "leave-armed" => Ok(StepCleanup::LeaveArmed),
            other => Err(ConfigError::InvalidValue {
                key: "MACHCTL_STEP_CLEANUP",
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError
{
    /// A setting could not be parsed
    #[error("invalid value {value:?} for {key}")]
    InvalidValue
    {
        /// Setting name
        key: &'static str,
        /// Offending value
        value: String,
    },
}

/// Per-process controller settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig
{
    /// Functions that make `blocked()` return true
    pub blocked_functions: BlockedFunctions,
    /// Default timeout for the step trap wait; `None` waits forever
    pub step_timeout: Option<Duration>,
    /// Trap flag handling on a failed step
    pub step_cleanup: StepCleanup,
    /// Name of the trace-control worker thread
    pub trace_thread_name: String,
}

impl Default for ControllerConfig
{
    fn default() -> Self
    {
        Self {
            blocked_functions: BlockedFunctions::default(),
            step_timeout: None,
            step_cleanup: StepCleanup::default(),
            trace_thread_name: DEFAULT_TRACE_THREAD_NAME.to_string(),
        }
    }
}

impl ControllerConfig
{
    /// Defaults: Go runtime block-list, no step timeout, clear on error.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Replace the block-list.
    #[must_use]
    pub fn with_blocked_functions(mut self, functions: BlockedFunctions) -> Self
    {
        self.blocked_functions = functions;
        self
    }

    /// Set the default step timeout.
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self
    {
        self.step_timeout = timeout;
        self
    }

    /// Set the trap-flag cleanup policy.
    #[must_use]
    pub fn with_step_cleanup(mut self, cleanup: StepCleanup) -> Self
    {
        self.step_cleanup = cleanup;
        self
    }

    /// Name the trace-control thread.
    #[must_use]
    pub fn with_trace_thread_name(mut self, name: impl Into<String>) -> Self
    {
        self.trace_thread_name = name.into();
        self
    }

    /// Defaults overridden by `MACHCTL_*` environment variables.
    ///
    /// ## Errors
    ///
    /// `ConfigError::InvalidValue` if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, ConfigError>
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// ## Errors
    ///
    /// `ConfigError::InvalidValue` if a variable is set but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(list) = lookup("MACHCTL_BLOCKED_FUNCTIONS") {
            config.blocked_functions = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect();
        }

        if let Some(raw) = lookup("MACHCTL_STEP_TIMEOUT_MS") {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "MACHCTL_STEP_TIMEOUT_MS",
                value: raw.clone(),
            })?;
            config.step_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        if let Some(raw) = lookup("MACHCTL_STEP_CLEANUP") {
            config.step_cleanup = raw.parse()?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_use_go_runtime_block_list()
    {
        let config = ControllerConfig::default();
        assert!(config.blocked_functions.contains("runtime.kevent"));
        assert!(config.blocked_functions.contains("runtime.mach_semaphore_wait"));
        assert!(config.blocked_functions.contains("runtime.usleep"));
        assert_eq!(config.blocked_functions.len(), 3);
        assert_eq!(config.step_timeout, None);
        assert_eq!(config.step_cleanup, StepCleanup::ClearOnError);
        assert_eq!(config.trace_thread_name, DEFAULT_TRACE_THREAD_NAME);
    }

    #[test]
    fn test_env_block_list_replaces_defaults()
    {
        let config =
            ControllerConfig::from_lookup(lookup_from(&[("MACHCTL_BLOCKED_FUNCTIONS", " epoll_wait, ,futex ")])).unwrap();
        assert!(config.blocked_functions.contains("epoll_wait"));
        assert!(config.blocked_functions.contains("futex"));
        assert!(!config.blocked_functions.contains("runtime.kevent"));
        assert_eq!(config.blocked_functions.len(), 2);
    }

    #[test]
    fn test_env_step_timeout_and_cleanup()
    {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("MACHCTL_STEP_TIMEOUT_MS", "250"),
            ("MACHCTL_STEP_CLEANUP", "leave"),
        ]))
        .unwrap();
        assert_eq!(config.step_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.step_cleanup, StepCleanup::LeaveArmed);

        let forever = ControllerConfig::from_lookup(lookup_from(&[("MACHCTL_STEP_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(forever.step_timeout, None);
    }

    #[test]
    fn test_env_rejects_bad_values()
    {
        let err = ControllerConfig::from_lookup(lookup_from(&[("MACHCTL_STEP_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "MACHCTL_STEP_TIMEOUT_MS",
                value: "soon".to_string(),
            }
        );
        assert!(ControllerConfig::from_lookup(lookup_from(&[("MACHCTL_STEP_CLEANUP", "maybe")])).is_err());
    }
}
