//! # Error Types
//!
//! Error handling for the thread-control layer.
//!
//! There are three layers, each a `thiserror` enum:
//!
//! 1. [`KernelError`]: a single kernel or FFI call failed. Produced by
//!    [`ThreadKernel`](crate::kernel::ThreadKernel) implementations.
//! 2. [`WaitError`]: the trap waiter gave up (failure, cancellation, timeout).
//! 3. [`ThreadControlError`]: what callers see. Every variant carries enough
//!    context (thread id, address, size, sub-protocol) to diagnose a failure
//!    without attaching a debugger to the debugger.
//!
//! Nothing here is retried and nothing is fatal; callers decide whether to
//! abort the session.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::types::{Address, ProcessId, ThreadId};

/// Failure of one kernel call
#[derive(Error, Debug)]
pub enum KernelError
{
    /// A Mach call returned something other than `KERN_SUCCESS`
    ///
    /// `description` is the text from `mach_error_string()` where the platform
    /// provides one.
    #[error("{call}: {description} (kern_return_t {code})")]
    Mach
    {
        /// Name of the Mach routine
        call: &'static str,
        /// Raw `kern_return_t`
        code: i32,
        /// Human-readable diagnostic
        description: String,
    },

    /// A BSD call (`ptrace`, `waitpid`) failed with `errno`
    #[error("{call}: {source}")]
    Os
    {
        /// Name of the system call
        call: &'static str,
        /// The `errno` value as an I/O error
        #[source]
        source: io::Error,
    },

    /// The backend cannot perform this call on the current target
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl KernelError
{
    /// Capture `errno` for a failed BSD call.
    pub fn last_os_error(call: &'static str) -> Self
    {
        KernelError::Os {
            call,
            source: io::Error::last_os_error(),
        }
    }
}

/// Convenience alias for kernel-facing calls.
pub type KernResult<T> = std::result::Result<T, KernelError>;

/// Failure reported by a [`TrapWaiter`](crate::wait::TrapWaiter)
#[derive(Error, Debug)]
pub enum WaitError
{
    /// The wait primitive itself failed
    #[error("wait for process {pid} failed: {source}")]
    Failed
    {
        /// Process being waited on
        pid: ProcessId,
        /// Underlying failure
        #[source]
        source: KernelError,
    },

    /// The caller's cancellation token fired before an event arrived
    #[error("wait for process {0} was cancelled")]
    Cancelled(ProcessId),

    /// No event arrived within the timeout
    #[error("no stop event from process {pid} within {timeout_ms} ms")]
    TimedOut
    {
        /// Process being waited on
        pid: ProcessId,
        /// Timeout that elapsed
        timeout_ms: u128,
    },

    /// The event source went away (process event loop shut down)
    #[error("event source for process {0} disconnected")]
    Disconnected(ProcessId),
}

/// Resume sub-protocol that was being attempted when `resume()` failed
///
/// A failed `ptrace(PT_THUPDATE)` is never reported on its own: it always
/// falls back to the exception reply, so the last protocol tried is one of
/// these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeProtocol
{
    /// `mach_msg` reply to a pending exception
    ExceptionReply,
    /// `thread_resume`
    MachResume,
}

impl fmt::Display for ResumeProtocol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            ResumeProtocol::ExceptionReply => "exception reply",
            ResumeProtocol::MachResume => "mach resume",
        };
        f.write_str(name)
    }
}

/// Main error type for thread-control operations
#[derive(Error, Debug)]
pub enum ThreadControlError
{
    /// `thread_suspend` did not report success
    #[error("could not suspend thread {thread_id}: {reason}")]
    SuspendFailed
    {
        /// Thread that was being halted
        thread_id: ThreadId,
        /// Kernel diagnostic text
        reason: String,
    },

    /// Every resume sub-protocol that was tried failed
    ///
    /// `protocol` is the last one attempted; `reason` is its diagnostic.
    #[error("could not continue thread {thread_id} via {protocol}: {reason}")]
    ContinueThreadFailed
    {
        /// Thread that was being resumed
        thread_id: ThreadId,
        /// Sub-protocol that failed last
        protocol: ResumeProtocol,
        /// Kernel diagnostic text
        reason: String,
    },

    /// Setting the CPU trap flag before a step failed
    #[error("could not set single-step flag on thread {thread_id}: {reason}")]
    SingleStepSetupFailed
    {
        /// Thread being stepped
        thread_id: ThreadId,
        /// Kernel diagnostic text
        reason: String,
    },

    /// Clearing the CPU trap flag after a step failed
    ///
    /// The thread is left in single-step mode; the next resume traps again.
    #[error("could not clear CPU trap flag on thread {thread_id}: {reason}")]
    TrapFlagClearFailed
    {
        /// Thread being stepped
        thread_id: ThreadId,
        /// Kernel diagnostic text
        reason: String,
    },

    /// The trap waiter failed, was cancelled, or timed out
    #[error("waiting for trap on thread {thread_id}: {source}")]
    WaitFailed
    {
        /// Thread being stepped
        thread_id: ThreadId,
        /// Error from the waiter, unchanged
        #[source]
        source: WaitError,
    },

    /// `mach_vm_read_overwrite` failed; nothing is returned
    #[error("could not read {size} bytes at {address}: {reason}")]
    MemoryReadFailed
    {
        /// Start of the requested range
        address: Address,
        /// Requested length
        size: usize,
        /// Kernel diagnostic text
        reason: String,
    },

    /// `mach_vm_write` failed; the write is treated as not having happened
    #[error("could not write {size} bytes at {address}: {reason}")]
    MemoryWriteFailed
    {
        /// Start of the target range
        address: Address,
        /// Length of the buffer
        size: usize,
        /// Kernel diagnostic text
        reason: String,
    },

    /// `thread_get_state` failed
    #[error("could not read registers of thread {thread_id}: {reason}")]
    RegisterFetchFailed
    {
        /// Thread whose registers were requested
        thread_id: ThreadId,
        /// Kernel diagnostic text
        reason: String,
    },

    /// `thread_set_state` failed
    #[error("could not write registers of thread {thread_id}: {reason}")]
    RegisterWriteFailed
    {
        /// Thread whose registers were written
        thread_id: ThreadId,
        /// Kernel diagnostic text
        reason: String,
    },

    /// The process exited or was detached; its handles are no longer valid
    #[error("process {0} is no longer attached")]
    ProcessDetached(ProcessId),

    /// No thread with this id is registered with the process
    #[error("thread {thread_id} is not part of process {pid}")]
    UnknownThread
    {
        /// Owning process
        pid: ProcessId,
        /// Requested thread
        thread_id: ThreadId,
    },

    /// The trace-control worker thread is gone or could not be started
    #[error("trace-control thread unavailable: {0}")]
    TraceContextUnavailable(String),
}

/// Convenience type alias for `Result<T, ThreadControlError>`
///
/// ```rust
/// use machctl_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, ThreadControlError>;
