//! # Thread Controller
//!
//! halt / resume / single-step / stopped / blocked for one thread.
//!
//! Darwin gives a debugger two ways to stop and restart a thread and they do
//! not see each other's state:
//!
//! - **Mach**: `thread_suspend` / `thread_resume` adjust a suspend count.
//! - **Exceptions and ptrace**: a thread that trapped is parked by the kernel
//!   until the exception message is answered, or until the tracer continues
//!   it with `ptrace`.
//!
//! Which one applies is recorded per thread as a [`PendingReply`]. `resume()`
//! picks its sub-protocol from it:
//!
//! ```text
//! ViaException(token) ──► ptrace(PT_THUPDATE) ──ok──► running
//!                               │ err
//!                               ▼
//!                         mach_msg(reply) ──err──► ContinueThreadFailed
//!                               │ ok
//!                               ▼
//! None ─────────────────► thread_resume ──err──► ContinueThreadFailed
//!                               │ ok
//!                               ▼
//!                            running
//! ```
//!
//! `running` is advisory. Anything that needs a specific state asks the kernel
//! through [`ThreadController::stopped`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::StepCleanup;
use crate::error::{ResumeProtocol, Result, ThreadControlError};
use crate::memory::MemoryAccessor;
use crate::process::ProcessContext;
use crate::thread::{PendingReply, Thread};
use crate::types::{Address, Registers, ThreadId};
use crate::wait::{CancellationToken, WaitStatus};

/// Control operations on one thread of a [`Process`](crate::process::Process)
///
/// Borrowing the thread mutably means two overlapping control operations on
/// the same thread cannot be issued through the same `Process`.
pub struct ThreadController<'a>
{
    thread: &'a mut Thread,
    process: &'a ProcessContext,
}

impl<'a> ThreadController<'a>
{
    pub(crate) fn new(thread: &'a mut Thread, process: &'a ProcessContext) -> Self
    {
        Self { thread, process }
    }

    /// Id of the controlled thread.
    pub fn id(&self) -> ThreadId
    {
        self.thread.id()
    }

    /// Advisory run flag.
    pub fn is_running(&self) -> bool
    {
        self.thread.running
    }

    /// Outstanding exception reply, if any.
    pub fn pending_reply(&self) -> PendingReply
    {
        self.thread.pending_reply
    }

    /// Last register snapshot; not refreshed.
    pub fn cached_registers(&self) -> &Registers
    {
        &self.thread.registers
    }

    /// Suspend the thread with `thread_suspend`.
    ///
    /// Not idempotent: each call raises the kernel suspend count and needs a
    /// matching Mach resume.
    ///
    /// ## Errors
    ///
    /// `SuspendFailed` with the kernel diagnostic, or `ProcessDetached`.
    pub fn halt(&mut self) -> Result<()>
    {
        self.process.ensure_attached()?;
        let thread_id = self.thread.id();

        self.process
            .kernel
            .suspend(self.thread.handle())
            .map_err(|err| ThreadControlError::SuspendFailed {
                thread_id,
                reason: err.to_string(),
            })?;

        self.thread.running = false;
        debug!(thread = %thread_id, "thread halted");
        Ok(())
    }

    /// Let a stopped thread run again, using the sub-protocol selected by its
    /// pending reply.
    ///
    /// `running` becomes true only if this returns `Ok`.
    ///
    /// ## Errors
    ///
    /// `ContinueThreadFailed` naming the sub-protocol that failed last, or
    /// `ProcessDetached`.
    pub fn resume(&mut self) -> Result<()>
    {
        self.process.ensure_attached()?;
        let thread_id = self.thread.id();
        let handle = self.thread.handle();

        if let PendingReply::ViaException(token) = self.thread.pending_reply {
            match self.trace_continue() {
                Ok(()) => {
                    self.thread.pending_reply = PendingReply::None;
                    self.thread.running = true;
                    debug!(thread = %thread_id, "resumed via trace continue");
                    return Ok(());
                }
                Err(reason) => {
                    debug!(thread = %thread_id, %reason, "trace continue failed, replying to exception");
                }
            }

            self.process
                .kernel
                .send_exception_reply(&token)
                .map_err(|err| ThreadControlError::ContinueThreadFailed {
                    thread_id,
                    protocol: ResumeProtocol::ExceptionReply,
                    reason: err.to_string(),
                })?;
            // The reply port was a send-once right; the token is spent.
            self.thread.pending_reply = PendingReply::None;
            debug!(thread = %thread_id, "exception reply sent");
        }

        self.process
            .kernel
            .resume(handle)
            .map_err(|err| ThreadControlError::ContinueThreadFailed {
                thread_id,
                protocol: ResumeProtocol::MachResume,
                reason: err.to_string(),
            })?;

        self.thread.running = true;
        debug!(thread = %thread_id, "resumed via thread_resume");
        Ok(())
    }

    /// Execute exactly one instruction using the configured step timeout.
    ///
    /// ## Errors
    ///
    /// See [`single_step_with`](Self::single_step_with).
    pub fn single_step(&mut self) -> Result<WaitStatus>
    {
        let timeout = self.process.config.step_timeout;
        self.single_step_with(&CancellationToken::new(), timeout)
    }

    /// Execute exactly one instruction.
    ///
    /// 1. set the CPU trap flag
    /// 2. `resume()`
    /// 3. block on the trap waiter for the owning process (cancellable)
    /// 4. clear the trap flag
    ///
    /// Returns the status the waiter reported.
    ///
    /// If resume or the wait fails, the flag is cleared or left set according
    /// to [`StepCleanup`]; a failure of that cleanup is logged and the
    /// original error is returned.
    ///
    /// ## Errors
    ///
    /// - `SingleStepSetupFailed`: the flag could not be set; nothing ran
    /// - any `resume()` error, unchanged
    /// - `WaitFailed`: the wait failed, was cancelled, or timed out
    /// - `TrapFlagClearFailed`: the step completed but the flag is still set
    pub fn single_step_with(&mut self, cancel: &CancellationToken, timeout: Option<Duration>) -> Result<WaitStatus>
    {
        self.process.ensure_attached()?;
        let thread_id = self.thread.id();

        self.process
            .kernel
            .set_single_step(self.thread.handle(), true)
            .map_err(|err| ThreadControlError::SingleStepSetupFailed {
                thread_id,
                reason: err.to_string(),
            })?;

        if let Err(err) = self.resume() {
            self.cleanup_failed_step();
            return Err(err);
        }

        debug!(thread = %thread_id, pid = %self.process.pid, "waiting for step trap");
        let status = match self.process.waiter.wait_for_stop(self.process.pid, cancel, timeout) {
            Ok(status) => status,
            Err(source) => {
                self.cleanup_failed_step();
                return Err(ThreadControlError::WaitFailed { thread_id, source });
            }
        };
        self.thread.running = false;
        debug!(thread = %thread_id, ?status, "step trap received");

        self.clear_trap_flag()?;
        Ok(status)
    }

    /// Whether the kernel reports the thread as suspended.
    ///
    /// Queries the kernel every time. A failed query (or a detached process)
    /// reads as not stopped.
    pub fn stopped(&self) -> bool
    {
        if !self.process.is_attached() {
            return false;
        }
        match self.process.kernel.suspend_count(self.thread.handle()) {
            Ok(count) => count > 0,
            Err(err) => {
                debug!(thread = %self.thread.id(), error = %err, "suspend count query failed");
                false
            }
        }
    }

    /// Whether the cached run flag disagrees with the kernel (running but suspended).
    pub fn is_cache_stale(&self) -> bool
    {
        let stale = self.thread.running && self.stopped();
        if stale {
            warn!(thread = %self.thread.id(), "thread recorded as running but kernel reports it suspended");
        }
        stale
    }

    /// Best-effort guess whether the thread is parked in a runtime wait routine.
    ///
    /// True only if the current pc resolves to a function in the configured
    /// block-list. Register or symbol lookup failures read as not blocked.
    pub fn blocked(&mut self) -> bool
    {
        let pc = match self.pc() {
            Ok(pc) => pc,
            Err(err) => {
                debug!(thread = %self.thread.id(), error = %err, "pc unavailable, treating thread as not blocked");
                return false;
            }
        };
        let Some(function) = self.process.symbols.resolve_function(pc) else {
            return false;
        };
        self.process.config.blocked_functions.contains(&function.name)
    }

    /// Fetch the register state and update the cached snapshot.
    ///
    /// ## Errors
    ///
    /// `RegisterFetchFailed` or `ProcessDetached`.
    pub fn registers(&mut self) -> Result<&Registers>
    {
        self.process.ensure_attached()?;
        let thread_id = self.thread.id();
        let registers = self
            .process
            .kernel
            .get_registers(self.thread.handle())
            .map_err(|err| ThreadControlError::RegisterFetchFailed {
                thread_id,
                reason: err.to_string(),
            })?;
        self.thread.registers = registers;
        Ok(&self.thread.registers)
    }

    /// Write a full register state and cache it.
    ///
    /// ## Errors
    ///
    /// `RegisterWriteFailed` or `ProcessDetached`.
    pub fn set_registers(&mut self, registers: Registers) -> Result<()>
    {
        self.process.ensure_attached()?;
        let thread_id = self.thread.id();
        self.process
            .kernel
            .set_registers(self.thread.handle(), &registers)
            .map_err(|err| ThreadControlError::RegisterWriteFailed {
                thread_id,
                reason: err.to_string(),
            })?;
        self.thread.registers = registers;
        Ok(())
    }

    /// Freshly fetched program counter.
    ///
    /// ## Errors
    ///
    /// Same as [`registers`](Self::registers).
    pub fn pc(&mut self) -> Result<Address>
    {
        Ok(Address::new(self.registers()?.pc))
    }

    /// Read debuggee memory; see [`MemoryAccessor::read_memory`].
    ///
    /// ## Errors
    ///
    /// `MemoryReadFailed` or `ProcessDetached`.
    pub fn read_memory(&self, address: Address, size: usize) -> Result<Vec<u8>>
    {
        MemoryAccessor::new(self.process).read_memory(address, size)
    }

    /// Write debuggee memory; see [`MemoryAccessor::write_memory`].
    ///
    /// ## Errors
    ///
    /// `MemoryWriteFailed` or `ProcessDetached`.
    pub fn write_memory(&self, address: Address, data: &[u8]) -> Result<usize>
    {
        MemoryAccessor::new(self.process).write_memory(address, data)
    }

    /// `ptrace(PT_THUPDATE)` on the trace-control thread. Any failure, including
    /// an unavailable trace thread, is returned as text for the fallback path.
    fn trace_continue(&self) -> std::result::Result<(), String>
    {
        let kernel = Arc::clone(&self.process.kernel);
        let pid = self.process.pid;
        let handle = self.thread.handle();
        match self.process.trace.execute(move || kernel.trace_continue(pid, handle, 0)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(err) => Err(err.to_string()),
        }
    }

    fn clear_trap_flag(&mut self) -> Result<()>
    {
        let thread_id = self.thread.id();
        self.process
            .kernel
            .set_single_step(self.thread.handle(), false)
            .map_err(|err| ThreadControlError::TrapFlagClearFailed {
                thread_id,
                reason: err.to_string(),
            })
    }

    fn cleanup_failed_step(&mut self)
    {
        let thread_id = self.thread.id();
        match self.process.config.step_cleanup {
            StepCleanup::ClearOnError => match self.clear_trap_flag() {
                Ok(()) => warn!(thread = %thread_id, "trap flag cleared after failed step"),
                Err(err) => warn!(thread = %thread_id, error = %err, "trap flag still set after failed step"),
            },
            StepCleanup::LeaveArmed => {
                warn!(thread = %thread_id, "step failed; trap flag left set, next resume will trap");
            }
        }
    }
}
