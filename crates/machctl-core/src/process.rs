//! # Process
//!
//! Owner of everything a thread operation needs besides the thread itself:
//! the task port, the kernel capability, the trace-control thread, the trap
//! waiter and the symbol resolver. Threads are registered here by whoever
//! enumerates them (attach logic lives outside this crate) and are handed out
//! as [`ThreadController`]s.
//!
//! ## Lifecycle
//!
//! 1. Build: `Process::builder(pid, task, kernel).build()`
//! 2. Register threads: `add_thread(id, handle)`
//! 3. Record stops delivered by the event loop: `record_exception_stop` /
//!    `record_trace_stop`
//! 4. Control: `thread(id)?.halt()`, `.resume()`, `.single_step()`, ...
//! 5. `detach()` or `mark_exited()`: every later operation fails with
//!    `ProcessDetached` instead of touching dead ports

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::controller::ThreadController;
use crate::error::{Result, ThreadControlError};
use crate::kernel::{ReplyToken, ThreadKernel};
use crate::memory::MemoryAccessor;
use crate::symbols::{SymbolResolver, SymbolTable};
use crate::thread::Thread;
use crate::trace::TraceContext;
use crate::types::{ProcessId, TaskPort, ThreadHandle, ThreadId};
use crate::wait::TrapWaiter;

/// Process-wide resources shared read-mostly by every thread of a process.
pub(crate) struct ProcessContext
{
    pub(crate) pid: ProcessId,
    pub(crate) task: TaskPort,
    pub(crate) kernel: Arc<dyn ThreadKernel>,
    pub(crate) trace: Arc<TraceContext>,
    pub(crate) waiter: Arc<dyn TrapWaiter>,
    pub(crate) symbols: Arc<dyn SymbolResolver>,
    pub(crate) config: ControllerConfig,
    attached: AtomicBool,
}

impl ProcessContext
{
    pub(crate) fn ensure_attached(&self) -> Result<()>
    {
        if self.attached.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ThreadControlError::ProcessDetached(self.pid))
        }
    }

    pub(crate) fn is_attached(&self) -> bool
    {
        self.attached.load(Ordering::Acquire)
    }
}

/// Builder for [`Process`]
pub struct ProcessBuilder
{
    pid: ProcessId,
    task: TaskPort,
    kernel: Arc<dyn ThreadKernel>,
    trace: Option<Arc<TraceContext>>,
    waiter: Option<Arc<dyn TrapWaiter>>,
    symbols: Option<Arc<dyn SymbolResolver>>,
    config: ControllerConfig,
}

impl ProcessBuilder
{
    /// Use this trap waiter instead of the default.
    ///
    /// The default is `WaitpidTrapWaiter` on Unix, which is only correct when
    /// no other part of the debugger reaps the process.
    #[must_use]
    pub fn waiter(mut self, waiter: Arc<dyn TrapWaiter>) -> Self
    {
        self.waiter = Some(waiter);
        self
    }

    /// Use this symbol resolver for `blocked()`. The default knows no functions.
    #[must_use]
    pub fn symbols(mut self, symbols: Arc<dyn SymbolResolver>) -> Self
    {
        self.symbols = Some(symbols);
        self
    }

    /// Share an existing trace-control thread (it must be the one that attached).
    #[must_use]
    pub fn trace_context(mut self, trace: Arc<TraceContext>) -> Self
    {
        self.trace = Some(trace);
        self
    }

    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: ControllerConfig) -> Self
    {
        self.config = config;
        self
    }

    /// Finish building, spawning a trace-control thread if none was supplied.
    ///
    /// ## Errors
    ///
    /// `TraceContextUnavailable` if the trace-control thread cannot be started,
    /// or if no waiter was supplied on a platform without a default one.
    pub fn build(self) -> Result<Process>
    {
        let trace = match self.trace {
            Some(trace) => trace,
            None => Arc::new(TraceContext::spawn(self.config.trace_thread_name.clone())?),
        };
        let waiter = match self.waiter {
            Some(waiter) => waiter,
            None => default_waiter()?,
        };
        let symbols = self.symbols.unwrap_or_else(|| Arc::new(SymbolTable::new()));

        info!(pid = %self.pid, task = self.task.raw(), "process registered for thread control");
        Ok(Process {
            context: ProcessContext {
                pid: self.pid,
                task: self.task,
                kernel: self.kernel,
                trace,
                waiter,
                symbols,
                config: self.config,
                attached: AtomicBool::new(true),
            },
            threads: BTreeMap::new(),
        })
    }
}

#[cfg(unix)]
fn default_waiter() -> Result<Arc<dyn TrapWaiter>>
{
    Ok(Arc::new(crate::wait::WaitpidTrapWaiter::new()))
}

#[cfg(not(unix))]
fn default_waiter() -> Result<Arc<dyn TrapWaiter>>
{
    Err(ThreadControlError::TraceContextUnavailable(
        "no default trap waiter on this platform".to_string(),
    ))
}

/// A debuggee process and its registered threads
pub struct Process
{
    context: ProcessContext,
    threads: BTreeMap<ThreadId, Thread>,
}

impl Process
{
    /// Start building a process around a task port and kernel capability.
    pub fn builder(pid: ProcessId, task: TaskPort, kernel: Arc<dyn ThreadKernel>) -> ProcessBuilder
    {
        ProcessBuilder {
            pid,
            task,
            kernel,
            trace: None,
            waiter: None,
            symbols: None,
            config: ControllerConfig::default(),
        }
    }

    /// Process id.
    pub fn pid(&self) -> ProcessId
    {
        self.context.pid
    }

    /// Task port used for memory access.
    pub fn task(&self) -> TaskPort
    {
        self.context.task
    }

    /// Active configuration.
    pub fn config(&self) -> &ControllerConfig
    {
        &self.context.config
    }

    /// The trace-control thread; attach/detach logic must run through it too.
    pub fn trace_context(&self) -> &Arc<TraceContext>
    {
        &self.context.trace
    }

    /// Whether handles are still valid.
    pub fn is_attached(&self) -> bool
    {
        self.context.is_attached()
    }

    /// Register a thread. Returns `false` (and keeps the existing entry) if the
    /// id is already known.
    pub fn add_thread(&mut self, id: ThreadId, handle: ThreadHandle) -> bool
    {
        if self.threads.contains_key(&id) {
            return false;
        }
        debug!(pid = %self.context.pid, thread = %id, port = handle.raw(), "thread registered");
        self.threads.insert(id, Thread::new(id, handle));
        true
    }

    /// Forget a thread (it exited). Returns its last known state.
    pub fn remove_thread(&mut self, id: ThreadId) -> Option<Thread>
    {
        self.threads.remove(&id)
    }

    /// Ids of all registered threads, in ascending order.
    pub fn thread_ids(&self) -> Vec<ThreadId>
    {
        self.threads.keys().copied().collect()
    }

    /// Read-only view of a thread's cached state.
    pub fn thread_state(&self, id: ThreadId) -> Option<&Thread>
    {
        self.threads.get(&id)
    }

    /// Controller for one thread.
    ///
    /// ## Errors
    ///
    /// - `ProcessDetached`: the process exited or was detached
    /// - `UnknownThread`: no thread with this id was registered
    pub fn thread(&mut self, id: ThreadId) -> Result<ThreadController<'_>>
    {
        self.context.ensure_attached()?;
        let thread = self.threads.get_mut(&id).ok_or(ThreadControlError::UnknownThread {
            pid: self.context.pid,
            thread_id: id,
        })?;
        Ok(ThreadController::new(thread, &self.context))
    }

    /// Memory accessor for the whole address space.
    pub fn memory(&self) -> MemoryAccessor<'_>
    {
        MemoryAccessor::new(&self.context)
    }

    /// Record that the event loop received an exception for `id` whose reply is
    /// still outstanding.
    ///
    /// ## Errors
    ///
    /// `UnknownThread` if the id is not registered.
    pub fn record_exception_stop(&mut self, id: ThreadId, reply: ReplyToken) -> Result<()>
    {
        let pid = self.context.pid;
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(ThreadControlError::UnknownThread { pid, thread_id: id })?;
        debug!(%pid, thread = %id, reply_port = reply.remote_port, "stop via exception");
        thread.record_exception_stop(reply);
        Ok(())
    }

    /// Record that `id` stopped through the trace protocol (signal stop).
    ///
    /// ## Errors
    ///
    /// `UnknownThread` if the id is not registered.
    pub fn record_trace_stop(&mut self, id: ThreadId) -> Result<()>
    {
        let pid = self.context.pid;
        let thread = self
            .threads
            .get_mut(&id)
            .ok_or(ThreadControlError::UnknownThread { pid, thread_id: id })?;
        debug!(%pid, thread = %id, "stop via trace signal");
        thread.record_trace_stop();
        Ok(())
    }

    /// Halt every registered thread, stopping at the first failure.
    ///
    /// ## Errors
    ///
    /// The first `halt()` error.
    pub fn halt_all(&mut self) -> Result<()>
    {
        for id in self.thread_ids() {
            self.thread(id)?.halt()?;
        }
        Ok(())
    }

    /// Resume every registered thread, stopping at the first failure.
    ///
    /// ## Errors
    ///
    /// The first `resume()` error.
    pub fn resume_all(&mut self) -> Result<()>
    {
        for id in self.thread_ids() {
            self.thread(id)?.resume()?;
        }
        Ok(())
    }

    /// The debugger detached; invalidate every handle.
    pub fn detach(&mut self)
    {
        info!(pid = %self.context.pid, "detached; thread handles invalidated");
        self.invalidate();
    }

    /// The process exited; invalidate every handle.
    pub fn mark_exited(&mut self)
    {
        info!(pid = %self.context.pid, "process exited; thread handles invalidated");
        self.invalidate();
    }

    fn invalidate(&mut self)
    {
        self.context.attached.store(false, Ordering::Release);
        for thread in self.threads.values_mut() {
            thread.running = false;
        }
    }
}
