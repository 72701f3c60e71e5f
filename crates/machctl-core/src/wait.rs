//! # Trap Waiting
//!
//! Single-stepping resumes a thread with the trap flag set and then blocks
//! until the kernel reports the next stop, exception or exit for the process.
//! Delivering those events is the job of the process-wide event loop, which
//! lives outside this crate; the controller only consumes it through
//! [`TrapWaiter`].
//!
//! Unlike a bare `waitpid`, every wait here takes a [`CancellationToken`] and an
//! optional timeout, so a debuggee that never reaches the expected trap cannot
//! stall the caller forever.
//!
//! Two waiters are provided:
//!
//! - [`ChannelTrapWaiter`]: fed by the event loop over a channel
//! - [`WaitpidTrapWaiter`]: polls `waitpid(WNOHANG | WUNTRACED)` directly

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{KernelError, WaitError};
use crate::types::ProcessId;

/// Default interval at which waiters re-check cancellation.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Status of the event that ended a wait
///
/// The controller does not look inside; it only distinguishes "the wait
/// returned" from "the wait failed". Callers of `single_step` get it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus
{
    /// The process stopped with this signal (`SIGTRAP` for a completed step)
    Stopped
    {
        /// Stop signal number
        signal: i32,
    },
    /// The process exited normally
    Exited
    {
        /// Exit code
        code: i32,
    },
    /// The process was killed by a signal
    Signaled
    {
        /// Terminating signal number
        signal: i32,
    },
}

impl WaitStatus
{
    /// Whether the process no longer exists after this event.
    pub fn is_terminal(&self) -> bool
    {
        matches!(self, WaitStatus::Exited { .. } | WaitStatus::Signaled { .. })
    }
}

/// Shared flag a caller can set to abandon a blocking wait
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken
{
    /// A fresh, un-cancelled token.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self)
    {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool
    {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking "wait for the next stop/exception/exit event" primitive
pub trait TrapWaiter: Send + Sync
{
    /// Block until the next event for `pid`, `cancel` fires, or `timeout`
    /// elapses (`None` waits indefinitely).
    fn wait_for_stop(
        &self,
        pid: ProcessId,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> std::result::Result<WaitStatus, WaitError>;
}

/// Deadline bookkeeping shared by both waiters.
///
/// Waiters poll once before asking [`expired`](Self::expired), so an event
/// that is already queued is delivered even with a zero timeout.
struct WaitClock
{
    pid: ProcessId,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl WaitClock
{
    fn start(pid: ProcessId, timeout: Option<Duration>) -> Self
    {
        Self {
            pid,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> std::result::Result<(), WaitError>
    {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled(self.pid));
        }
        Ok(())
    }

    /// How long the next poll may block; zero once the deadline has passed.
    fn slice(&self, poll: Duration) -> Duration
    {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(poll),
            None => poll,
        }
    }

    fn expired(&self) -> std::result::Result<(), WaitError>
    {
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => Err(WaitError::TimedOut {
                pid: self.pid,
                timeout_ms: timeout.as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

/// A stop event as published by the process event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopEvent
{
    /// Process the event belongs to
    pub pid: ProcessId,
    /// What happened
    pub status: WaitStatus,
}

/// Sender half handed to the process event loop.
pub type StopEventSender = mpsc::Sender<StopEvent>;

/// [`TrapWaiter`] that receives events published by the process event loop
pub struct ChannelTrapWaiter
{
    events: Mutex<mpsc::Receiver<StopEvent>>,
    poll_interval: Duration,
}

impl ChannelTrapWaiter
{
    /// Create a waiter and the sender the event loop publishes into.
    #[must_use]
    pub fn new() -> (Self, StopEventSender)
    {
        let (tx, rx) = mpsc::channel();
        let waiter = Self {
            events: Mutex::new(rx),
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        (waiter, tx)
    }

    /// Change how often cancellation is re-checked.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self
    {
        self.poll_interval = interval;
        self
    }
}

impl TrapWaiter for ChannelTrapWaiter
{
    fn wait_for_stop(
        &self,
        pid: ProcessId,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> std::result::Result<WaitStatus, WaitError>
    {
        let clock = WaitClock::start(pid, timeout);
        loop {
            clock.check_cancelled(cancel)?;
            let slice = clock.slice(self.poll_interval);

            // Another caller may hold the receiver. Blocking on the lock would
            // ignore our own timeout and cancellation.
            let received = match self.events.try_lock() {
                Ok(events) if slice.is_zero() => events.try_recv().map_err(|err| match err {
                    mpsc::TryRecvError::Empty => mpsc::RecvTimeoutError::Timeout,
                    mpsc::TryRecvError::Disconnected => mpsc::RecvTimeoutError::Disconnected,
                }),
                Ok(events) => events.recv_timeout(slice),
                Err(TryLockError::WouldBlock) => {
                    thread::sleep(slice);
                    Err(mpsc::RecvTimeoutError::Timeout)
                }
                Err(TryLockError::Poisoned(_)) => return Err(WaitError::Disconnected(pid)),
            };

            match received {
                Ok(event) if event.pid == pid => return Ok(event.status),
                Ok(event) => {
                    trace!(expected = %pid, got = %event.pid, "ignoring stop event for another process");
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(WaitError::Disconnected(pid)),
            }
            clock.expired()?;
        }
    }
}

/// [`TrapWaiter`] that polls `waitpid` on the calling thread
///
/// Only usable when nothing else in the debugger reaps the same pid.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct WaitpidTrapWaiter
{
    poll_interval: Duration,
}

#[cfg(unix)]
impl WaitpidTrapWaiter
{
    /// Poll every [`DEFAULT_POLL_INTERVAL`].
    pub fn new() -> Self
    {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Change how often `waitpid` is polled.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self
    {
        self.poll_interval = interval;
        self
    }

    fn decode(status: libc::c_int) -> Option<WaitStatus>
    {
        if libc::WIFSTOPPED(status) {
            Some(WaitStatus::Stopped {
                signal: libc::WSTOPSIG(status),
            })
        } else if libc::WIFEXITED(status) {
            Some(WaitStatus::Exited {
                code: libc::WEXITSTATUS(status),
            })
        } else if libc::WIFSIGNALED(status) {
            Some(WaitStatus::Signaled {
                signal: libc::WTERMSIG(status),
            })
        } else {
            None
        }
    }
}

#[cfg(unix)]
impl Default for WaitpidTrapWaiter
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(unix)]
impl TrapWaiter for WaitpidTrapWaiter
{
    fn wait_for_stop(
        &self,
        pid: ProcessId,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> std::result::Result<WaitStatus, WaitError>
    {
        let clock = WaitClock::start(pid, timeout);
        let raw_pid = libc::pid_t::try_from(pid.0).map_err(|_| WaitError::Failed {
            pid,
            source: KernelError::Unsupported("pid does not fit in pid_t"),
        })?;

        loop {
            clock.check_cancelled(cancel)?;
            let mut status: libc::c_int = 0;
            let ret = unsafe { libc::waitpid(raw_pid, &mut status, libc::WNOHANG | libc::WUNTRACED) };
            if ret < 0 {
                let source = std::io::Error::last_os_error();
                if source.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(WaitError::Failed {
                    pid,
                    source: KernelError::Os { call: "waitpid", source },
                });
            }
            if ret == raw_pid {
                if let Some(decoded) = Self::decode(status) {
                    return Ok(decoded);
                }
                // Continued (WIFCONTINUED) or similar; keep waiting for a stop.
                continue;
            }
            clock.expired()?;
            thread::sleep(clock.slice(self.poll_interval));
        }
    }
}
