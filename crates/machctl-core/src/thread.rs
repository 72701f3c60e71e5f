//! Per-thread state owned by a [`Process`](crate::process::Process).

use crate::kernel::ReplyToken;
use crate::types::{Registers, ThreadHandle, ThreadId};

/// How the thread's last stop was delivered
///
/// This decides which sub-protocol `resume()` runs:
///
/// - `None`: stopped by `thread_suspend` or by a trace signal; a plain
///   `thread_resume` lets it go.
/// - `ViaException`: the kernel is holding the thread until the exception
///   message is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingReply
{
    /// No unanswered exception
    #[default]
    None,
    /// Stopped by an exception whose reply has not been sent yet
    ViaException(ReplyToken),
}

impl PendingReply
{
    /// Whether an exception reply is outstanding.
    pub fn is_pending(&self) -> bool
    {
        matches!(self, PendingReply::ViaException(_))
    }
}

/// One native execution context inside the debuggee
#[derive(Debug, Clone)]
pub struct Thread
{
    id: ThreadId,
    handle: ThreadHandle,
    pub(crate) registers: Registers,
    pub(crate) pending_reply: PendingReply,
    pub(crate) running: bool,
}

impl Thread
{
    pub(crate) fn new(id: ThreadId, handle: ThreadHandle) -> Self
    {
        Self {
            id,
            handle,
            registers: Registers::default(),
            pending_reply: PendingReply::None,
            running: false,
        }
    }

    /// Stable native thread id.
    pub fn id(&self) -> ThreadId
    {
        self.id
    }

    /// Kernel control handle.
    pub fn handle(&self) -> ThreadHandle
    {
        self.handle
    }

    /// Last register snapshot fetched or written. May be stale.
    pub fn cached_registers(&self) -> &Registers
    {
        &self.registers
    }

    /// Outstanding exception reply, if any.
    pub fn pending_reply(&self) -> PendingReply
    {
        self.pending_reply
    }

    /// Advisory run flag; the kernel's answer to `stopped()` wins.
    pub fn is_running(&self) -> bool
    {
        self.running
    }

    pub(crate) fn record_exception_stop(&mut self, reply: ReplyToken)
    {
        self.pending_reply = PendingReply::ViaException(reply);
        self.running = false;
    }

    pub(crate) fn record_trace_stop(&mut self)
    {
        self.pending_reply = PendingReply::None;
        self.running = false;
    }
}
