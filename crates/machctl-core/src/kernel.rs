//! # Kernel Capability Interface
//!
//! Every foreign call the thread-control layer makes goes through
//! [`ThreadKernel`]. The controller logic above it is platform independent and
//! is unit-tested against a recording fake; the only `unsafe` code lives in the
//! platform implementation (`platform::macos::MachKernel`).
//!
//! The methods map one-to-one onto kernel calls:
//!
//! | Method                 | macOS call                                 |
//! |------------------------|--------------------------------------------|
//! | `suspend`              | `thread_suspend`                           |
//! | `resume`               | `thread_resume`                            |
//! | `suspend_count`        | `thread_info(THREAD_BASIC_INFO)`           |
//! | `get_registers`        | `thread_get_state`                         |
//! | `set_registers`        | `thread_set_state`                         |
//! | `set_single_step`      | `thread_get_state` + `thread_set_state`    |
//! | `read_memory`          | `mach_vm_read_overwrite`                   |
//! | `write_memory`         | `mach_vm_write`                            |
//! | `trace_continue`       | `ptrace(PT_THUPDATE)`                      |
//! | `send_exception_reply` | `mach_msg(MACH_SEND_MSG)`                  |

use crate::error::KernResult;
use crate::types::{Address, ProcessId, Registers, TaskPort, ThreadHandle};

/// Saved header of an exception request message that has not been answered
///
/// The kernel keeps the faulting thread parked until a reply is sent to
/// `remote_port` (a send-once right). The token is therefore single-use:
/// once a reply has been sent it must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyToken
{
    /// `msgh_bits` of the request
    pub bits: u32,
    /// Reply port (send-once right) from the request
    pub remote_port: u32,
    /// Exception port the request arrived on
    pub local_port: u32,
    /// `msgh_id` of the request; the reply id is this plus 100
    pub id: i32,
}

impl ReplyToken
{
    /// Build a token from the raw header fields of a received exception message.
    pub const fn new(bits: u32, remote_port: u32, local_port: u32, id: i32) -> Self
    {
        Self {
            bits,
            remote_port,
            local_port,
            id,
        }
    }

    /// `msgh_id` the reply message must carry.
    pub const fn reply_id(&self) -> i32
    {
        self.id + 100
    }
}

/// Capability interface over the kernel's thread, memory and trace calls
///
/// Implementations must be `Send + Sync`: trace-protocol calls are shipped to
/// the trace-control thread while Mach calls run on the caller's thread.
///
/// Every method reports the raw failure; wrapping it with thread, address or
/// protocol context is the controller's job.
pub trait ThreadKernel: Send + Sync
{
    /// Increment the suspend count of `thread`.
    fn suspend(&self, thread: ThreadHandle) -> KernResult<()>;

    /// Decrement the suspend count of `thread`.
    fn resume(&self, thread: ThreadHandle) -> KernResult<()>;

    /// Current suspend count as reported by the kernel. Greater than zero means
    /// the thread is halted.
    fn suspend_count(&self, thread: ThreadHandle) -> KernResult<i32>;

    /// Fetch the general-purpose register state.
    fn get_registers(&self, thread: ThreadHandle) -> KernResult<Registers>;

    /// Write back the general-purpose register state.
    fn set_registers(&self, thread: ThreadHandle, registers: &Registers) -> KernResult<()>;

    /// Set or clear the CPU single-step trap flag with a register-state write.
    fn set_single_step(&self, thread: ThreadHandle, enabled: bool) -> KernResult<()>;

    /// Read exactly `buf.len()` bytes at `address`. Partial reads are failures.
    fn read_memory(&self, task: TaskPort, address: Address, buf: &mut [u8]) -> KernResult<()>;

    /// Write all of `data` at `address` in one transfer.
    fn write_memory(&self, task: TaskPort, address: Address, data: &[u8]) -> KernResult<()>;

    /// Trace-protocol continue for a single thread.
    ///
    /// Must only be called from the trace-control thread; see
    /// [`TraceContext`](crate::trace::TraceContext).
    fn trace_continue(&self, pid: ProcessId, thread: ThreadHandle, signal: i32) -> KernResult<()>;

    /// Acknowledge a pending exception so the kernel lets the thread run.
    fn send_exception_reply(&self, reply: &ReplyToken) -> KernResult<()>;
}
