//! Process, thread, and kernel handle identifiers.

use std::fmt;

/// Process identifier (PID)
///
/// Used for the trace protocol (`ptrace`) and for the process-wide wait
/// primitive. Mach calls never take a pid; they take a [`TaskPort`] or a
/// [`ThreadHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Stable native thread identifier
///
/// Assigned by the kernel and immutable for the thread's lifetime. On macOS
/// this is the 64-bit thread id reported by `thread_info`, which, unlike the
/// thread port name, does not change between debugger sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Get the raw `u64` representation of the thread identifier
    ///
    /// ```rust
    /// use machctl_core::types::ThreadId;
    ///
    /// let thread = ThreadId::from(12345);
    /// assert_eq!(thread.raw(), 12345);
    /// ```
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Kernel-issued reference to one thread's control object
///
/// On macOS this is a `thread_act_t` send right. Every per-thread control call
/// takes one. The handle is only meaningful while the owning process is
/// attached; see `Process::detach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub u32);

impl ThreadHandle
{
    /// Raw port name.
    pub fn raw(self) -> u32
    {
        self.0
    }
}

/// Process-wide memory-access capability (the Mach task port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskPort(pub u32);

impl TaskPort
{
    /// Raw port name.
    pub fn raw(self) -> u32
    {
        self.0
    }
}
