//! # Platform Backends
//!
//! Implementations of [`ThreadKernel`](crate::kernel::ThreadKernel) over a
//! platform's native debugging calls.
//!
//! - **macOS**: Mach thread and VM calls, `ptrace(PT_THUPDATE)`, `mach_msg`
//!   - See: [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//!
//! Everything above this module is platform independent and only talks to the
//! trait.

#[cfg(target_os = "macos")]
pub mod macos;
