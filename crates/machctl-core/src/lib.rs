//! # machctl-core
//!
//! Thread control for a native debugger on Darwin.
//!
//! This crate halts, resumes and single-steps individual threads of a traced
//! process, reports whether a thread is stopped or parked in a runtime wait
//! routine, and reads and writes the debuggee's memory. It sits below an
//! event loop (which receives exceptions and decides when threads stop) and
//! above the kernel's Mach and ptrace interfaces.
//!
//! ## Layers
//!
//! - [`Process`] / [`ThreadController`]: the operations callers use
//! - [`ThreadKernel`]: one method per kernel call; [`MachKernel`] on macOS,
//!   a recording fake in tests
//! - [`TraceContext`]: the single thread every ptrace request is issued from
//! - [`TrapWaiter`]: blocks until the kernel reports the process stopped
//! - [`SymbolResolver`]: maps a pc to its enclosing function for `blocked()`
//!
//! ## Why unsafe code is needed
//!
//! The Mach backend calls `thread_*`, `mach_vm_*`, `mach_msg` and `ptrace`
//! directly. Those calls are wrapped in safe methods of [`MachKernel`]; the
//! rest of the crate is safe code over the [`ThreadKernel`] trait.

#![allow(unsafe_code)] // Required for Mach and ptrace calls

pub mod config;
pub mod controller;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod platform;
pub mod process;
pub mod symbols;
pub mod thread;
pub mod trace;
pub mod types;
pub mod wait;

pub use config::{BlockedFunctions, ControllerConfig, StepCleanup};
pub use controller::ThreadController;
pub use error::{KernelError, Result, ThreadControlError, WaitError};
pub use kernel::{ReplyToken, ThreadKernel};
pub use memory::MemoryAccessor;
#[cfg(target_os = "macos")]
pub use platform::macos::MachKernel;
pub use process::{Process, ProcessBuilder};
pub use symbols::{FunctionDescriptor, SymbolResolver, SymbolTable};
pub use thread::{PendingReply, Thread};
pub use trace::TraceContext;
pub use types::{Address, ProcessId, Registers, TaskPort, ThreadHandle, ThreadId};
#[cfg(unix)]
pub use wait::WaitpidTrapWaiter;
pub use wait::{CancellationToken, ChannelTrapWaiter, StopEvent, TrapWaiter, WaitStatus};
