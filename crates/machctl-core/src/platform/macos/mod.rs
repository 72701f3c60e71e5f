//! # macOS Backend
//!
//! [`MachKernel`]: the `ThreadKernel` implementation for Darwin.
//!
//! ## Dependencies
//!
//! - **mach2 crate**: `mach_vm_read_overwrite`, `mach_vm_protect`,
//!   `mach_vm_region_recurse`, `mach_msg` and the exception message layouts
//! - **libc crate**: Mach type aliases and `ptrace`
//! - **extern "C"** ([`ffi`]): thread calls and `mach_error_string`, which
//!   mach2 does not export in the form we need
//!
//! ## References
//!
//! - [thread_get_state(3)](https://developer.apple.com/documentation/kernel/1418576-thread_get_state/)
//! - [mach_msg(3)](https://developer.apple.com/documentation/kernel/1402149-mach_msg/)
//! - XNU `bsd/kern/mach_process.c` for `PT_THUPDATE`

pub mod constants;
pub mod error;
pub mod ffi;
mod kernel;
mod memory;
mod registers;

pub use kernel::MachKernel;
