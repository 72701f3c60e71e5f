//! # Types
//!
//! Platform-agnostic types used throughout the thread-control layer.
//!
//! These types keep raw kernel integers (Mach ports, pids, addresses) from
//! being mixed up with each other once they leave the FFI boundary.

pub mod address;
pub mod process;
pub mod registers;

// Re-export all public types
pub use address::Address;
pub use process::{ProcessId, TaskPort, ThreadHandle, ThreadId};
pub use registers::{Architecture, Registers};
