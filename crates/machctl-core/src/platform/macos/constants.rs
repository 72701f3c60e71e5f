//! # macOS Platform Constants
//!
//! Thread-state flavors, trap-flag bits and message constants used by the
//! Mach backend.

use libc::{c_int, mach_msg_type_number_t};

// ============================================================================
// Thread State Flavors
// ============================================================================

/// ARM64 general-purpose thread state flavor (flavor 6)
#[cfg(target_arch = "aarch64")]
pub const ARM_THREAD_STATE64: c_int = 6;

/// `arm_thread_state64_t` size in `natural_t` words
#[cfg(target_arch = "aarch64")]
pub const ARM_THREAD_STATE64_COUNT: mach_msg_type_number_t = 68;

/// ARM64 debug state flavor (flavor 15)
///
/// Carries the breakpoint/watchpoint registers and `MDSCR_EL1`.
#[cfg(target_arch = "aarch64")]
pub const ARM_DEBUG_STATE64: c_int = 15;

/// `arm_debug_state64_t` size in `natural_t` words
#[cfg(target_arch = "aarch64")]
pub const ARM_DEBUG_STATE64_COUNT: mach_msg_type_number_t = 130;

/// x86-64 general-purpose thread state flavor (flavor 4)
#[cfg(target_arch = "x86_64")]
pub const X86_THREAD_STATE64: c_int = 4;

/// `x86_thread_state64_t` size in `natural_t` words
#[cfg(target_arch = "x86_64")]
pub const X86_THREAD_STATE64_COUNT: mach_msg_type_number_t = 42;

// ============================================================================
// Single-Step Trap Flags
// ============================================================================

/// RFLAGS.TF: trap after the next instruction
#[cfg(target_arch = "x86_64")]
pub const X86_TRAP_FLAG: u64 = 0x100;

/// MDSCR_EL1.SS: software step enable
#[cfg(target_arch = "aarch64")]
pub const ARM64_MDSCR_SS: u64 = 0x1;

// ============================================================================
// Thread Info
// ============================================================================

/// `thread_info` flavor returning `thread_basic_info`
pub const THREAD_BASIC_INFO: c_int = 3;

/// `thread_basic_info` size in `natural_t` words
pub const THREAD_BASIC_INFO_COUNT: mach_msg_type_number_t = 10;

// ============================================================================
// ptrace
// ============================================================================

/// `PT_THUPDATE`: continue one thread of a traced process, delivering `data`
/// as the signal
pub const PT_THUPDATE: c_int = 13;

// ============================================================================
// Memory
// ============================================================================

/// `VM_PROT_COPY`: make a private copy of a shared mapping on write
pub const VM_PROT_COPY: c_int = 0x10;

// ============================================================================
// Messages
// ============================================================================

/// Remote-disposition bits of `msgh_bits`
pub const MACH_MSGH_BITS_REMOTE_MASK: u32 = 0x0000_001f;
