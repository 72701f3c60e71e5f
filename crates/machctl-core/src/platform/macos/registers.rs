//! # Thread State
//!
//! Register reads and writes with `thread_get_state()` / `thread_set_state()`,
//! and the single-step trap flag.
//!
//! | Target | General state            | Step flag                              |
//! |--------|--------------------------|----------------------------------------|
//! | x86-64 | `x86_THREAD_STATE64` (4) | RFLAGS.TF (`0x100`) in the same state  |
//! | ARM64  | `ARM_THREAD_STATE64` (6) | MDSCR_EL1.SS (bit 0) in `ARM_DEBUG_STATE64` (15) |
//!
//! Writes always start from a fresh read so fields [`Registers`] does not
//! model (segment registers, debug slots) are written back unchanged.

use libc::thread_act_t;
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use libc::{mach_msg_type_number_t, natural_t};

use crate::error::KernResult;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
use crate::error::KernelError;
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use crate::platform::macos::{constants, error, ffi};
use crate::types::Registers;
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use crate::types::Architecture;

/// Read a thread state flavor into a `#[repr(C)]` struct of `count` words.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn get_state<T: Default>(thread: thread_act_t, flavor: libc::c_int, count: mach_msg_type_number_t) -> KernResult<T>
{
    let mut state = T::default();
    let mut used = count;
    // SAFETY: `T` is a repr(C) thread-state struct exactly `count` words long.
    let kr = unsafe { ffi::thread_get_state(thread, flavor, &mut state as *mut T as *mut natural_t, &mut used) };
    error::check("thread_get_state", kr)?;
    Ok(state)
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn set_state<T>(thread: thread_act_t, flavor: libc::c_int, count: mach_msg_type_number_t, state: &T) -> KernResult<()>
{
    // SAFETY: as in `get_state`; the kernel only reads the buffer.
    let kr = unsafe { ffi::thread_set_state(thread, flavor, state as *const T as *const natural_t, count) };
    error::check("thread_set_state", kr)
}

// ============================================================================
// x86-64
// ============================================================================

/// `x86_thread_state64_t`
#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct X86ThreadState64
{
    rax: u64,
    rbx: u64,
    rcx: u64,
    rdx: u64,
    rdi: u64,
    rsi: u64,
    rbp: u64,
    rsp: u64,
    r8: u64,
    r9: u64,
    r10: u64,
    r11: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    rip: u64,
    rflags: u64,
    cs: u64,
    fs: u64,
    gs: u64,
}

#[cfg(target_arch = "x86_64")]
fn read_x86(thread: thread_act_t) -> KernResult<X86ThreadState64>
{
    get_state(thread, constants::X86_THREAD_STATE64, constants::X86_THREAD_STATE64_COUNT)
}

#[cfg(target_arch = "x86_64")]
fn write_x86(thread: thread_act_t, state: &X86ThreadState64) -> KernResult<()>
{
    set_state(thread, constants::X86_THREAD_STATE64, constants::X86_THREAD_STATE64_COUNT, state)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn read_registers(thread: thread_act_t) -> KernResult<Registers>
{
    let s = read_x86(thread)?;
    Ok(Registers {
        architecture: Architecture::X86_64,
        pc: s.rip,
        sp: s.rsp,
        fp: s.rbp,
        status: s.rflags,
        general: vec![
            s.rax, s.rbx, s.rcx, s.rdx, s.rdi, s.rsi, s.r8, s.r9, s.r10, s.r11, s.r12, s.r13, s.r14, s.r15,
        ],
    })
}

#[cfg(target_arch = "x86_64")]
pub(super) fn write_registers(thread: thread_act_t, regs: &Registers) -> KernResult<()>
{
    let mut s = read_x86(thread)?;
    s.rip = regs.pc;
    s.rsp = regs.sp;
    s.rbp = regs.fp;
    s.rflags = regs.status;
    let slots = [
        &mut s.rax, &mut s.rbx, &mut s.rcx, &mut s.rdx, &mut s.rdi, &mut s.rsi, &mut s.r8, &mut s.r9, &mut s.r10,
        &mut s.r11, &mut s.r12, &mut s.r13, &mut s.r14, &mut s.r15,
    ];
    for (slot, value) in slots.into_iter().zip(regs.general.iter()) {
        *slot = *value;
    }
    write_x86(thread, &s)
}

#[cfg(target_arch = "x86_64")]
pub(super) fn set_single_step(thread: thread_act_t, enabled: bool) -> KernResult<()>
{
    let mut s = read_x86(thread)?;
    if enabled {
        s.rflags |= constants::X86_TRAP_FLAG;
    } else {
        s.rflags &= !constants::X86_TRAP_FLAG;
    }
    write_x86(thread, &s)
}

// ============================================================================
// ARM64
// ============================================================================

/// `arm_thread_state64_t`
#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct ArmThreadState64
{
    x: [u64; 29],
    fp: u64,
    lr: u64,
    sp: u64,
    pc: u64,
    cpsr: u32,
    pad: u32,
}

/// `arm_debug_state64_t`
#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct ArmDebugState64
{
    bvr: [u64; 16],
    bcr: [u64; 16],
    wvr: [u64; 16],
    wcr: [u64; 16],
    mdscr_el1: u64,
}

#[cfg(target_arch = "aarch64")]
fn read_arm(thread: thread_act_t) -> KernResult<ArmThreadState64>
{
    get_state(thread, constants::ARM_THREAD_STATE64, constants::ARM_THREAD_STATE64_COUNT)
}

#[cfg(target_arch = "aarch64")]
pub(super) fn read_registers(thread: thread_act_t) -> KernResult<Registers>
{
    let s = read_arm(thread)?;
    let mut general = s.x.to_vec();
    general.push(s.lr);
    Ok(Registers {
        architecture: Architecture::Arm64,
        pc: s.pc,
        sp: s.sp,
        fp: s.fp,
        status: u64::from(s.cpsr),
        general,
    })
}

#[cfg(target_arch = "aarch64")]
pub(super) fn write_registers(thread: thread_act_t, regs: &Registers) -> KernResult<()>
{
    let mut s = read_arm(thread)?;
    s.pc = regs.pc;
    s.sp = regs.sp;
    s.fp = regs.fp;
    s.cpsr = (regs.status & 0xFFFF_FFFF) as u32;
    for (slot, value) in s.x.iter_mut().zip(regs.general.iter()) {
        *slot = *value;
    }
    if let Some(lr) = regs.general.get(29) {
        s.lr = *lr;
    }
    set_state(thread, constants::ARM_THREAD_STATE64, constants::ARM_THREAD_STATE64_COUNT, &s)
}

#[cfg(target_arch = "aarch64")]
pub(super) fn set_single_step(thread: thread_act_t, enabled: bool) -> KernResult<()>
{
    let mut d: ArmDebugState64 = get_state(thread, constants::ARM_DEBUG_STATE64, constants::ARM_DEBUG_STATE64_COUNT)?;
    if enabled {
        d.mdscr_el1 |= constants::ARM64_MDSCR_SS;
    } else {
        d.mdscr_el1 &= !constants::ARM64_MDSCR_SS;
    }
    set_state(thread, constants::ARM_DEBUG_STATE64, constants::ARM_DEBUG_STATE64_COUNT, &d)
}

// ============================================================================
// Other targets
// ============================================================================

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(super) fn read_registers(_thread: thread_act_t) -> KernResult<Registers>
{
    Err(KernelError::Unsupported("thread state for this architecture"))
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(super) fn write_registers(_thread: thread_act_t, _regs: &Registers) -> KernResult<()>
{
    Err(KernelError::Unsupported("thread state for this architecture"))
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(super) fn set_single_step(_thread: thread_act_t, _enabled: bool) -> KernResult<()>
{
    Err(KernelError::Unsupported("single-step for this architecture"))
}
