//! # MachKernel
//!
//! [`ThreadKernel`] over Mach thread calls, Mach VM calls, `ptrace` and
//! `mach_msg`.

use std::mem::size_of;

use libc::{c_int, mach_msg_type_number_t, pid_t, thread_act_t};
use mach2::exc::__Reply__exception_raise_t;
use mach2::kern_return::KERN_SUCCESS;
use mach2::message::{
    mach_msg, mach_msg_header_t, mach_msg_size_t, MACH_MSGH_BITS, MACH_MSG_SUCCESS, MACH_MSG_TIMEOUT_NONE,
    MACH_SEND_INTERRUPT, MACH_SEND_MSG,
};
use mach2::ndr::NDR_record;
use mach2::port::MACH_PORT_NULL;
use tracing::trace;

use crate::error::{KernResult, KernelError};
use crate::kernel::{ReplyToken, ThreadKernel};
use crate::platform::macos::ffi::ThreadBasicInfo;
use crate::platform::macos::{constants, error, ffi, memory, registers};
use crate::types::{Address, ProcessId, Registers, TaskPort, ThreadHandle};

/// The Darwin kernel
///
/// Stateless: ports are passed in on every call. The debugger must already
/// hold the task port and thread ports (`task_for_pid`, `task_threads`) and
/// be the ptrace tracer of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MachKernel;

impl MachKernel
{
    /// Create the backend.
    pub fn new() -> Self
    {
        Self
    }
}

fn port(thread: ThreadHandle) -> thread_act_t
{
    thread.raw() as thread_act_t
}

impl ThreadKernel for MachKernel
{
    fn suspend(&self, thread: ThreadHandle) -> KernResult<()>
    {
        // SAFETY: a stale port is reported as an error, not undefined behavior.
        let kr = unsafe { ffi::thread_suspend(port(thread)) };
        error::check("thread_suspend", kr)
    }

    fn resume(&self, thread: ThreadHandle) -> KernResult<()>
    {
        // SAFETY: as for `suspend`.
        let kr = unsafe { ffi::thread_resume(port(thread)) };
        error::check("thread_resume", kr)
    }

    fn suspend_count(&self, thread: ThreadHandle) -> KernResult<i32>
    {
        let mut info = ThreadBasicInfo::default();
        let mut count: mach_msg_type_number_t = constants::THREAD_BASIC_INFO_COUNT;
        // SAFETY: `info` is a thread_basic_info of THREAD_BASIC_INFO_COUNT words.
        let kr = unsafe {
            ffi::thread_info(
                port(thread),
                constants::THREAD_BASIC_INFO,
                &mut info as *mut ThreadBasicInfo as *mut c_int,
                &mut count,
            )
        };
        error::check("thread_info", kr)?;
        Ok(info.suspend_count)
    }

    fn get_registers(&self, thread: ThreadHandle) -> KernResult<Registers>
    {
        registers::read_registers(port(thread))
    }

    fn set_registers(&self, thread: ThreadHandle, registers: &Registers) -> KernResult<()>
    {
        registers::write_registers(port(thread), registers)
    }

    fn set_single_step(&self, thread: ThreadHandle, enabled: bool) -> KernResult<()>
    {
        trace!(port = thread.raw(), enabled, "set single-step flag");
        registers::set_single_step(port(thread), enabled)
    }

    fn read_memory(&self, task: TaskPort, address: Address, buf: &mut [u8]) -> KernResult<()>
    {
        memory::read_into(task.raw(), address, buf)
    }

    fn write_memory(&self, task: TaskPort, address: Address, data: &[u8]) -> KernResult<()>
    {
        memory::write(task.raw(), address, data)
    }

    fn trace_continue(&self, pid: ProcessId, thread: ThreadHandle, signal: i32) -> KernResult<()>
    {
        // PT_THUPDATE takes the thread port in the address slot.
        // SAFETY: no memory is passed to the kernel; the "address" is an integer.
        let rc = unsafe {
            libc::ptrace(
                constants::PT_THUPDATE,
                pid.0 as pid_t,
                thread.raw() as usize as *mut libc::c_char,
                signal,
            )
        };
        if rc == -1 {
            return Err(KernelError::last_os_error("ptrace(PT_THUPDATE)"));
        }
        Ok(())
    }

    fn send_exception_reply(&self, reply: &ReplyToken) -> KernResult<()>
    {
        let mut message = __Reply__exception_raise_t {
            Head: mach_msg_header_t {
                msgh_bits: MACH_MSGH_BITS(reply.bits & constants::MACH_MSGH_BITS_REMOTE_MASK, 0),
                msgh_size: size_of::<__Reply__exception_raise_t>() as mach_msg_size_t,
                msgh_remote_port: reply.remote_port,
                msgh_local_port: MACH_PORT_NULL,
                msgh_voucher_port: MACH_PORT_NULL,
                msgh_id: reply.reply_id(),
            },
            // SAFETY: NDR_record is an immutable static exported by libSystem.
            NDR: unsafe { NDR_record },
            RetCode: KERN_SUCCESS,
        };

        // SAFETY: `message` is a complete reply message of `msgh_size` bytes.
        let kr = unsafe {
            mach_msg(
                &mut message.Head,
                MACH_SEND_MSG | MACH_SEND_INTERRUPT,
                message.Head.msgh_size,
                0,
                MACH_PORT_NULL,
                MACH_MSG_TIMEOUT_NONE,
                MACH_PORT_NULL,
            )
        };
        if kr != MACH_MSG_SUCCESS {
            return Err(error::mach_error("mach_msg", kr));
        }
        Ok(())
    }
}
