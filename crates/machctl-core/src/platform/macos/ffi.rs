//! # macOS FFI Declarations
//!
//! Mach routines the backend calls that are not taken from `mach2`.
//!
//! ## Safety Notes
//!
//! Every function here takes raw ports and raw buffers. Callers must pass a
//! live port of the right kind and a buffer sized for the requested flavor;
//! the safe wrappers in [`registers`](super::registers),
//! [`memory`](super::memory) and [`kernel`](super::kernel) are the only
//! callers.

// Allow doc comments in extern blocks - they're useful for developers even if rustdoc doesn't generate docs
#![allow(unused_doc_comments)]

use libc::{c_char, c_int, kern_return_t, mach_msg_type_number_t, natural_t, thread_act_t, vm_map_t, vm_offset_t};

/// `time_value_t`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeValue
{
    pub seconds: c_int,
    pub microseconds: c_int,
}

/// `thread_basic_info_data_t`, returned by `thread_info(THREAD_BASIC_INFO)`
///
/// Only `suspend_count` is read; the rest is here so the kernel has the
/// buffer size it expects.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadBasicInfo
{
    pub user_time: TimeValue,
    pub system_time: TimeValue,
    pub cpu_usage: c_int,
    pub policy: c_int,
    pub run_state: c_int,
    pub flags: c_int,
    /// Number of outstanding `thread_suspend` calls
    pub suspend_count: c_int,
    pub sleep_time: c_int,
}

// Thread Control Functions
#[link(name = "c", kind = "dylib")]
extern "C" {
    /// Increment a thread's suspend count.
    ///
    /// See: [thread_suspend(3)](https://developer.apple.com/documentation/kernel/1402804-thread_suspend/)
    pub fn thread_suspend(target_act: thread_act_t) -> kern_return_t;

    /// Decrement a thread's suspend count; the thread runs again when it reaches zero.
    ///
    /// See: [thread_resume(3)](https://developer.apple.com/documentation/kernel/1402805-thread_resume/)
    pub fn thread_resume(target_act: thread_act_t) -> kern_return_t;

    /// Read a thread-state flavor into `old_state`.
    ///
    /// `old_state_count` is the buffer size in `natural_t` words on input and
    /// the size used on output.
    ///
    /// See: [thread_get_state(3)](https://developer.apple.com/documentation/kernel/1418576-thread_get_state/)
    pub fn thread_get_state(
        target_act: thread_act_t,
        flavor: c_int,
        old_state: *mut natural_t,
        old_state_count: *mut mach_msg_type_number_t,
    ) -> kern_return_t;

    /// Replace a thread-state flavor.
    ///
    /// See: [thread_set_state(3)](https://developer.apple.com/documentation/kernel/1418827-thread_set_state/)
    pub fn thread_set_state(
        target_act: thread_act_t,
        flavor: c_int,
        new_state: *const natural_t,
        new_state_count: mach_msg_type_number_t,
    ) -> kern_return_t;

    /// Query scheduling information about a thread.
    ///
    /// With `THREAD_BASIC_INFO` the output is a [`ThreadBasicInfo`].
    ///
    /// See: [thread_info(3)](https://developer.apple.com/documentation/kernel/1418630-thread_info/)
    pub fn thread_info(
        target_act: thread_act_t,
        flavor: c_int,
        thread_info_out: *mut c_int,
        thread_info_out_count: *mut mach_msg_type_number_t,
    ) -> kern_return_t;
}

// Virtual Memory and Diagnostics
#[link(name = "c", kind = "dylib")]
extern "C" {
    /// Copy `data_count` bytes from our address space into `target_task` at `address`.
    ///
    /// See: [mach_vm_write(3)](https://developer.apple.com/documentation/kernel/1402070-mach_vm_write/)
    pub fn mach_vm_write(
        target_task: vm_map_t,
        address: u64, // mach_vm_address_t
        data: vm_offset_t,
        data_count: mach_msg_type_number_t,
    ) -> kern_return_t;

    /// Static, NUL-terminated description of a Mach error code.
    pub fn mach_error_string(error_value: kern_return_t) -> *const c_char;
}
