//! # Task Memory
//!
//! Reads with `mach_vm_read_overwrite()` and writes with `mach_vm_write()`.
//!
//! Code pages are mapped read/execute, so a write first raises the current
//! protection of the target range to `READ | WRITE | COPY` (copy-on-write keeps
//! shared text from being modified in other processes) and puts the region's
//! original protection back afterwards.
//!
//! ## References
//!
//! - [mach_vm_read_overwrite(3)](https://developer.apple.com/documentation/kernel/1402127-mach_vm_read_overwrite/)
//! - [mach_vm_protect(3)](https://developer.apple.com/documentation/kernel/1402149-mach_vm_protect/)

use libc::{c_int, mach_msg_type_number_t, mach_port_t, vm_map_t, vm_offset_t};
use mach2::vm::{mach_vm_protect, mach_vm_read_overwrite, mach_vm_region_recurse};
use mach2::vm_region::{
    vm_region_recurse_info_t, vm_region_submap_short_info_data_64_t, VM_REGION_SUBMAP_SHORT_INFO_COUNT_64,
};
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, natural_t};
use tracing::warn;

use crate::error::{KernResult, KernelError};
use crate::platform::macos::{constants, error, ffi};
use crate::types::Address;

/// Fill `dst` from `address` with one `mach_vm_read_overwrite`. A short
/// transfer is an error.
pub(super) fn read_into(task: mach_port_t, address: Address, dst: &mut [u8]) -> KernResult<()>
{
    let mut actual: mach_vm_size_t = 0;

    // SAFETY: `dst` is a live, writable buffer of exactly `dst.len()` bytes.
    let kr = unsafe {
        mach_vm_read_overwrite(
            task as vm_map_t,
            address.value(),
            dst.len() as mach_vm_size_t,
            dst.as_mut_ptr() as mach_vm_address_t,
            &mut actual,
        )
    };
    error::check("mach_vm_read_overwrite", kr)?;

    if actual != dst.len() as mach_vm_size_t {
        return Err(KernelError::Mach {
            call: "mach_vm_read_overwrite",
            code: libc::KERN_INVALID_ADDRESS,
            description: format!("short read: {actual} of {} bytes", dst.len()),
        });
    }
    Ok(())
}

/// Write all of `data` at `address`, lifting page protection for the duration.
pub(super) fn write(task: mach_port_t, address: Address, data: &[u8]) -> KernResult<()>
{
    let len = mach_msg_type_number_t::try_from(data.len()).map_err(|_| KernelError::Mach {
        call: "mach_vm_write",
        code: libc::KERN_INVALID_ARGUMENT,
        description: format!("write of {} bytes exceeds a single transfer", data.len()),
    })?;

    let guard = ProtectionGuard::make_writable(task, address, data.len())?;

    // SAFETY: `data` is a live slice of exactly `len` bytes.
    let kr = unsafe { ffi::mach_vm_write(task as vm_map_t, address.value(), data.as_ptr() as vm_offset_t, len) };
    error::check("mach_vm_write", kr)?;

    guard.restore()
}

/// Current protection of the range `[address, address + len)`, raised for a
/// write and put back by [`restore`](Self::restore) or on drop.
struct ProtectionGuard
{
    task: mach_port_t,
    address: mach_vm_address_t,
    len: mach_vm_size_t,
    original: c_int,
    active: bool,
}

impl ProtectionGuard
{
    fn make_writable(task: mach_port_t, address: Address, len: usize) -> KernResult<Self>
    {
        let original = region_protection(task, address)?;
        let requested = libc::VM_PROT_READ | libc::VM_PROT_WRITE | constants::VM_PROT_COPY;
        change_protection(task, address.value(), len as mach_vm_size_t, requested)?;

        Ok(Self {
            task,
            address: address.value(),
            len: len as mach_vm_size_t,
            original,
            active: true,
        })
    }

    fn restore(mut self) -> KernResult<()>
    {
        self.active = false;
        change_protection(self.task, self.address, self.len, self.original)
    }
}

impl Drop for ProtectionGuard
{
    fn drop(&mut self)
    {
        if self.active {
            if let Err(err) = change_protection(self.task, self.address, self.len, self.original) {
                warn!(address = %Address::new(self.address), error = %err, "could not restore page protection");
            }
        }
    }
}

/// Current protection of the innermost region containing `address`.
fn region_protection(task: mach_port_t, address: Address) -> KernResult<c_int>
{
    let mut target = address.value();
    let mut depth: natural_t = 0;

    loop {
        let mut size: mach_vm_size_t = 0;
        let mut info = vm_region_submap_short_info_data_64_t::default();
        let mut info_count = VM_REGION_SUBMAP_SHORT_INFO_COUNT_64;

        // SAFETY: `info` is the struct matching VM_REGION_SUBMAP_SHORT_INFO_COUNT_64.
        let kr = unsafe {
            mach_vm_region_recurse(
                task as vm_map_t,
                &mut target,
                &mut size,
                &mut depth,
                &mut info as *mut _ as vm_region_recurse_info_t,
                &mut info_count,
            )
        };
        error::check("mach_vm_region_recurse", kr)?;

        if target > address.value() {
            // The lookup skipped forward: `address` itself is unmapped.
            return Err(error::mach_error("mach_vm_region_recurse", libc::KERN_INVALID_ADDRESS));
        }
        if info.is_submap != 0 {
            depth += 1;
            continue;
        }
        return Ok(info.protection);
    }
}

fn change_protection(task: mach_port_t, address: mach_vm_address_t, len: mach_vm_size_t, protection: c_int) -> KernResult<()>
{
    // Current protection only (set_maximum = 0).
    // SAFETY: plain kernel call on a task port; no buffers involved.
    let kr = unsafe { mach_vm_protect(task as vm_map_t, address, len, 0, protection) };
    error::check("mach_vm_protect", kr)
}
