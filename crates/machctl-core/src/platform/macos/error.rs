//! # Mach Error Translation
//!
//! Turns `kern_return_t` values into [`KernelError::Mach`], carrying the
//! kernel's own diagnostic from `mach_error_string()`.

use std::ffi::CStr;

use libc::kern_return_t;
use mach2::kern_return::KERN_SUCCESS;

use crate::error::{KernResult, KernelError};
use crate::platform::macos::ffi;

/// `mach_error_string()` for `code`.
pub fn describe(code: kern_return_t) -> String
{
    // SAFETY: mach_error_string returns a pointer to a static, NUL-terminated
    // string for every input, including unknown codes.
    unsafe {
        let message = ffi::mach_error_string(code);
        if message.is_null() {
            return format!("unknown error {code}");
        }
        CStr::from_ptr(message).to_string_lossy().into_owned()
    }
}

/// Build the error for a failed Mach call.
pub fn mach_error(call: &'static str, code: kern_return_t) -> KernelError
{
    KernelError::Mach {
        call,
        code,
        description: describe(code),
    }
}

/// `Ok(())` for `KERN_SUCCESS`, otherwise the translated error.
pub fn check(call: &'static str, code: kern_return_t) -> KernResult<()>
{
    if code == KERN_SUCCESS {
        Ok(())
    } else {
        Err(mach_error(call, code))
    }
}
