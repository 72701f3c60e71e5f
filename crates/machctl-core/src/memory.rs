//! # Debuggee Memory Access
//!
//! Byte-exact reads and writes through the process-wide task port.
//!
//! Both directions are all-or-nothing at this interface: a read either
//! returns every requested byte or an error, and a write either reports the
//! full length or an error. Zero-length requests never reach the kernel.

use tracing::trace;

use crate::error::{Result, ThreadControlError};
use crate::process::ProcessContext;
use crate::types::Address;

/// Reads and writes the debuggee's address space
///
/// Obtained from [`Process::memory`](crate::process::Process::memory) or
/// used implicitly through a thread controller. Memory calls are Mach calls,
/// so they may be issued from any thread.
pub struct MemoryAccessor<'a>
{
    process: &'a ProcessContext,
}

impl<'a> MemoryAccessor<'a>
{
    pub(crate) fn new(process: &'a ProcessContext) -> Self
    {
        Self { process }
    }

    /// Read exactly `size` bytes at `address`.
    ///
    /// ## Errors
    ///
    /// - `MemoryReadFailed`: the kernel read failed; no bytes are returned
    /// - `ProcessDetached`: the task port is no longer valid
    pub fn read_memory(&self, address: Address, size: usize) -> Result<Vec<u8>>
    {
        if size == 0 {
            return Ok(Vec::new());
        }
        self.process.ensure_attached()?;

        let mut buffer = vec![0u8; size];
        self.process
            .kernel
            .read_memory(self.process.task, address, &mut buffer)
            .map_err(|err| ThreadControlError::MemoryReadFailed {
                address,
                size,
                reason: err.to_string(),
            })?;

        trace!(%address, size, "read debuggee memory");
        Ok(buffer)
    }

    /// Write all of `data` at `address`, returning the number of bytes written.
    ///
    /// ## Errors
    ///
    /// - `MemoryWriteFailed`: the kernel write failed
    /// - `ProcessDetached`: the task port is no longer valid
    pub fn write_memory(&self, address: Address, data: &[u8]) -> Result<usize>
    {
        if data.is_empty() {
            return Ok(0);
        }
        self.process.ensure_attached()?;

        self.process
            .kernel
            .write_memory(self.process.task, address, data)
            .map_err(|err| ThreadControlError::MemoryWriteFailed {
                address,
                size: data.len(),
                reason: err.to_string(),
            })?;

        trace!(%address, size = data.len(), "wrote debuggee memory");
        Ok(data.len())
    }

    /// Read a little-endian `u64` (a pointer-sized word on both supported targets).
    ///
    /// ## Errors
    ///
    /// Same as [`read_memory`](Self::read_memory).
    pub fn read_u64(&self, address: Address) -> Result<u64>
    {
        let bytes = self.read_memory(address, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(word))
    }
}
