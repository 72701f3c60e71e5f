//! CPU register snapshot.

/// CPU architecture of the debuggee thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// Apple Silicon / AArch64
    Arm64,
    /// Intel 64-bit
    X86_64,
    /// Anything else; the string is the `target_arch` we were built for
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture this crate was compiled for.
    ///
    /// The Mach thread-state flavors are only available for the host
    /// architecture, so this is also the only architecture the macOS backend
    /// can read registers for.
    pub const fn host() -> Self
    {
        if cfg!(target_arch = "aarch64") {
            Architecture::Arm64
        } else if cfg!(target_arch = "x86_64") {
            Architecture::X86_64
        } else {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }
}

/// Architecture-neutral copy of a thread's general-purpose register state
///
/// The snapshot is written by `thread_get_state` / `thread_set_state` and is
/// never assumed to be fresh unless it was just fetched.
///
/// ## Layout of `general`
///
/// - **ARM64**: `x0` ..= `x28` followed by `lr` (`fp` is in [`Registers::fp`])
/// - **x86-64**: `rax rbx rcx rdx rdi rsi r8 .. r15` in Mach order
///
/// `status` holds CPSR on ARM64 and RFLAGS on x86-64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers
{
    /// Architecture the values were read from
    pub architecture: Architecture,
    /// Program counter (`pc` / `rip`)
    pub pc: u64,
    /// Stack pointer (`sp` / `rsp`)
    pub sp: u64,
    /// Frame pointer (`x29` / `rbp`)
    pub fp: u64,
    /// Status / flags register
    pub status: u64,
    /// Remaining general-purpose registers
    pub general: Vec<u64>,
}

impl Registers
{
    /// An all-zero snapshot for the host architecture.
    pub fn new() -> Self
    {
        Self {
            architecture: Architecture::host(),
            pc: 0,
            sp: 0,
            fp: 0,
            status: 0,
            general: Vec::new(),
        }
    }
}

impl Default for Registers
{
    fn default() -> Self
    {
        Self::new()
    }
}
