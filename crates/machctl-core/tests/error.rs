//! Tests for error handling

use std::error::Error as _;
use std::io;

use machctl_core::error::{KernelError, ResumeProtocol, ThreadControlError, WaitError};
use machctl_core::{Address, ProcessId, ThreadId};

#[test]
fn test_kernel_error_display()
{
    let error = KernelError::Mach {
        call: "thread_suspend",
        code: 15,
        description: "(os/kern) invalid name".to_string(),
    };
    assert_eq!(error.to_string(), "thread_suspend: (os/kern) invalid name (kern_return_t 15)");

    let error = KernelError::Os {
        call: "ptrace(PT_THUPDATE)",
        source: io::Error::from_raw_os_error(libc::ESRCH),
    };
    assert!(error.to_string().starts_with("ptrace(PT_THUPDATE): "));
    assert!(error.source().is_some());
}

#[test]
fn test_continue_failure_names_protocol()
{
    let error = ThreadControlError::ContinueThreadFailed {
        thread_id: ThreadId(7),
        protocol: ResumeProtocol::ExceptionReply,
        reason: "(ipc/send) invalid destination port".to_string(),
    };
    let message = error.to_string();
    assert!(message.contains("could not continue thread"));
    assert!(message.contains("exception reply"));
}

#[test]
fn test_wait_failure_keeps_source()
{
    let error = ThreadControlError::WaitFailed {
        thread_id: ThreadId(7),
        source: WaitError::TimedOut {
            pid: ProcessId(42),
            timeout_ms: 250,
        },
    };
    assert!(error.to_string().contains("waiting for trap on thread 7"));
    let source = error.source().unwrap();
    assert_eq!(source.to_string(), "no stop event from process 42 within 250 ms");
}

#[test]
fn test_memory_errors_include_range()
{
    let error = ThreadControlError::MemoryWriteFailed {
        address: Address::new(0x1000),
        size: 4,
        reason: "protection failure".to_string(),
    };
    assert_eq!(
        error.to_string(),
        "could not write 4 bytes at 0x0000000000001000: protection failure"
    );
}

#[test]
fn test_detached_and_unknown_thread_display()
{
    assert_eq!(
        ThreadControlError::ProcessDetached(ProcessId(42)).to_string(),
        "process 42 is no longer attached"
    );
    let error = ThreadControlError::UnknownThread {
        pid: ProcessId(42),
        thread_id: ThreadId(9),
    };
    assert_eq!(error.to_string(), "thread 9 is not part of process 42");
}

#[test]
fn test_resume_protocol_display()
{
    assert_eq!(ResumeProtocol::ExceptionReply.to_string(), "exception reply");
    assert_eq!(ResumeProtocol::MachResume.to_string(), "mach resume");
}

#[cfg(target_os = "macos")]
#[test]
fn test_mach_error_uses_kernel_description()
{
    use machctl_core::platform::macos::error::mach_error;

    let error = mach_error("thread_suspend", libc::KERN_INVALID_ARGUMENT);
    let message = error.to_string();
    assert!(message.starts_with("thread_suspend: "));
    assert!(message.contains("(kern_return_t 4)"));
}
