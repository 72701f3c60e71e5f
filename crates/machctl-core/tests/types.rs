//! Tests for platform-agnostic types

use machctl_core::types::{Address, Architecture, ProcessId, Registers, ThreadHandle, ThreadId};
use machctl_core::{PendingReply, ReplyToken};

#[test]
fn test_process_id_conversions()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    let value: u32 = pid.into();
    assert_eq!(value, 12345);
    assert_eq!(pid.to_string(), "12345");
}

#[test]
fn test_thread_id_ordering()
{
    let mut ids = vec![ThreadId(3), ThreadId(1), ThreadId(2)];
    ids.sort();
    assert_eq!(ids, vec![ThreadId(1), ThreadId(2), ThreadId(3)]);
    assert_eq!(ThreadId::from(9).raw(), 9);
}

#[test]
fn test_thread_handle_raw()
{
    assert_eq!(ThreadHandle(0x2603).raw(), 0x2603);
}

#[test]
fn test_address_arithmetic()
{
    let base = Address::new(0x1000);
    assert_eq!((base + 0x10).value(), 0x1010);
    assert_eq!((base - 0x10).value(), 0xff0);
    assert_eq!(Address::new(0x1010).offset_from(base), Some(0x10));
    assert_eq!(base.offset_from(Address::new(0x1010)), None);
    assert_eq!(Address::new(u64::MAX).checked_add(1), None);
    assert_eq!(Address::ZERO, Address::default());
}

#[test]
fn test_address_display()
{
    assert_eq!(Address::new(0xdead_beef).to_string(), "0x00000000deadbeef");
    assert_eq!(format!("{:x}", Address::new(0xff)), "ff");
}

#[test]
fn test_registers_default()
{
    let regs = Registers::default();
    assert_eq!(regs.pc, 0);
    assert_eq!(regs.sp, 0);
    assert_eq!(regs.fp, 0);
    assert_eq!(regs.status, 0);
    assert!(regs.general.is_empty());
    assert_eq!(regs.architecture, Architecture::host());
}

#[test]
fn test_host_architecture()
{
    #[cfg(target_arch = "aarch64")]
    assert_eq!(Architecture::host(), Architecture::Arm64);
    #[cfg(target_arch = "x86_64")]
    assert_eq!(Architecture::host(), Architecture::X86_64);
}

#[test]
fn test_reply_token()
{
    let token = ReplyToken::new(0x1200, 0x2b03, 0x1f03, 2405);
    assert_eq!(token.reply_id(), 2505);
    assert!(PendingReply::ViaException(token).is_pending());
    assert!(!PendingReply::default().is_pending());
}
