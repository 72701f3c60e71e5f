//! Shared fixtures: a recording in-memory kernel and a scripted trap waiter.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use machctl_core::error::{KernResult, KernelError, WaitError};
use machctl_core::{
    Address, CancellationToken, ControllerConfig, Process, ProcessId, Registers, ReplyToken, SymbolTable, TaskPort,
    ThreadHandle, ThreadId, ThreadKernel, TrapWaiter, WaitStatus,
};

pub const PID: ProcessId = ProcessId(4242);
pub const TASK: TaskPort = TaskPort(0x103);
pub const MAIN: ThreadId = ThreadId(0x1001);
pub const MAIN_PORT: ThreadHandle = ThreadHandle(0x2603);
pub const WORKER: ThreadId = ThreadId(0x1002);
pub const WORKER_PORT: ThreadHandle = ThreadHandle(0x2703);
pub const TRACE_THREAD: &str = "test-ptrace";
pub const SIGTRAP: i32 = 5;

pub fn token() -> ReplyToken
{
    ReplyToken::new(0x1200, 0x2b03, 0x1f03, 2405)
}

/// One kernel call, in the order it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call
{
    Suspend(ThreadHandle),
    Resume(ThreadHandle),
    SuspendCount(ThreadHandle),
    GetRegisters(ThreadHandle),
    SetRegisters(ThreadHandle),
    SetSingleStep(ThreadHandle, bool),
    ReadMemory
    {
        address: u64,
        len: usize,
    },
    WriteMemory
    {
        address: u64,
        len: usize,
    },
    TraceContinue
    {
        pid: ProcessId,
        thread: ThreadHandle,
        signal: i32,
        /// Name of the OS thread the call was issued from
        issued_on: Option<String>,
    },
    ExceptionReply(ReplyToken),
    /// Recorded by [`ScriptedWaiter`]
    WaitForStop(ProcessId),
}

/// Calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail
{
    Suspend,
    Resume,
    SuspendCount,
    GetRegisters,
    SetRegisters,
    SetStep,
    ClearStep,
    Read,
    Write,
    TraceContinue,
    ExceptionReply,
}

#[derive(Default)]
struct KernelState
{
    calls: Vec<Call>,
    failures: HashSet<Fail>,
    suspend_counts: HashMap<ThreadHandle, i32>,
    trap_flags: HashMap<ThreadHandle, bool>,
    registers: HashMap<ThreadHandle, Registers>,
    memory: BTreeMap<u64, u8>,
}

/// `ThreadKernel` backed by plain maps
///
/// Memory is sparse: only ranges added with [`map`](Self::map) are readable
/// and writable; touching anything else fails like an unmapped page.
#[derive(Default)]
pub struct FakeKernel
{
    state: Mutex<KernelState>,
}

impl FakeKernel
{
    pub fn new() -> Arc<Self>
    {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, KernelState>
    {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, call: Fail)
    {
        self.state().failures.insert(call);
    }

    pub fn heal(&self, call: Fail)
    {
        self.state().failures.remove(&call);
    }

    pub fn calls(&self) -> Vec<Call>
    {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self)
    {
        self.state().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize
    {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn map(&self, address: u64, len: usize)
    {
        let mut state = self.state();
        for offset in 0..len as u64 {
            state.memory.entry(address + offset).or_insert(0);
        }
    }

    pub fn suspend_count_of(&self, thread: ThreadHandle) -> i32
    {
        self.state().suspend_counts.get(&thread).copied().unwrap_or(0)
    }

    pub fn set_suspend_count(&self, thread: ThreadHandle, count: i32)
    {
        self.state().suspend_counts.insert(thread, count);
    }

    pub fn trap_flag(&self, thread: ThreadHandle) -> bool
    {
        self.state().trap_flags.get(&thread).copied().unwrap_or(false)
    }

    pub fn set_pc(&self, thread: ThreadHandle, pc: u64)
    {
        let mut state = self.state();
        state.registers.entry(thread).or_default().pc = pc;
    }

    pub fn record(&self, call: Call)
    {
        self.state().calls.push(call);
    }

    fn check(&self, state: &KernelState, call: Fail, name: &'static str) -> KernResult<()>
    {
        if state.failures.contains(&call) {
            return Err(KernelError::Mach {
                call: name,
                code: 14,
                description: "(os/kern) failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ThreadKernel for FakeKernel
{
    fn suspend(&self, thread: ThreadHandle) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::Suspend(thread));
        self.check(&state, Fail::Suspend, "thread_suspend")?;
        *state.suspend_counts.entry(thread).or_insert(0) += 1;
        Ok(())
    }

    fn resume(&self, thread: ThreadHandle) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::Resume(thread));
        self.check(&state, Fail::Resume, "thread_resume")?;
        let count = state.suspend_counts.entry(thread).or_insert(0);
        *count = (*count - 1).max(0);
        Ok(())
    }

    fn suspend_count(&self, thread: ThreadHandle) -> KernResult<i32>
    {
        let mut state = self.state();
        state.calls.push(Call::SuspendCount(thread));
        self.check(&state, Fail::SuspendCount, "thread_info")?;
        Ok(state.suspend_counts.get(&thread).copied().unwrap_or(0))
    }

    fn get_registers(&self, thread: ThreadHandle) -> KernResult<Registers>
    {
        let mut state = self.state();
        state.calls.push(Call::GetRegisters(thread));
        self.check(&state, Fail::GetRegisters, "thread_get_state")?;
        Ok(state.registers.get(&thread).cloned().unwrap_or_default())
    }

    fn set_registers(&self, thread: ThreadHandle, registers: &Registers) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::SetRegisters(thread));
        self.check(&state, Fail::SetRegisters, "thread_set_state")?;
        state.registers.insert(thread, registers.clone());
        Ok(())
    }

    fn set_single_step(&self, thread: ThreadHandle, enabled: bool) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::SetSingleStep(thread, enabled));
        let failure = if enabled { Fail::SetStep } else { Fail::ClearStep };
        self.check(&state, failure, "thread_set_state")?;
        state.trap_flags.insert(thread, enabled);
        Ok(())
    }

    fn read_memory(&self, _task: TaskPort, address: Address, buf: &mut [u8]) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::ReadMemory {
            address: address.value(),
            len: buf.len(),
        });
        self.check(&state, Fail::Read, "mach_vm_read_overwrite")?;
        let mut bytes = Vec::with_capacity(buf.len());
        for offset in 0..buf.len() as u64 {
            match state.memory.get(&(address.value() + offset)) {
                Some(byte) => bytes.push(*byte),
                None => {
                    return Err(KernelError::Mach {
                        call: "mach_vm_read_overwrite",
                        code: 1,
                        description: "(os/kern) invalid address".to_string(),
                    })
                }
            }
        }
        buf.copy_from_slice(&bytes);
        Ok(())
    }

    fn write_memory(&self, _task: TaskPort, address: Address, data: &[u8]) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::WriteMemory {
            address: address.value(),
            len: data.len(),
        });
        self.check(&state, Fail::Write, "mach_vm_write")?;
        let start = address.value();
        let end = start + data.len() as u64;
        if state.memory.range(start..end).count() != data.len() {
            return Err(KernelError::Mach {
                call: "mach_vm_region_recurse",
                code: 1,
                description: "(os/kern) invalid address".to_string(),
            });
        }
        for (offset, byte) in data.iter().enumerate() {
            state.memory.insert(start + offset as u64, *byte);
        }
        Ok(())
    }

    fn trace_continue(&self, pid: ProcessId, thread: ThreadHandle, signal: i32) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::TraceContinue {
            pid,
            thread,
            signal,
            issued_on: thread::current().name().map(str::to_string),
        });
        self.check(&state, Fail::TraceContinue, "ptrace(PT_THUPDATE)")
    }

    fn send_exception_reply(&self, reply: &ReplyToken) -> KernResult<()>
    {
        let mut state = self.state();
        state.calls.push(Call::ExceptionReply(*reply));
        self.check(&state, Fail::ExceptionReply, "mach_msg")
    }
}

/// Trap waiter that replays queued outcomes and logs each wait into the
/// kernel's call list, so tests can check ordering against kernel calls
pub struct ScriptedWaiter
{
    kernel: Arc<FakeKernel>,
    outcomes: Mutex<VecDeque<Result<WaitStatus, WaitError>>>,
    seen: Mutex<Vec<(bool, Option<Duration>)>>,
}

impl ScriptedWaiter
{
    pub fn new(kernel: Arc<FakeKernel>) -> Arc<Self>
    {
        Arc::new(Self {
            kernel,
            outcomes: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, outcome: Result<WaitStatus, WaitError>)
    {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// `(cancelled, timeout)` for every wait so far.
    pub fn seen(&self) -> Vec<(bool, Option<Duration>)>
    {
        self.seen.lock().unwrap().clone()
    }
}

impl TrapWaiter for ScriptedWaiter
{
    fn wait_for_stop(
        &self,
        pid: ProcessId,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus, WaitError>
    {
        self.kernel.record(Call::WaitForStop(pid));
        self.seen.lock().unwrap().push((cancel.is_cancelled(), timeout));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(WaitStatus::Stopped { signal: SIGTRAP }))
    }
}

pub fn test_config() -> ControllerConfig
{
    ControllerConfig::default().with_trace_thread_name(TRACE_THREAD)
}

/// A process with `MAIN` and `WORKER` registered, over the given fakes.
pub fn process_with(kernel: &Arc<FakeKernel>, waiter: Arc<dyn TrapWaiter>, config: ControllerConfig) -> Process
{
    let kernel: Arc<dyn ThreadKernel> = kernel.clone();
    let mut process = Process::builder(PID, TASK, kernel)
        .waiter(waiter)
        .symbols(Arc::new(SymbolTable::new()))
        .config(config)
        .build()
        .unwrap();
    assert!(process.add_thread(MAIN, MAIN_PORT));
    assert!(process.add_thread(WORKER, WORKER_PORT));
    process
}

/// Default fixture: fake kernel, scripted waiter, test config.
pub fn setup() -> (Arc<FakeKernel>, Arc<ScriptedWaiter>, Process)
{
    let kernel = FakeKernel::new();
    let waiter = ScriptedWaiter::new(kernel.clone());
    let process = process_with(&kernel, waiter.clone(), test_config());
    (kernel, waiter, process)
}

pub fn init_test_logging()
{
    let _ = machctl_utils::init_logging_with_level(machctl_utils::LogLevel::Debug, machctl_utils::LogFormat::Pretty);
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>
    {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String)
{
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (result, logs)
}
