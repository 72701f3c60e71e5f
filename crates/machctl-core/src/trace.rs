//! # Trace-Control Thread
//!
//! Darwin ties `ptrace` permission to the *thread* that attached, not to the
//! debugger process. Every trace-protocol call (continue, step, signal
//! injection) therefore has to be issued from one persistent thread.
//!
//! [`TraceContext`] owns that thread. Callers hand it a closure through
//! [`TraceContext::execute`] and block until the closure has run there and
//! its result is back. Requests are processed strictly one at a time, in
//! arrival order.
//!
//! Mach calls have no such restriction and never go through here.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace};

use crate::error::{Result, ThreadControlError};

type TraceJob = Box<dyn FnOnce() + Send + 'static>;

enum TraceRequest
{
    Run(TraceJob),
    Shutdown,
}

/// Dedicated worker thread for trace-protocol calls
pub struct TraceContext
{
    name: String,
    requests: mpsc::Sender<TraceRequest>,
    worker_id: thread::ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TraceContext
{
    /// Start the worker thread.
    ///
    /// The thread must be the one that later performs `PT_ATTACH`; attach
    /// logic is outside this crate, so callers route it through
    /// [`execute`](Self::execute) as well.
    ///
    /// ## Errors
    ///
    /// `TraceContextUnavailable` if the OS refuses to create the thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self>
    {
        let name = name.into();
        let (requests, inbox) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_trace_loop(&inbox))
            .map_err(|err| ThreadControlError::TraceContextUnavailable(format!("spawn failed: {err}")))?;

        debug!(thread = %name, "trace-control thread started");
        Ok(Self {
            name,
            requests,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Name given to the worker thread.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Whether the calling thread is the trace-control thread.
    pub fn is_current(&self) -> bool
    {
        thread::current().id() == self.worker_id
    }

    /// Run `f` on the trace-control thread and wait for its result.
    ///
    /// Calls made from the worker itself (a job issuing a nested trace call)
    /// run inline instead of deadlocking on their own queue.
    ///
    /// ## Errors
    ///
    /// `TraceContextUnavailable` if the worker has shut down or `f` panicked.
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(f());
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: TraceJob = Box::new(move || {
            // The requester may have given up; nothing to do then.
            let _ = reply_tx.send(f());
        });

        self.requests
            .send(TraceRequest::Run(job))
            .map_err(|_| ThreadControlError::TraceContextUnavailable(format!("{} has shut down", self.name)))?;

        reply_rx.recv().map_err(|_| {
            ThreadControlError::TraceContextUnavailable(format!("{} dropped the request without a result", self.name))
        })
    }
}

impl Drop for TraceContext
{
    fn drop(&mut self)
    {
        let _ = self.requests.send(TraceRequest::Shutdown);
        let worker = match self.worker.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                error!(thread = %self.name, "trace-control thread panicked during shutdown");
            }
        }
    }
}

fn run_trace_loop(inbox: &mpsc::Receiver<TraceRequest>)
{
    while let Ok(request) = inbox.recv() {
        match request {
            TraceRequest::Run(job) => {
                trace!("running trace-protocol request");
                // A panicking job drops its reply sender, which the caller sees
                // as an error. The worker keeps serving.
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("trace-protocol request panicked");
                }
            }
            TraceRequest::Shutdown => break,
        }
    }
    debug!("trace-control thread exiting");
}
