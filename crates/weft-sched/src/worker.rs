//! Dedicated worker thread that drains a continuation queue.

use crate::fault::ExecutorKind;
use crate::queue::ContinuationQueue;
use crate::scheduler::SchedCore;
use crate::task::Continuation;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Background executor: one owned thread, one queue, one cancellation flag.
///
/// Producers push from any thread; only the owned thread ever drains. The
/// queue's condvar parks the thread while there is nothing to do.
pub(crate) struct BackgroundWorker {
    queue: ContinuationQueue,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWorker {
    pub(crate) fn new() -> Self {
        Self {
            queue: ContinuationQueue::new(),
            handle: Mutex::new(None),
        }
    }

    /// Start the worker thread.
    pub(crate) fn start(&self, core: &Arc<SchedCore>) {
        let core = Arc::clone(core);
        let handle = thread::Builder::new()
            .name("weft-worker".to_string())
            .spawn(move || run_loop(&core))
            .expect("Failed to spawn worker thread");

        *self.handle.lock() = Some(handle);
    }

    /// Enqueue a continuation. Rejected after cancellation.
    pub(crate) fn push(&self, cont: Continuation) -> Result<(), Continuation> {
        self.queue.push(cont)
    }

    /// Set the cancellation flag and wake the thread. One-way.
    pub(crate) fn cancel(&self) {
        self.queue.cancel();
    }

    /// Join the worker thread, if it was started.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.join().expect("Failed to join worker thread");
        }
    }

    pub(crate) fn queue(&self) -> &ContinuationQueue {
        &self.queue
    }
}

/// Worker thread main loop.
///
/// The blocking pop holds the queue lock only between resumes, so resumed
/// code is free to push more work, including onto this very queue, and the
/// same pass picks it up.
fn run_loop(core: &Arc<SchedCore>) {
    tracing::debug!("worker thread started");

    while let Some(cont) = core.worker().queue().pop_blocking() {
        cont.resume(ExecutorKind::Worker);
    }

    // Canceled. Whatever is still queued is subject to the cancel policy.
    core.apply_cancel_policy();

    tracing::debug!("worker thread shutting down");
}
