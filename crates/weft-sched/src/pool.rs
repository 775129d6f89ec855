//! Ambient thread pool executor.

use crate::fault::ExecutorKind;
use crate::task::Continuation;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};

/// Pool executor: fire-and-forget submission to a fixed set of threads.
///
/// Each submission is a standalone work item. There is no queue ownership to
/// speak of (the channel is unbounded), no ordering guarantee between
/// submissions, and no cancellation. Submission never blocks and never fails
/// observably; after shutdown the item is silently handed back for
/// drop-reporting.
pub(crate) struct ThreadPool {
    size: usize,
    sender: Mutex<Option<Sender<Continuation>>>,
    receiver: Mutex<Option<Receiver<Continuation>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a pool with `size` threads. 0 means one per CPU core.
    pub(crate) fn new(size: usize) -> Self {
        let size = if size == 0 { num_cpus::get() } else { size };
        let (sender, receiver) = unbounded();
        Self {
            size,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the pool threads. Submissions made before this call sit in the
    /// channel until a thread picks them up.
    pub(crate) fn start(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        let mut handles = self.handles.lock();
        for i in 0..self.size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("weft-pool-{}", i))
                .spawn(move || {
                    while let Ok(cont) = receiver.recv() {
                        cont.resume(ExecutorKind::Pool);
                    }
                })
                .expect("Failed to spawn pool thread");
            handles.push(handle);
        }
    }

    /// Hand a continuation to the pool.
    pub(crate) fn submit(&self, cont: Continuation) -> Result<(), Continuation> {
        match &*self.sender.lock() {
            Some(sender) => sender.send(cont).map_err(|err| err.into_inner()),
            None => Err(cont),
        }
    }

    /// Close the channel and join the threads. In-flight resumes finish
    /// first; everything still in the channel is drained by the exiting
    /// threads before they observe the disconnect.
    pub(crate) fn shutdown(&self) {
        self.sender.lock().take();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            handle.join().expect("Failed to join pool thread");
        }
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}
