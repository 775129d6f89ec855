//! Fault channel: tagged records for failures observed at resume boundaries.
//!
//! Drain loops never unwind and never retry. Anything that goes wrong while
//! a continuation is handled, a panic inside the resumed code, a continuation
//! dropped by cancellation, a task that can never be woken again, becomes a
//! [`FaultRecord`] forwarded to an injectable [`FaultSink`].

use crate::task::TaskId;
use parking_lot::Mutex;

/// The executor context a fault was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Inline first resume performed by `spawn`.
    Spawn,
    /// The dedicated worker thread.
    Worker,
    /// The ambient thread pool.
    Pool,
    /// The event loop's wake trigger.
    Wake,
    /// The event loop's timer trigger.
    Timer,
    /// The event loop's paint trigger.
    Paint,
}

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// The task's code panicked while it was being resumed.
    Panic {
        /// Message extracted from the panic payload.
        message: String,
    },
    /// A continuation was resumed a second time. Defensive only; the
    /// one-shot handle makes this unreachable through the public surface.
    DoubleResume,
    /// The task suspended without requesting an executor transfer and can
    /// never be woken again.
    Stalled,
    /// A continuation was dropped without being resumed (cancellation or
    /// shutdown).
    Dropped,
}

/// One fault, tagged with the task and the executor it was observed on.
#[derive(Debug, Clone)]
pub struct FaultRecord {
    /// The task the fault belongs to.
    pub task: TaskId,
    /// Where the fault was observed.
    pub executor: ExecutorKind,
    /// What went wrong.
    pub kind: FaultKind,
}

/// Receiver for fault records.
///
/// Injected at scheduler construction; implementations must tolerate calls
/// from any executor thread.
pub trait FaultSink: Send + Sync {
    /// Accept one fault record.
    fn report(&self, record: FaultRecord);
}

/// Default sink: forwards every record to the log.
pub struct LogFaultSink;

impl FaultSink for LogFaultSink {
    fn report(&self, record: FaultRecord) {
        match &record.kind {
            FaultKind::Panic { message } => tracing::error!(
                "task {} panicked during resume on {:?}: {}",
                record.task.as_u64(),
                record.executor,
                message
            ),
            FaultKind::DoubleResume => tracing::error!(
                "task {} resumed twice on {:?}",
                record.task.as_u64(),
                record.executor
            ),
            FaultKind::Stalled => tracing::error!(
                "task {} suspended outside a switch point and was dropped",
                record.task.as_u64()
            ),
            FaultKind::Dropped => tracing::warn!(
                "continuation of task {} dropped without resume ({:?})",
                record.task.as_u64(),
                record.executor
            ),
        }
    }
}

/// Sink that keeps every record for later inspection.
#[derive(Default)]
pub struct DeadLetterSink {
    records: Mutex<Vec<FaultRecord>>,
}

impl DeadLetterSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn records(&self) -> Vec<FaultRecord> {
        self.records.lock().clone()
    }

    /// Number of records reported so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl FaultSink for DeadLetterSink {
    fn report(&self, record: FaultRecord) {
        self.records.lock().push(record);
    }
}
