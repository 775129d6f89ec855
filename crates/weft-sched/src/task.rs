//! Task structure and the resume trampoline.

use crate::context;
use crate::event_loop::{PaintSlot, Region};
use crate::fault::{ExecutorKind, FaultKind};
use crate::scheduler::SchedCore;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Poll, Waker};

/// Executor handoff requested by a switch primitive.
///
/// When a task cannot proceed past a suspension point, its remaining
/// computation has to be re-enqueued somewhere. The variant tells the
/// trampoline which queue the continuation goes to.
pub(crate) enum Transfer {
    /// Re-enqueue on the dedicated worker thread.
    Worker,
    /// Submit to the ambient thread pool.
    Pool,
    /// Enqueue on the event loop's wake queue and notify the host.
    Wake,
    /// Enqueue on the event loop's timer queue.
    Timer,
    /// Enqueue on the event loop's paint queue and request a redraw.
    Paint {
        /// Output slot the paint drain fills right before resuming.
        slot: Arc<PaintSlot>,
        /// Region the redraw is requested for.
        region: Region,
    },
}

/// Unique identifier for a task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId.
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a task.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Just created, not yet resumed.
    Created,
    /// Currently executing on some executor thread.
    Running,
    /// Parked on a queue, waiting to be resumed.
    Suspended,
    /// Ran to completion.
    Completed,
    /// Terminated by a fault during resume.
    Faulted,
}

pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A suspendable computation.
///
/// The future slot holds the remaining computation while the task is parked.
/// It is checked out for the duration of a poll, so a task that is currently
/// running (or finished) has an empty slot.
pub struct Task {
    id: TaskId,
    state: Mutex<TaskState>,
    future: Mutex<Option<TaskFuture>>,
    core: Weak<SchedCore>,
}

impl Task {
    pub(crate) fn new(future: TaskFuture, core: Weak<SchedCore>) -> Self {
        Self {
            id: TaskId::new(),
            state: Mutex::new(TaskState::Created),
            future: Mutex::new(Some(future)),
            core,
        }
    }

    /// Get the task's unique ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the current state.
    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }
}

/// One-shot handle to a suspended task.
///
/// A continuation is moved into exactly one queue and consumed by the drain
/// that resumes it; it cannot be cloned, so a second resume of the same
/// suspension is unrepresentable.
pub struct Continuation {
    task: Arc<Task>,
}

impl Continuation {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    pub(crate) fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Resume the suspended computation on the calling thread.
    pub(crate) fn resume(self, origin: ExecutorKind) {
        resume_task(&self.task, origin);
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("task_id", &self.task.id())
            .finish()
    }
}

/// Polls the task's future once and performs the requested handoff.
///
/// This is the trampoline every executor drain goes through. Panics raised by
/// the future are caught here and forwarded to the fault sink; the drain loop
/// that called us carries on with its next entry.
pub(crate) fn resume_task(task: &Arc<Task>, origin: ExecutorKind) {
    let Some(core) = task.core.upgrade() else {
        // Scheduler is gone; there is nothing left to resume into.
        return;
    };

    let mut future = {
        let mut slot = task.future.lock();
        match slot.take() {
            Some(future) => future,
            None => {
                core.record_fault(task.id(), origin, FaultKind::DoubleResume);
                return;
            }
        }
    };

    task.set_state(TaskState::Running);

    let (poll, transfer) = context::poll_scope(|| {
        catch_unwind(AssertUnwindSafe(|| {
            let mut cx = std::task::Context::from_waker(Waker::noop());
            future.as_mut().poll(&mut cx)
        }))
    });

    match poll {
        Ok(Poll::Ready(())) => {
            task.set_state(TaskState::Completed);
            core.note_completed(task.id());
        }
        Ok(Poll::Pending) => match transfer {
            Some(transfer) => {
                // Store the future back before the handoff: the target
                // executor may resume on another thread immediately.
                *task.future.lock() = Some(future);
                task.set_state(TaskState::Suspended);
                core.dispatch(transfer, Continuation::new(Arc::clone(task)));
            }
            None => {
                // Pending without a switch point means the task awaited a
                // foreign future; nothing will ever wake it.
                task.set_state(TaskState::Faulted);
                core.record_fault(task.id(), origin, FaultKind::Stalled);
            }
        },
        Err(payload) => {
            task.set_state(TaskState::Faulted);
            core.record_fault(
                task.id(),
                origin,
                FaultKind::Panic {
                    message: panic_message(payload.as_ref()),
                },
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoopHost;
    use crate::fault::DeadLetterSink;
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use std::sync::atomic::AtomicBool;

    struct NullHost;

    impl EventLoopHost for NullHost {
        fn notify_wake_pending(&self) {}
        fn request_redraw(&self, _region: Region) {}
    }

    fn test_scheduler() -> (Scheduler, Arc<DeadLetterSink>) {
        let sink = Arc::new(DeadLetterSink::default());
        let scheduler = Scheduler::with_config_and_sink(
            Arc::new(NullHost),
            SchedulerConfig::default(),
            sink.clone(),
        );
        (scheduler, sink)
    }

    #[test]
    fn test_task_id_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_spawn_runs_to_completion_inline() {
        let (scheduler, _sink) = test_scheduler();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let id = scheduler
            .spawn(async move {
                flag.store(true, Ordering::Release);
            })
            .expect("spawn failed");

        // No suspension points: the task finished before spawn returned.
        assert!(ran.load(Ordering::Acquire));
        assert_eq!(scheduler.task_state(id), Some(TaskState::Completed));
    }

    #[test]
    fn test_panic_during_resume_is_recorded() {
        let (scheduler, sink) = test_scheduler();

        let id = scheduler
            .spawn(async {
                panic!("boom");
            })
            .expect("spawn failed");

        assert_eq!(scheduler.task_state(id), Some(TaskState::Faulted));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task, id);
        assert!(matches!(
            &records[0].kind,
            FaultKind::Panic { message } if message == "boom"
        ));
    }

    #[test]
    fn test_pending_without_switch_is_stalled() {
        let (scheduler, sink) = test_scheduler();

        let id = scheduler
            .spawn(async {
                std::future::pending::<()>().await;
            })
            .expect("spawn failed");

        assert_eq!(scheduler.task_state(id), Some(TaskState::Faulted));
        assert!(matches!(sink.records()[0].kind, FaultKind::Stalled));
    }

    #[test]
    fn test_second_resume_is_rejected() {
        let (scheduler, sink) = test_scheduler();

        let task = Arc::new(Task::new(
            Box::pin(async {}),
            Arc::downgrade(scheduler.core()),
        ));

        resume_task(&task, ExecutorKind::Spawn);
        assert_eq!(task.state(), TaskState::Completed);

        // The future slot is empty now; a stray second resume is reported
        // instead of polling anything.
        resume_task(&task, ExecutorKind::Spawn);
        assert!(matches!(sink.records()[0].kind, FaultKind::DoubleResume));
    }

    #[test]
    fn test_resume_after_scheduler_dropped_is_noop() {
        let (scheduler, _sink) = test_scheduler();
        let task = Arc::new(Task::new(
            Box::pin(async {}),
            Arc::downgrade(scheduler.core()),
        ));
        drop(scheduler);

        resume_task(&task, ExecutorKind::Spawn);
        assert_eq!(task.state(), TaskState::Created);
    }
}
