//! Scheduler object owning all queues and executor handles.
//!
//! Everything is explicitly constructed and explicitly owned: the worker,
//! the pool, the event loop, the task registry, and the fault sink live in
//! one shared core. Anything that creates switch primitives does so through
//! a [`SchedulerHandle`] cloned off this object; there are no ambient
//! singletons.

use crate::error::SchedError;
use crate::event_loop::{EventLoop, EventLoopHost, Region};
use crate::fault::{ExecutorKind, FaultKind, FaultRecord, FaultSink, LogFaultSink};
use crate::pool::ThreadPool;
use crate::switch::{SwitchToPaint, SwitchToPool, SwitchToTimer, SwitchToWake, SwitchToWorker};
use crate::task::{resume_task, Continuation, Task, TaskId, TaskState, Transfer};
use crate::worker::BackgroundWorker;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// What happens to continuations still queued on the worker when it is
/// canceled.
///
/// The source design left this undefined; it is surfaced here as an explicit
/// choice instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Drop them. Every drop is counted and reported to the fault sink.
    #[default]
    Discard,
    /// Resume the entries present at cancellation once before the worker
    /// exits. Anything they re-enqueue onto the canceled queue is dropped
    /// and reported.
    Drain,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
    /// Pool threads. 0 means one per CPU core.
    pub pool_threads: usize,
    /// Worker cancellation policy.
    pub cancel_policy: CancelPolicy,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total tasks spawned.
    pub tasks_spawned: u64,
    /// Tasks that ran to completion.
    pub tasks_completed: u64,
    /// Tasks terminated by a fault during resume.
    pub tasks_faulted: u64,
    /// Continuations dropped without resume (cancellation or shutdown).
    pub continuations_dropped: u64,
    /// Tasks currently created, running, or suspended.
    pub active_tasks: usize,
}

/// Shared state behind the scheduler and all its handles.
pub(crate) struct SchedCore {
    worker: BackgroundWorker,
    pool: ThreadPool,
    event_loop: EventLoop,
    tasks: RwLock<FxHashMap<TaskId, Arc<Task>>>,
    fault_sink: Arc<dyn FaultSink>,
    config: SchedulerConfig,
    tasks_spawned: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_faulted: AtomicU64,
    continuations_dropped: AtomicU64,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl SchedCore {
    fn new(
        host: Arc<dyn EventLoopHost>,
        config: SchedulerConfig,
        fault_sink: Arc<dyn FaultSink>,
    ) -> Self {
        Self {
            worker: BackgroundWorker::new(),
            pool: ThreadPool::new(config.pool_threads),
            event_loop: EventLoop::new(host),
            tasks: RwLock::new(FxHashMap::default()),
            fault_sink,
            config,
            tasks_spawned: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_faulted: AtomicU64::new(0),
            continuations_dropped: AtomicU64::new(0),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn worker(&self) -> &BackgroundWorker {
        &self.worker
    }

    pub(crate) fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.worker.start(self);
        self.pool.start();
    }

    fn spawn<F>(self: &Arc<Self>, future: F) -> Result<TaskId, SchedError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SchedError::ShutDown);
        }

        let task = Arc::new(Task::new(Box::pin(future), Arc::downgrade(self)));
        let id = task.id();
        self.tasks.write().insert(id, Arc::clone(&task));
        self.tasks_spawned.fetch_add(1, Ordering::Relaxed);

        // Root tasks start synchronously; the caller gets control back at
        // the task's first switch point.
        resume_task(&task, ExecutorKind::Spawn);
        Ok(id)
    }

    /// Perform the handoff a suspension point requested.
    pub(crate) fn dispatch(&self, transfer: Transfer, cont: Continuation) {
        let (kind, outcome) = match transfer {
            Transfer::Worker => (ExecutorKind::Worker, self.worker.push(cont)),
            Transfer::Pool => (ExecutorKind::Pool, self.pool.submit(cont)),
            Transfer::Wake => (ExecutorKind::Wake, self.event_loop.push_wake(cont)),
            Transfer::Timer => (ExecutorKind::Timer, self.event_loop.push_timer(cont)),
            Transfer::Paint { slot, region } => (
                ExecutorKind::Paint,
                self.event_loop.push_paint(cont, slot, region),
            ),
        };

        if let Err(cont) = outcome {
            self.record_fault(cont.task_id(), kind, FaultKind::Dropped);
        }
    }

    pub(crate) fn record_fault(&self, task: TaskId, executor: ExecutorKind, kind: FaultKind) {
        match kind {
            FaultKind::Panic { .. } | FaultKind::Stalled => {
                self.tasks_faulted.fetch_add(1, Ordering::Relaxed);
            }
            FaultKind::Dropped => {
                self.continuations_dropped.fetch_add(1, Ordering::Relaxed);
            }
            FaultKind::DoubleResume => {}
        }
        self.fault_sink.report(FaultRecord {
            task,
            executor,
            kind,
        });
    }

    pub(crate) fn note_completed(&self, _task: TaskId) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Deal with continuations left on the worker queue after cancellation.
    ///
    /// Runs on the worker thread right before it exits; also invoked from
    /// shutdown to cover the case where the worker never started.
    pub(crate) fn apply_cancel_policy(&self) {
        match self.config.cancel_policy {
            CancelPolicy::Drain => {
                while let Some(cont) = self.worker.queue().try_pop() {
                    cont.resume(ExecutorKind::Worker);
                }
            }
            CancelPolicy::Discard => {
                for cont in self.worker.queue().take_remaining() {
                    self.record_fault(cont.task_id(), ExecutorKind::Worker, FaultKind::Dropped);
                }
            }
        }
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.worker.cancel();
        for (executor, task) in self.event_loop.shutdown() {
            self.record_fault(task, executor, FaultKind::Dropped);
        }

        // Pool threads drain in-flight work before observing the closed
        // channel; hops they dispatch from here on are rejected and
        // reported.
        self.pool.shutdown();
        self.worker.join();
        self.apply_cancel_policy();
    }

    fn stats(&self) -> SchedulerStats {
        let tasks = self.tasks.read();
        let active_tasks = tasks
            .values()
            .filter(|task| {
                matches!(
                    task.state(),
                    TaskState::Created | TaskState::Running | TaskState::Suspended
                )
            })
            .count();

        SchedulerStats {
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_faulted: self.tasks_faulted.load(Ordering::Relaxed),
            continuations_dropped: self.continuations_dropped.load(Ordering::Relaxed),
            active_tasks,
        }
    }
}

/// The scheduler: dedicated worker thread, ambient pool, and trigger-driven
/// event loop behind one explicitly constructed object.
pub struct Scheduler {
    core: Arc<SchedCore>,
}

impl Scheduler {
    /// Create a scheduler with default configuration and the logging fault
    /// sink.
    pub fn new(host: Arc<dyn EventLoopHost>) -> Self {
        Self::with_config(host, SchedulerConfig::default())
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(host: Arc<dyn EventLoopHost>, config: SchedulerConfig) -> Self {
        Self::with_config_and_sink(host, config, Arc::new(LogFaultSink))
    }

    /// Create a scheduler with a custom configuration and fault sink.
    pub fn with_config_and_sink(
        host: Arc<dyn EventLoopHost>,
        config: SchedulerConfig,
        fault_sink: Arc<dyn FaultSink>,
    ) -> Self {
        Self {
            core: Arc::new(SchedCore::new(host, config, fault_sink)),
        }
    }

    /// Start the worker and pool threads. Idempotent.
    ///
    /// Tasks may be spawned before this call; their continuations wait on
    /// the queues until the executors come up.
    pub fn start(&self) {
        self.core.start();
    }

    /// Check whether the executors have been started.
    pub fn is_started(&self) -> bool {
        self.core.started.load(Ordering::Acquire)
    }

    /// Spawn a root task. It runs synchronously on the calling thread until
    /// its first switch point; there is no completion signal.
    pub fn spawn<F>(&self, future: F) -> Result<TaskId, SchedError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.core.spawn(future)
    }

    /// Get a cloneable handle for spawning and for creating switch
    /// primitives inside tasks.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// The trigger-driven executor the host drives.
    pub fn event_loop(&self) -> &EventLoop {
        self.core.event_loop()
    }

    /// Look up the state of a task.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.core.tasks.read().get(&id).map(|task| task.state())
    }

    /// Number of tasks in the registry, finished ones included.
    pub fn task_count(&self) -> usize {
        self.core.tasks.read().len()
    }

    /// Remove a task from the registry.
    pub fn remove_task(&self, id: TaskId) -> Option<Arc<Task>> {
        self.core.tasks.write().remove(&id)
    }

    /// Get scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.core.stats()
    }

    /// Tear down: cancel the worker (applying the cancel policy), stop the
    /// pool, and stop accepting event-loop triggers. Idempotent. No resume
    /// happens after this returns, apart from what the `Drain` policy runs
    /// during the call.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<SchedCore> {
        &self.core
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable handle for use inside tasks: spawning and switch primitives.
#[derive(Clone)]
pub struct SchedulerHandle {
    core: Arc<SchedCore>,
}

impl SchedulerHandle {
    /// Spawn a root task. Same contract as [`Scheduler::spawn`].
    pub fn spawn<F>(&self, future: F) -> Result<TaskId, SchedError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.core.spawn(future)
    }

    /// Suspension point: continue on the dedicated worker thread.
    pub fn to_worker(&self) -> SwitchToWorker {
        SwitchToWorker::new()
    }

    /// Suspension point: continue on the ambient thread pool.
    pub fn to_pool(&self) -> SwitchToPool {
        SwitchToPool::new()
    }

    /// Suspension point: continue on the event-loop thread at the next wake.
    pub fn to_wake(&self) -> SwitchToWake {
        SwitchToWake::new()
    }

    /// Suspension point: continue on the event-loop thread at the next
    /// timer tick.
    pub fn to_timer(&self) -> SwitchToTimer {
        SwitchToTimer::new()
    }

    /// Suspension point: request a redraw for `region` and continue on the
    /// event-loop thread when the host grants a drawing context.
    pub fn to_paint(&self, region: Region) -> SwitchToPaint {
        SwitchToPaint::new(region)
    }

    /// Get scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.core.stats()
    }
}
