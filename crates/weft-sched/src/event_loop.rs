//! Event-loop executor: wake, timer, and paint triggers.
//!
//! This executor has no thread of its own. Producers enqueue from anywhere;
//! draining happens only when the host calls one of the trigger handlers
//! from its single event-loop thread. The queue lock is released around
//! every resume, so resumed code can enqueue more work, including onto the
//! queue currently being drained.

use crate::fault::ExecutorKind;
use crate::task::{Continuation, TaskId};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// Rectangular region a redraw is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in device units.
    pub width: u32,
    /// Height in device units.
    pub height: u32,
}

impl Region {
    /// Create a region.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Drawing context granted by the host for one paint cycle.
///
/// Delivered to a paint-resumed continuation through its per-resume slot.
/// Valid only for the duration of that synchronous resume; the frame number
/// distinguishes paint cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintContext {
    frame: u64,
    region: Region,
}

impl PaintContext {
    /// Create a context for one paint cycle. The host owns the frame
    /// numbering and the begin/end bracketing around the trigger call.
    pub fn new(frame: u64, region: Region) -> Self {
        Self { frame, region }
    }

    /// Paint cycle this context belongs to.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Region being painted.
    pub fn region(&self) -> Region {
        self.region
    }
}

/// Per-continuation output slot for the paint drain.
pub(crate) type PaintSlot = Mutex<Option<PaintContext>>;

/// What the scheduler needs from the host event loop.
///
/// Implementations must tolerate calls from any executor thread.
pub trait EventLoopHost: Send + Sync {
    /// Ask the host to call [`EventLoop::on_wake`] soon.
    fn notify_wake_pending(&self);

    /// Ask the host to eventually grant a drawing context and call
    /// [`EventLoop::on_paint_request`] for `region`.
    fn request_redraw(&self, region: Region);
}

struct PaintEntry {
    cont: Continuation,
    slot: Arc<PaintSlot>,
    region: Region,
}

/// The three trigger queues share one lock. All of them are drained on the
/// same thread, so contention is between producers only.
struct TriggerQueues {
    wake: VecDeque<Continuation>,
    timer: VecDeque<Continuation>,
    paint: VecDeque<PaintEntry>,
}

/// Trigger-driven executor owned by the host's event-loop thread.
pub struct EventLoop {
    queues: Mutex<TriggerQueues>,
    host: Arc<dyn EventLoopHost>,
    shut_down: AtomicBool,
    owner: OnceCell<ThreadId>,
}

impl EventLoop {
    pub(crate) fn new(host: Arc<dyn EventLoopHost>) -> Self {
        Self {
            queues: Mutex::new(TriggerQueues {
                wake: VecDeque::new(),
                timer: VecDeque::new(),
                paint: VecDeque::new(),
            }),
            host,
            shut_down: AtomicBool::new(false),
            owner: OnceCell::new(),
        }
    }

    /// Enqueue on the wake queue and ask the host for a wake callback.
    pub(crate) fn push_wake(&self, cont: Continuation) -> Result<(), Continuation> {
        {
            let mut queues = self.queues.lock();
            if self.shut_down.load(Ordering::Acquire) {
                return Err(cont);
            }
            queues.wake.push_back(cont);
        }
        self.host.notify_wake_pending();
        Ok(())
    }

    /// Enqueue on the timer queue. No notification: the host polls on its
    /// own fixed period.
    pub(crate) fn push_timer(&self, cont: Continuation) -> Result<(), Continuation> {
        let mut queues = self.queues.lock();
        if self.shut_down.load(Ordering::Acquire) {
            return Err(cont);
        }
        queues.timer.push_back(cont);
        Ok(())
    }

    /// Enqueue on the paint queue and ask the host for a redraw.
    pub(crate) fn push_paint(
        &self,
        cont: Continuation,
        slot: Arc<PaintSlot>,
        region: Region,
    ) -> Result<(), Continuation> {
        {
            let mut queues = self.queues.lock();
            if self.shut_down.load(Ordering::Acquire) {
                return Err(cont);
            }
            queues.paint.push_back(PaintEntry { cont, slot, region });
        }
        self.host.request_redraw(region);
        Ok(())
    }

    /// Host-invoked: a generic wake was signaled. Drains the wake queue to
    /// empty, so entries enqueued by the resumed code run in this same pass.
    pub fn on_wake(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.check_owner();

        let mut queues = self.queues.lock();
        while let Some(cont) = queues.wake.pop_front() {
            MutexGuard::unlocked(&mut queues, || cont.resume(ExecutorKind::Wake));
        }
    }

    /// Host-invoked: the periodic timer fired. Drains the entries present
    /// at invocation; anything enqueued while draining waits for the next
    /// tick. Rearming is the host's job.
    pub fn on_timer_tick(&self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.check_owner();

        let mut queues = self.queues.lock();
        let pending = queues.timer.len();
        for _ in 0..pending {
            let Some(cont) = queues.timer.pop_front() else {
                break;
            };
            MutexGuard::unlocked(&mut queues, || cont.resume(ExecutorKind::Timer));
        }
    }

    /// Host-invoked: a redraw was granted. For each entry present at
    /// invocation, stores the drawing context in the entry's slot right
    /// before resuming it; a redraw requested by the resumed code belongs to
    /// the next paint cycle.
    pub fn on_paint_request(&self, ctx: PaintContext) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        self.check_owner();

        let mut queues = self.queues.lock();
        let pending = queues.paint.len();
        for _ in 0..pending {
            let Some(PaintEntry { cont, slot, region }) = queues.paint.pop_front() else {
                break;
            };
            *slot.lock() = Some(PaintContext::new(ctx.frame(), region));
            MutexGuard::unlocked(&mut queues, || cont.resume(ExecutorKind::Paint));
        }
    }

    /// Stop accepting triggers and pushes. Returns the tasks whose queued
    /// continuations were dropped, so the caller can report them.
    pub(crate) fn shutdown(&self) -> Vec<(ExecutorKind, TaskId)> {
        let mut queues = self.queues.lock();
        self.shut_down.store(true, Ordering::Release);

        let mut dropped = Vec::new();
        for cont in queues.wake.drain(..) {
            dropped.push((ExecutorKind::Wake, cont.task_id()));
        }
        for cont in queues.timer.drain(..) {
            dropped.push((ExecutorKind::Timer, cont.task_id()));
        }
        for entry in queues.paint.drain(..) {
            dropped.push((ExecutorKind::Paint, entry.cont.task_id()));
        }
        dropped
    }

    /// All drains must come from the host's single event-loop thread.
    fn check_owner(&self) {
        let current = std::thread::current().id();
        let owner = *self.owner.get_or_init(|| current);
        debug_assert_eq!(
            owner, current,
            "event-loop triggers must all fire on the same thread"
        );
    }
}
