//! Switch primitives: one-shot suspension points that transfer a task
//! between executors.
//!
//! Every switch unconditionally suspends, even when the task already runs on
//! the target context. The first poll records the transfer for the
//! trampoline; the second poll, which happens on the target executor,
//! produces the resume value.

use crate::context;
use crate::event_loop::{PaintContext, PaintSlot, Region};
use crate::task::Transfer;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Suspends the task and re-enqueues it on the dedicated worker thread.
#[must_use = "switch futures do nothing unless awaited"]
pub struct SwitchToWorker {
    queued: bool,
}

impl SwitchToWorker {
    pub(crate) fn new() -> Self {
        Self { queued: false }
    }
}

impl Future for SwitchToWorker {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.queued {
            return Poll::Ready(());
        }
        self.queued = true;
        context::request_transfer(Transfer::Worker);
        Poll::Pending
    }
}

/// Suspends the task and submits it to the ambient thread pool.
#[must_use = "switch futures do nothing unless awaited"]
pub struct SwitchToPool {
    queued: bool,
}

impl SwitchToPool {
    pub(crate) fn new() -> Self {
        Self { queued: false }
    }
}

impl Future for SwitchToPool {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.queued {
            return Poll::Ready(());
        }
        self.queued = true;
        context::request_transfer(Transfer::Pool);
        Poll::Pending
    }
}

/// Suspends the task and parks it on the event loop's wake queue. The host
/// is notified that work is pending.
#[must_use = "switch futures do nothing unless awaited"]
pub struct SwitchToWake {
    queued: bool,
}

impl SwitchToWake {
    pub(crate) fn new() -> Self {
        Self { queued: false }
    }
}

impl Future for SwitchToWake {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.queued {
            return Poll::Ready(());
        }
        self.queued = true;
        context::request_transfer(Transfer::Wake);
        Poll::Pending
    }
}

/// Suspends the task until the next timer tick. No notification is sent;
/// the host already polls on a fixed period.
#[must_use = "switch futures do nothing unless awaited"]
pub struct SwitchToTimer {
    queued: bool,
}

impl SwitchToTimer {
    pub(crate) fn new() -> Self {
        Self { queued: false }
    }
}

impl Future for SwitchToTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.queued {
            return Poll::Ready(());
        }
        self.queued = true;
        context::request_transfer(Transfer::Timer);
        Poll::Pending
    }
}

/// Suspends the task until the host grants a redraw, then resolves to the
/// drawing context for that paint cycle.
///
/// The context is delivered through a slot written by the paint drain right
/// before the resume and taken here; it must not be retained past the
/// synchronous resume it belongs to.
#[must_use = "switch futures do nothing unless awaited"]
pub struct SwitchToPaint {
    region: Region,
    slot: Option<Arc<PaintSlot>>,
    queued: bool,
}

impl SwitchToPaint {
    pub(crate) fn new(region: Region) -> Self {
        Self {
            region,
            slot: None,
            queued: false,
        }
    }
}

impl Future for SwitchToPaint {
    type Output = PaintContext;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<PaintContext> {
        if !self.queued {
            self.queued = true;
            let slot = Arc::new(Mutex::new(None));
            self.slot = Some(Arc::clone(&slot));
            context::request_transfer(Transfer::Paint {
                slot,
                region: self.region,
            });
            return Poll::Pending;
        }

        let slot = self
            .slot
            .take()
            .expect("paint switch polled again after completion");
        let ctx = slot
            .lock()
            .take()
            .expect("paint context missing at resume");
        Poll::Ready(ctx)
    }
}
