//! Thread-local poll scope for suspension-point handoff.
//!
//! While a task's future is being polled, the current thread carries a scope
//! that collects the transfer requested by a switch primitive. The trampoline
//! reads it back after the poll returns and performs the actual enqueue, so
//! the future is safely stored away before any other thread can resume it.

use crate::task::Transfer;
use std::cell::RefCell;

struct PollScope {
    transfer: Option<Transfer>,
}

thread_local! {
    /// Scope of the innermost task poll running on this thread, if any.
    ///
    /// Saved and restored around every poll so that a task spawning another
    /// task mid-poll (the inner task runs inline) does not clobber the outer
    /// scope.
    static SCOPE: RefCell<Option<PollScope>> = const { RefCell::new(None) };
}

/// Runs `poll` inside a fresh scope and returns its result together with the
/// transfer the future requested, if any.
pub(crate) fn poll_scope<R>(poll: impl FnOnce() -> R) -> (R, Option<Transfer>) {
    let previous = SCOPE.with(|scope| {
        scope
            .borrow_mut()
            .replace(PollScope { transfer: None })
    });

    // `poll` must not unwind: the trampoline wraps the actual future poll in
    // catch_unwind before entering the scope.
    let result = poll();

    let current = SCOPE.with(|scope| {
        let mut slot = scope.borrow_mut();
        let current = slot.take();
        *slot = previous;
        current
    });

    (result, current.and_then(|scope| scope.transfer))
}

/// Records the transfer for the task currently being polled on this thread.
///
/// Called by switch primitives from inside their first poll. Panics when no
/// task is being polled (the switch was awaited outside a scheduler task) or
/// when a transfer was already recorded in the same poll (the task tried to
/// suspend at two switch points at once).
pub(crate) fn request_transfer(transfer: Transfer) {
    SCOPE.with(|scope| {
        let mut slot = scope.borrow_mut();
        match slot.as_mut() {
            Some(scope) => {
                if scope.transfer.is_some() {
                    panic!("task requested two executor transfers in a single poll");
                }
                scope.transfer = Some(transfer);
            }
            None => panic!(
                "switch primitive awaited outside a scheduler task; \
                 spawn the computation through a Scheduler first"
            ),
        }
    });
}
