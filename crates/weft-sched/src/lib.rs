//! Weft Scheduler
//!
//! A cooperative multi-executor scheduler for suspendable computations.
//! A logical task is written as ordinary sequential `async` code; at each
//! switch primitive it suspends, its continuation is enqueued on the target
//! executor, and it resumes there exactly once:
//!
//! - **Worker**: a dedicated thread draining a blocking FIFO (`to_worker`)
//! - **Pool**: an ambient thread pool for fire-and-forget work (`to_pool`)
//! - **Event loop**: the host's single thread, drained on external triggers
//!   only (`to_wake`, `to_timer`, `to_paint`)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_sched::{EventLoopHost, Region, Scheduler};
//!
//! let scheduler = Scheduler::new(Arc::new(MyHost::new()));
//! scheduler.start();
//!
//! let sched = scheduler.handle();
//! scheduler.spawn(async move {
//!     // runs on the spawning thread up to here
//!     sched.to_pool().await;
//!     // now on a pool thread; do the blocking part
//!     sched.to_wake().await;
//!     // back on the event-loop thread once the host calls on_wake()
//! });
//!
//! // The host wires its own events to the trigger handlers:
//! // scheduler.event_loop().on_wake();
//! // scheduler.event_loop().on_timer_tick();
//! // scheduler.event_loop().on_paint_request(ctx);
//!
//! scheduler.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod context;
mod error;
mod event_loop;
mod fault;
mod pool;
mod queue;
mod scheduler;
mod switch;
mod task;
mod worker;

pub use error::SchedError;
pub use event_loop::{EventLoop, EventLoopHost, PaintContext, Region};
pub use fault::{DeadLetterSink, ExecutorKind, FaultKind, FaultRecord, FaultSink, LogFaultSink};
pub use scheduler::{CancelPolicy, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats};
pub use switch::{SwitchToPaint, SwitchToPool, SwitchToTimer, SwitchToWake, SwitchToWorker};
pub use task::{Continuation, Task, TaskId, TaskState};
