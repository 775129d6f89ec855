//! End-to-end scenarios exercising the scheduler through its public surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use weft_sched::{
    CancelPolicy, DeadLetterSink, EventLoopHost, FaultKind, PaintContext, Region, Scheduler,
    SchedulerConfig, TaskState,
};

#[derive(Default)]
struct RecordingHost {
    wakes: AtomicUsize,
    redraws: Mutex<Vec<Region>>,
}

impl EventLoopHost for RecordingHost {
    fn notify_wake_pending(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    fn request_redraw(&self, region: Region) {
        self.redraws.lock().push(region);
    }
}

fn scheduler_with_sink(
    config: SchedulerConfig,
) -> (Scheduler, Arc<RecordingHost>, Arc<DeadLetterSink>) {
    let host = Arc::new(RecordingHost::default());
    let sink = Arc::new(DeadLetterSink::new());
    let scheduler = Scheduler::with_config_and_sink(host.clone(), config, sink.clone());
    (scheduler, host, sink)
}

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A continuation enqueued on the wake queue from another thread resumes
/// exactly once, on the thread that drives the event loop.
#[test]
fn wake_delivery_on_event_loop_thread() {
    let (scheduler, host, _sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let resumes = Arc::new(AtomicUsize::new(0));
    let resumed_on = Arc::new(Mutex::new(None));

    let spawner = {
        let resumes = resumes.clone();
        let resumed_on = resumed_on.clone();
        thread::spawn(move || {
            let switch_handle = handle.clone();
            handle
                .spawn(async move {
                    switch_handle.to_wake().await;
                    resumes.fetch_add(1, Ordering::SeqCst);
                    *resumed_on.lock() = Some(thread::current().id());
                })
                .expect("spawn failed");
        })
    };
    spawner.join().unwrap();

    // The push already asked the host for a wake callback.
    assert!(host.wakes.load(Ordering::SeqCst) >= 1);

    // This thread plays the event-loop thread.
    scheduler.event_loop().on_wake();
    assert_eq!(resumes.load(Ordering::SeqCst), 1);
    assert_eq!(*resumed_on.lock(), Some(thread::current().id()));

    // No continuation is ever resumed a second time.
    scheduler.event_loop().on_wake();
    assert_eq!(resumes.load(Ordering::SeqCst), 1);

    scheduler.shutdown();
}

/// Continuations enqueued before the worker starts resume in FIFO order
/// once it does, with no extra resume.
#[test]
fn worker_fifo_with_deferred_start() {
    let (scheduler, _host, _sink) = scheduler_with_sink(SchedulerConfig::default());
    let handle = scheduler.handle();

    let order = Arc::new(Mutex::new(Vec::new()));
    let resumes = Arc::new(AtomicUsize::new(0));

    for name in ["c2", "c3"] {
        let handle = handle.clone();
        let order = order.clone();
        let resumes = resumes.clone();
        scheduler
            .spawn(async move {
                handle.to_worker().await;
                order.lock().push(name);
                resumes.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn failed");
    }

    scheduler.start();

    assert!(wait_until(Duration::from_secs(2), || {
        resumes.load(Ordering::SeqCst) == 2
    }));
    assert_eq!(*order.lock(), vec!["c2", "c3"]);

    // Settle, then confirm there was no third resume.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(resumes.load(Ordering::SeqCst), 2);

    scheduler.shutdown();
}

/// After shutdown cancels the worker, a hop dispatched from a still-running
/// pool task is dropped and reported; the continuation never resumes.
#[test]
fn post_cancel_enqueue_is_dropped() {
    let (scheduler, _host, sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let reached_worker = Arc::new(AtomicUsize::new(0));
    let counter = reached_worker.clone();
    let id = scheduler
        .spawn(async move {
            handle.to_pool().await;
            // Keep the pool busy past the moment shutdown cancels the
            // worker.
            thread::sleep(Duration::from_millis(150));
            handle.to_worker().await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");

    // Let the task reach the pool sleep, then tear down. Shutdown joins the
    // pool, so the doomed worker hop happens before it returns.
    thread::sleep(Duration::from_millis(30));
    scheduler.shutdown();

    assert_eq!(reached_worker.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.task_state(id), Some(TaskState::Suspended));
    assert!(sink
        .records()
        .iter()
        .any(|r| r.task == id && matches!(r.kind, FaultKind::Dropped)));
}

/// All continuations present at a tick resume on that tick, in enqueue
/// order; one enqueued while the tick drains waits for the next tick.
#[test]
fn timer_cadence() {
    let (scheduler, _host, _sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let handle = handle.clone();
        let order = order.clone();
        scheduler
            .spawn(async move {
                handle.to_timer().await;
                order.lock().push(i);
                // Back onto the queue currently being drained.
                handle.to_timer().await;
                order.lock().push(i + 10);
            })
            .expect("spawn failed");
    }

    scheduler.event_loop().on_timer_tick();
    assert_eq!(*order.lock(), vec![0, 1, 2]);

    scheduler.event_loop().on_timer_tick();
    assert_eq!(*order.lock(), vec![0, 1, 2, 10, 11, 12]);

    scheduler.shutdown();
}

/// A wake continuation that enqueues another wake continuation mid-drain
/// sees it run in the same drain pass.
#[test]
fn reentrant_wake_drain() {
    let (scheduler, _host, _sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let stages = Arc::new(AtomicUsize::new(0));
    let counter = stages.clone();
    let inner_handle = handle.clone();
    scheduler
        .spawn(async move {
            handle.to_wake().await;
            counter.fetch_add(1, Ordering::SeqCst);
            let inner_counter = counter.clone();
            let spawn_handle = inner_handle.clone();
            inner_handle
                .spawn(async move {
                    spawn_handle.to_wake().await;
                    inner_counter.fetch_add(1, Ordering::SeqCst);
                })
                .expect("inner spawn failed");
        })
        .expect("spawn failed");

    // One trigger suffices for both the original and the one it enqueued.
    scheduler.event_loop().on_wake();
    assert_eq!(stages.load(Ordering::SeqCst), 2);

    scheduler.shutdown();
}

/// Paint continuations observe the drawing context of their own cycle only.
#[test]
fn paint_payload_scoping() {
    let (scheduler, host, _sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let frames = Arc::new(Mutex::new(Vec::new()));
    let region = Region::new(0, 0, 100, 20);
    for _ in 0..2 {
        let handle = handle.clone();
        let frames = frames.clone();
        scheduler
            .spawn(async move {
                let first = handle.to_paint(region).await;
                frames.lock().push(first.frame());
                let second = handle.to_paint(region).await;
                frames.lock().push(second.frame());
            })
            .expect("spawn failed");
    }

    assert_eq!(host.redraws.lock().len(), 2);

    scheduler
        .event_loop()
        .on_paint_request(PaintContext::new(1, region));
    scheduler
        .event_loop()
        .on_paint_request(PaintContext::new(2, region));

    // Both tasks saw frame 1 in the first cycle and frame 2 in the second;
    // nothing cached a context across cycles.
    let mut seen = frames.lock().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 1, 2, 2]);

    scheduler.shutdown();
}

/// A panic inside one continuation is recorded and does not disturb the
/// rest of the drain pass.
#[test]
fn fault_isolation_in_drain() {
    let (scheduler, _host, sink) = scheduler_with_sink(SchedulerConfig::default());
    scheduler.start();
    let handle = scheduler.handle();

    let faulty = {
        let handle = handle.clone();
        scheduler
            .spawn(async move {
                handle.to_wake().await;
                panic!("deliberate fault");
            })
            .expect("spawn failed")
    };

    let survivor_ran = Arc::new(AtomicUsize::new(0));
    let counter = survivor_ran.clone();
    scheduler
        .spawn(async move {
            handle.to_wake().await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn failed");

    scheduler.event_loop().on_wake();

    assert_eq!(survivor_ran.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.task_state(faulty), Some(TaskState::Faulted));
    assert!(sink.records().iter().any(|r| {
        r.task == faulty
            && matches!(&r.kind, FaultKind::Panic { message } if message == "deliberate fault")
    }));
    assert_eq!(scheduler.stats().tasks_faulted, 1);

    scheduler.shutdown();
}

/// The drain policy resumes worker leftovers once instead of dropping them.
#[test]
fn drain_policy_runs_leftovers() {
    let config = SchedulerConfig {
        cancel_policy: CancelPolicy::Drain,
        ..SchedulerConfig::default()
    };
    let (scheduler, _host, sink) = scheduler_with_sink(config);
    let handle = scheduler.handle();

    let resumed = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let handle = handle.clone();
        let resumed = resumed.clone();
        scheduler
            .spawn(async move {
                handle.to_worker().await;
                resumed.fetch_add(1, Ordering::SeqCst);
            })
            .expect("spawn failed");
    }

    // Worker never started; shutdown applies the drain policy inline.
    scheduler.shutdown();

    assert_eq!(resumed.load(Ordering::SeqCst), 2);
    assert!(sink.records().is_empty());
}
