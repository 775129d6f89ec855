//! Headless host simulation for the weft scheduler.
//!
//! Plays the role of the GUI shell: a single-threaded message loop receives
//! wake notifications and redraw requests over a channel, rearms a periodic
//! timer, and grants drawing contexts. Three root tasks exercise the
//! executors the way a small dialog would: a one-shot query, a counter, and
//! a perpetual blinker.

use clap::Parser;
use crossbeam::channel::{tick, unbounded, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use weft_sched::{
    CancelPolicy, EventLoopHost, PaintContext, Region, Scheduler, SchedulerConfig, SchedulerHandle,
};

#[derive(Parser)]
#[command(name = "weft-demo")]
#[command(about = "Headless host event loop driving the weft scheduler", long_about = None)]
#[command(version)]
struct Args {
    /// How long to run the host loop, in milliseconds
    #[arg(long, default_value_t = 5000)]
    duration_ms: u64,

    /// Timer period, in milliseconds
    #[arg(long, default_value_t = 1000)]
    timer_period_ms: u64,

    /// Pool threads (0 = one per CPU core)
    #[arg(long, default_value_t = 0)]
    pool_threads: usize,

    /// Resume worker leftovers on shutdown instead of discarding them
    #[arg(long)]
    drain_on_cancel: bool,
}

/// Events the host loop reacts to, standing in for window messages.
enum HostEvent {
    Wake,
    Redraw(Region),
}

/// Host side of the scheduler contract: forwards notifications into the
/// message channel the main loop drains.
struct ChannelHost {
    events: Sender<HostEvent>,
}

impl EventLoopHost for ChannelHost {
    fn notify_wake_pending(&self) {
        let _ = self.events.send(HostEvent::Wake);
    }

    fn request_redraw(&self, region: Region) {
        let _ = self.events.send(HostEvent::Redraw(region));
    }
}

/// Stand-in for the widgets the tasks would update.
#[derive(Default)]
struct Ui {
    query_busy: AtomicBool,
    counter_busy: AtomicBool,
    counter: AtomicU64,
    blink_on: AtomicBool,
}

/// One-shot query: blocking work on the pool, result applied on the
/// event-loop thread.
async fn query(sched: SchedulerHandle, ui: Arc<Ui>) {
    ui.query_busy.store(true, Ordering::Release);
    tracing::info!("query: working...");

    sched.to_pool().await;
    // The blocking part, safely off the owner thread.
    thread::sleep(Duration::from_millis(1000));

    sched.to_wake().await;
    ui.query_busy.store(false, Ordering::Release);
    tracing::info!("query: done");
}

/// Counter: kicks off a nested query, then publishes ten values, each one
/// computed on the pool and applied on the event-loop thread.
async fn counter(sched: SchedulerHandle, ui: Arc<Ui>) {
    let _ = sched.spawn(query(sched.clone(), Arc::clone(&ui)));

    ui.counter_busy.store(true, Ordering::Release);
    for i in 0..10 {
        sched.to_pool().await;
        sched.to_wake().await;
        ui.counter.store(i, Ordering::Release);
        tracing::info!("counter: {}", i);
    }
    ui.counter_busy.store(false, Ordering::Release);
}

/// Perpetual blinker: waits for the timer, requests a redraw, draws when
/// the context arrives, and starts over. Never terminates.
async fn blinker(sched: SchedulerHandle, ui: Arc<Ui>) {
    let region = Region::new(0, 0, 64, 16);
    loop {
        sched.to_timer().await;
        let ctx = sched.to_paint(region).await;
        let on = !ui.blink_on.load(Ordering::Acquire);
        ui.blink_on.store(on, Ordering::Release);
        tracing::info!(
            "blinker: frame {} -> {}",
            ctx.frame(),
            if on { "on" } else { "off" }
        );
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (events_tx, events_rx) = unbounded();
    let host = Arc::new(ChannelHost { events: events_tx });

    let config = SchedulerConfig {
        pool_threads: args.pool_threads,
        cancel_policy: if args.drain_on_cancel {
            CancelPolicy::Drain
        } else {
            CancelPolicy::Discard
        },
    };
    let scheduler = Scheduler::with_config(host, config);
    scheduler.start();

    let sched = scheduler.handle();
    let ui = Arc::new(Ui::default());

    // The "buttons" are pressed right at startup.
    scheduler
        .spawn(query(sched.clone(), Arc::clone(&ui)))
        .expect("spawn query");
    scheduler
        .spawn(counter(sched.clone(), Arc::clone(&ui)))
        .expect("spawn counter");
    scheduler
        .spawn(blinker(sched.clone(), Arc::clone(&ui)))
        .expect("spawn blinker");

    // The message loop. The ticker stands in for a self-rearming timer; a
    // redraw grants a fresh drawing context for exactly one paint cycle.
    let ticker = tick(Duration::from_millis(args.timer_period_ms));
    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    let mut frame: u64 = 0;

    while Instant::now() < deadline {
        crossbeam::select! {
            recv(events_rx) -> event => match event {
                Ok(HostEvent::Wake) => scheduler.event_loop().on_wake(),
                Ok(HostEvent::Redraw(region)) => {
                    frame += 1;
                    scheduler
                        .event_loop()
                        .on_paint_request(PaintContext::new(frame, region));
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => scheduler.event_loop().on_timer_tick(),
            default(Duration::from_millis(50)) => {}
        }
    }

    scheduler.shutdown();

    let stats = scheduler.stats();
    tracing::info!(
        "done: spawned {} completed {} faulted {} dropped {} active {}",
        stats.tasks_spawned,
        stats.tasks_completed,
        stats.tasks_faulted,
        stats.continuations_dropped,
        stats.active_tasks
    );
}
