//! # Example: graceful_ticker
//!
//! Runs one worker inside an existing runtime and stops it from a timer
//! instead of an OS signal.
//!
//! Shows how to:
//! - Drive the lifecycle with [`Worker::serve_until`]
//! - Watch state transitions with [`Worker::watch_state`]
//! - See a cooperative task unwind and a stubborn one get aborted after the grace period
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► serve_until(info, sleep(2s) → SIGINT)
//!   │     ├─► on_start, schedule "ticker" and "stubborn" ─► Running
//!   │     └─► SIGINT == graceful_signal
//!   │           ├─► on_stop
//!   │           ├─► cancel "ticker", "stubborn"      (CancelRequested × 2)
//!   │           └─► grace 300ms ─► "stubborn" still alive ─► GraceExceeded, aborted
//!   └─► state == Stopped
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example graceful_ticker
//! ```

use std::{sync::Arc, time::Duration};

use procvisor::{
    Event, LogWriter, ProcessInfo, Signal, Subscribe, TaskContext, TaskFn, TaskRef, Worker,
};

struct Printer;

#[async_trait::async_trait]
impl Subscribe for Printer {
    async fn on_event(&self, e: &Event) {
        println!(
            "[seq={:>3}] {:?} task={} reason={}",
            e.seq,
            e.kind,
            e.task.as_deref().unwrap_or("-"),
            e.reason.as_deref().unwrap_or("-"),
        );
    }

    fn name(&self) -> &'static str {
        "printer"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("=== graceful_ticker example ===\n");

    let ticker: TaskRef = TaskFn::arc("ticker", |ctx: TaskContext| async move {
        let mut n = 0u32;
        while !ctx.is_cancelled() {
            n += 1;
            println!("tick {n}");
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        Ok(())
    });

    // Ignores its token; only the post-grace abort ends it.
    let stubborn: TaskRef = TaskFn::arc("stubborn", |_ctx: TaskContext| async move {
        std::future::pending::<()>().await;
        Ok(())
    });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Printer), Arc::new(LogWriter::new())];
    let worker = Worker::builder(vec![ticker, stubborn])
        .with_grace(Duration::from_millis(300))
        .with_subscribers(subs)
        .build();

    let mut state = worker.watch_state();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            println!(">>> state: {}", *state.borrow_and_update());
        }
    });

    worker
        .serve_until(ProcessInfo::current(), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Signal::SIGINT
        })
        .await?;

    println!("\nfinal state: {}", worker.state());
    drop(worker);
    let _ = watcher.await;
    Ok(())
}
