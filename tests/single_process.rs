//! One worker in the test process itself, stopped by a real SIGINT.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use procvisor::{TaskContext, TaskFn, TaskRef, Worker, WorkerState};

#[test]
fn counting_task_runs_until_the_graceful_signal() {
    let counter = Arc::new(AtomicU64::new(0));
    let c = Arc::clone(&counter);
    let task: TaskRef = TaskFn::arc("counter", move |ctx: TaskContext| {
        let c = Arc::clone(&c);
        async move {
            while !ctx.is_cancelled() {
                c.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }
            Ok(())
        }
    });

    let worker = Worker::new(vec![task], None);
    let observer = Arc::clone(&worker);
    let signaller = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while observer.state() != WorkerState::Running {
            assert!(Instant::now() < deadline, "worker never reached Running");
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        kill(Pid::this(), Signal::SIGINT).unwrap();
    });

    worker.run(1).unwrap();
    signaller.join().unwrap();

    assert!(counter.load(Ordering::Relaxed) > 0);
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.scheduled_count(), 1);
    assert!(worker.listener_addr().is_none());
}
