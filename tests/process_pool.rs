//! Pools of the `procvisor` binary, driven through real signals.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Default)]
struct Outcome {
    running: HashSet<u32>,
    stopped: HashSet<u32>,
    on_stop: usize,
    success: bool,
}

fn pid_of(line: &str, prefix: &str) -> Option<u32> {
    line.strip_prefix(prefix)?.trim().parse().ok()
}

/// Starts a pool of `workers`, signals the parent once `ready` members report
/// `Running`, and collects everything printed until the pool exits.
async fn run_pool(workers: usize, ready: usize, signal: Signal) -> Outcome {
    let mut child = Command::new(env!("CARGO_BIN_EXE_procvisor"))
        .args(["--workers", &workers.to_string(), "--port", "0"])
        .args(["--heartbeat-ms", "20"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let mut out = Outcome::default();

    timeout(Duration::from_secs(20), async {
        while out.running.len() < ready {
            let line = lines.next_line().await.unwrap().expect("pool exited early");
            if let Some(pid) = pid_of(&line, "state=RUNNING pid=") {
                out.running.insert(pid);
            }
        }
    })
    .await
    .expect("members never reached Running");

    let parent = Pid::from_raw(child.id().unwrap() as i32);
    kill(parent, signal).unwrap();

    timeout(Duration::from_secs(20), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(pid) = pid_of(&line, "state=RUNNING pid=") {
                out.running.insert(pid);
            } else if let Some(pid) = pid_of(&line, "state=STOPPED pid=") {
                out.stopped.insert(pid);
            } else if line.starts_with("on_stop pid=") {
                out.on_stop += 1;
            }
        }
        out.success = child.wait().await.unwrap().success();
    })
    .await
    .expect("pool did not shut down, or a member outlived it");

    out
}

#[tokio::test]
async fn forced_signal_stops_every_member_without_on_stop() {
    let out = run_pool(4, 4, Signal::SIGTERM).await;

    assert_eq!(out.running.len(), 4);
    assert_eq!(out.stopped, out.running);
    assert_eq!(out.on_stop, 0);
    assert!(out.success);
    for pid in &out.running {
        assert!(kill(Pid::from_raw(*pid as i32), None).is_err());
    }
}

#[tokio::test]
async fn graceful_signal_runs_on_stop_in_every_member() {
    let out = run_pool(4, 4, Signal::SIGINT).await;

    assert_eq!(out.running.len(), 4);
    assert_eq!(out.stopped, out.running);
    assert_eq!(out.on_stop, 4);
    assert!(out.success);
}

#[tokio::test]
async fn signal_while_members_are_still_forking_stops_all_of_them() {
    // The parent is signalled as soon as the first member runs, while later
    // members may still be forking or registering their own handlers.
    let out = run_pool(8, 1, Signal::SIGTERM).await;

    assert!(out.success, "parent must survive and reap every member");
    assert_eq!(out.stopped.len(), 8);
    assert!(out.running.is_subset(&out.stopped));
    assert_eq!(out.on_stop, 0);
    for pid in &out.stopped {
        assert!(kill(Pid::from_raw(*pid as i32), None).is_err());
    }
}
