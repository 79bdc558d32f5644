//! # Process pool: fork N members, relay signals, reap.
//!
//! ```text
//! Pool::run(factory)
//!   ├─ for index in 0..N: fork()
//!   │     child  ─► factory(info) ─► current_thread runtime ─► Worker::serve(info) ─► exit(0|1)
//!   │     parent ─► ProcessSpawned{pid, index}
//!   │
//!   └─ parent runtime (after all forks):
//!        ├─ signal received ─► kill(member, signal) for every live member
//!        └─ waitpid(member)  ─► ProcessExited{pid, status}
//!      returns when every member was reaped; the first abnormal exit is the error
//! ```
//!
//! The parent never runs a worker itself, and members share no state: each one
//! builds its worker through the factory after the fork.
//!
//! Stop signals are blocked before the first fork and stay blocked until the
//! process that receives them has registered its handlers: the parent in
//! `relay_and_reap`, each member in [`Worker::serve`]. A signal sent in between
//! is held pending instead of killing the process with its default action.
//! On Linux a member also gets `SIGTERM` if the parent dies.

use std::collections::HashSet;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork, getppid};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::WorkerConfig,
    core::{
        hooks::ProcessInfo,
        shutdown::{HeldSignals, StopSignals},
        worker::Worker,
    },
    error::WorkerError,
    events::{Bus, Event, EventKind},
    subscribers::{Subscribe, SubscriberSet},
};

#[derive(Debug, Clone, Copy)]
struct Member {
    pid: Pid,
    index: usize,
}

/// Forks and supervises a fixed number of worker processes.
pub struct Pool {
    workers: usize,
    cfg: WorkerConfig,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Pool {
    /// Creates a pool of `workers` members sharing `cfg`.
    pub fn new(workers: usize, cfg: WorkerConfig) -> Self {
        Self {
            bus: Bus::new(cfg.bus_capacity_clamped()),
            workers,
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Subscribers for the parent's pool events (`ProcessSpawned`, `ProcessExited`).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Subscribes to the parent's raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Number of members.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Forks the members and blocks until all of them exited.
    ///
    /// `factory` is invoked once in every member, after the fork, to build that
    /// member's worker. Must not be called from within a Tokio runtime.
    pub fn run<F>(&self, factory: F) -> Result<(), WorkerError>
    where
        F: Fn(ProcessInfo) -> Arc<Worker>,
    {
        if self.workers == 0 {
            return Err(WorkerError::InvalidWorkerCount);
        }
        let rx = self.bus.subscribe();
        let held = HeldSignals::hold(&self.cfg.stop_signals()).map_err(WorkerError::Signal)?;
        let parent = Pid::this();

        let mut members = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            // SAFETY: the child never returns into the caller. It builds its own
            // runtime from scratch and leaves through `process::exit`. The parent
            // has no runtime yet, so no scheduler threads are duplicated mid-operation.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    if !bind_to_parent(parent) {
                        std::process::exit(1);
                    }
                    let info = ProcessInfo {
                        index,
                        pid: std::process::id(),
                        worker_count: self.workers,
                    };
                    std::process::exit(member_main(factory(info), info, &held));
                }
                Ok(ForkResult::Parent { child }) => {
                    self.bus.publish(
                        Event::new(EventKind::ProcessSpawned).with_member(child.as_raw(), index),
                    );
                    members.push(Member { pid: child, index });
                }
                Err(e) => {
                    terminate(&members);
                    held.release();
                    for m in &members {
                        let _ = reap(m.pid);
                    }
                    return Err(WorkerError::Fork(e));
                }
            }
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match rt {
            Ok(rt) => rt.block_on(self.supervise(rx, members, &held)),
            Err(e) => {
                terminate(&members);
                held.release();
                for m in &members {
                    let _ = reap(m.pid);
                }
                Err(WorkerError::Runtime(e))
            }
        }
    }

    async fn supervise(
        &self,
        rx: broadcast::Receiver<Event>,
        members: Vec<Member>,
        held: &HeldSignals,
    ) -> Result<(), WorkerError> {
        let stop = CancellationToken::new();
        let fanout = (!self.subscribers.is_empty()).then(|| {
            SubscriberSet::new(self.subscribers.clone(), self.bus.clone()).forward(rx, stop.clone())
        });

        let res = self.relay_and_reap(members, held).await;

        stop.cancel();
        if let Some(fanout) = fanout {
            let _ = fanout.await;
        }
        res
    }

    async fn relay_and_reap(
        &self,
        members: Vec<Member>,
        held: &HeldSignals,
    ) -> Result<(), WorkerError> {
        let mut first_err: Option<WorkerError> = None;
        let registered = StopSignals::register(&self.cfg.stop_signals());
        held.release();
        let mut signals = match registered {
            Ok(signals) => Some(signals),
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for signals; terminating members");
                terminate(&members);
                first_err = Some(WorkerError::Signal(e));
                None
            }
        };

        let mut live: HashSet<Pid> = members.iter().map(|m| m.pid).collect();
        let mut reaps = JoinSet::new();
        for m in members {
            reaps.spawn_blocking(move || (m, reap(m.pid)));
        }

        loop {
            tokio::select! {
                sig = next_signal(&mut signals) => {
                    for &pid in &live {
                        if let Err(e) = relay(sig, pid) {
                            tracing::warn!(error = %e, "signal relay failed");
                            first_err.get_or_insert(e);
                        }
                    }
                }
                done = reaps.join_next() => match done {
                    None => break,
                    Some(Ok((m, status))) => {
                        live.remove(&m.pid);
                        let outcome = exit_outcome(m.pid, status);
                        let mut ev = Event::new(EventKind::ProcessExited).with_member(m.pid.as_raw(), m.index);
                        if let Err(e) = &outcome {
                            ev = ev.with_reason(e.to_string());
                        }
                        self.bus.publish(ev);
                        if let Err(e) = outcome {
                            first_err.get_or_insert(e);
                        }
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "reaper unit failed"),
                },
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Body of a forked member; returns the process exit code.
fn member_main(worker: Arc<Worker>, info: ProcessInfo, held: &HeldSignals) -> i32 {
    match run_process(worker, info, Some(held)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, label = e.as_label(), index = info.index, "worker process failed");
            1
        }
    }
}

/// Runs one worker lifecycle on a fresh single-threaded runtime in this process.
///
/// `held` signals are released once the worker registered its handlers.
pub(crate) fn run_process(
    worker: Arc<Worker>,
    info: ProcessInfo,
    held: Option<&HeldSignals>,
) -> Result<(), WorkerError> {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            if let Some(held) = held {
                held.release();
            }
            return Err(WorkerError::Runtime(e));
        }
    };
    rt.block_on(worker.serve_releasing(info, held))
}

/// Asks the kernel to send `SIGTERM` to this member when the parent dies.
///
/// Returns false when the parent is already gone.
#[cfg(target_os = "linux")]
fn bind_to_parent(parent: Pid) -> bool {
    if let Err(e) = nix::sys::prctl::set_pdeathsig(Signal::SIGTERM) {
        tracing::warn!(error = %e, "cannot set parent death signal");
    }
    getppid() == parent
}

#[cfg(not(target_os = "linux"))]
fn bind_to_parent(parent: Pid) -> bool {
    getppid() == parent
}

async fn next_signal(signals: &mut Option<StopSignals>) -> Signal {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

fn relay(signal: Signal, pid: Pid) -> Result<(), WorkerError> {
    match kill(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(WorkerError::Relay {
            signal,
            pid: pid.as_raw(),
            source,
        }),
    }
}

fn terminate(members: &[Member]) {
    for m in members {
        let _ = kill(m.pid, Signal::SIGTERM);
    }
}

fn reap(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

fn exit_outcome(pid: Pid, status: nix::Result<WaitStatus>) -> Result<(), WorkerError> {
    let status = match status {
        Ok(WaitStatus::Exited(_, 0)) => return Ok(()),
        Ok(WaitStatus::Exited(_, code)) => format!("exit code {code}"),
        Ok(WaitStatus::Signaled(_, sig, _)) => format!("killed by {sig}"),
        Ok(other) => format!("{other:?}"),
        Err(e) => format!("wait failed: {e}"),
    };
    Err(WorkerError::WorkerExited {
        pid: pid.as_raw(),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_classification() {
        let pid = Pid::from_raw(4242);
        assert!(exit_outcome(pid, Ok(WaitStatus::Exited(pid, 0))).is_ok());

        let err = exit_outcome(pid, Ok(WaitStatus::Exited(pid, 3))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "worker process 4242 exited abnormally: exit code 3"
        );

        let err =
            exit_outcome(pid, Ok(WaitStatus::Signaled(pid, Signal::SIGKILL, false))).unwrap_err();
        assert_eq!(err.as_label(), "pool_worker_exited");
        assert!(err.to_string().ends_with("killed by SIGKILL"));
    }

    #[test]
    fn relaying_to_a_gone_member_is_not_an_error() {
        // Reaped long ago or never existed; either way ESRCH.
        let pid = Pid::from_raw(i32::MAX);
        assert!(relay(Signal::SIGTERM, pid).is_ok());
    }

    #[test]
    fn zero_members_is_rejected_before_forking() {
        let pool = Pool::new(0, WorkerConfig::default());
        let err = pool.run(|_| Worker::new(vec![], None)).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidWorkerCount));
    }
}
