//! # LogWriter — renders events through `tracing`
//!
//! A subscriber that turns every [`Event`] into one structured `tracing` record.
//! Lifecycle steps are logged at `debug`, state milestones at `info`, failures at `warn`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  procvisor: worker running pid=4242 tasks=2
//! DEBUG procvisor: listener opened pid=4242 addr=127.0.0.1:8888
//! INFO  procvisor: shutdown requested pid=4242 signal=SIGINT graceful=true
//! DEBUG procvisor: cancel requested pid=4242 task="ticker"
//! WARN  procvisor: grace exceeded pid=4242 stuck=1 tasks="ticker"
//! INFO  procvisor: worker stopped pid=4242
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let pid = e.pid;
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::WorkerInitialized => {
                tracing::debug!(target: "procvisor", pid, "worker initialized");
            }
            EventKind::WorkerStarting => {
                tracing::debug!(target: "procvisor", pid, "worker starting");
            }
            EventKind::WorkerRunning => {
                tracing::info!(target: "procvisor", pid, tasks = e.count.unwrap_or(0), "worker running");
            }
            EventKind::WorkerStopped => {
                tracing::info!(target: "procvisor", pid, "worker stopped");
            }
            EventKind::HookFailed => {
                tracing::warn!(target: "procvisor", pid, hook = task, error = reason, "hook failed");
            }
            EventKind::ListenerOpened => {
                tracing::debug!(target: "procvisor", pid, addr = ?e.addr, "listener opened");
            }
            EventKind::ListenerClosed => match &e.reason {
                Some(reason) => {
                    tracing::warn!(target: "procvisor", pid, addr = ?e.addr, reason = %reason, "listener closed uncleanly");
                }
                None => {
                    tracing::debug!(target: "procvisor", pid, addr = ?e.addr, "listener closed");
                }
            },
            EventKind::ConnectionFailed => {
                tracing::warn!(target: "procvisor", pid, peer = ?e.addr, error = reason, "connection failed");
            }
            EventKind::TaskScheduled => {
                tracing::debug!(target: "procvisor", pid, task, "task scheduled");
            }
            EventKind::TaskStopped => {
                tracing::debug!(target: "procvisor", pid, task, "task stopped");
            }
            EventKind::TaskFailed => {
                tracing::warn!(target: "procvisor", pid, task, error = reason, "task failed");
            }
            EventKind::CancelRequested => {
                tracing::debug!(target: "procvisor", pid, task, "cancel requested");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(
                    target: "procvisor",
                    pid,
                    signal = ?e.signal,
                    graceful = e.graceful.unwrap_or(false),
                    "shutdown requested"
                );
            }
            EventKind::AllStoppedWithin => {
                tracing::debug!(target: "procvisor", pid, "all units stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(target: "procvisor", pid, stuck = e.count.unwrap_or(0), tasks = reason, "grace exceeded");
            }
            EventKind::ProcessSpawned => {
                tracing::info!(target: "procvisor", member = ?e.member, index = ?e.index, "worker process spawned");
            }
            EventKind::ProcessExited => {
                tracing::info!(target: "procvisor", member = ?e.member, status = reason, "worker process exited");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "procvisor", subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "procvisor", subscriber = task, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
