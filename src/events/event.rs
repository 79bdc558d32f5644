//! # Runtime events emitted by workers, listeners and the process pool.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Worker lifecycle**: init, starting, running, stopped
//! - **Listener**: opened, closed, connection failures
//! - **Task units**: scheduled, stopped, failed, cancellation requested
//! - **Shutdown and pool**: shutdown requested, grace outcome, member spawn/exit
//!
//! The [`Event`] struct carries additional metadata such as the process id, task
//! name, signal, bound address and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a process-wide unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order of delivery.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("ticker")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("ticker"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use nix::sys::signal::Signal;

/// Sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `task`: subscriber name
    /// - `reason`: `"full"` or `"closed"`
    SubscriberOverflow,

    // === Worker lifecycle ===
    /// Process-scoped `do_init` hook completed.
    WorkerInitialized,

    /// Main run routine bound the scheduler and is about to run `on_start`.
    WorkerStarting,

    /// All task units scheduled; the worker is `Running`.
    ///
    /// Sets:
    /// - `count`: number of scheduled units
    WorkerRunning,

    /// Worker reached the terminal `Stopped` state.
    WorkerStopped,

    /// A lifecycle hook failed.
    ///
    /// Sets:
    /// - `task`: hook name (`do_init`, `on_start`, `on_stop`)
    /// - `reason`: failure message
    HookFailed,

    // === Listener ===
    /// Listener bound and listening.
    ///
    /// Sets:
    /// - `addr`: bound local address
    ListenerOpened,

    /// Listener released its socket and drained its connections.
    ///
    /// Sets:
    /// - `addr`: address that was bound
    /// - `reason`: set when the drain timed out or teardown failed
    ListenerClosed,

    /// Accepting, securing or serving one connection failed.
    ///
    /// Sets:
    /// - `addr`: peer address, when known
    /// - `reason`: failure message
    ConnectionFailed,

    // === Task units ===
    /// A task unit was handed to the scheduler.
    ///
    /// Sets:
    /// - `task`: task name
    TaskScheduled,

    /// A task unit finished (successfully or after observing cancellation).
    ///
    /// Sets:
    /// - `task`: task name
    TaskStopped,

    /// A task unit returned an error or panicked.
    ///
    /// Sets:
    /// - `task`: task name
    /// - `reason`: failure message
    TaskFailed,

    /// Cancellation was requested for a unit (fire-and-forget).
    ///
    /// Sets:
    /// - `task`: unit name
    CancelRequested,

    // === Shutdown ===
    /// A termination signal reached the worker.
    ///
    /// Sets:
    /// - `signal`: received signal
    /// - `graceful`: whether the graceful path was chosen
    ShutdownRequested,

    /// Every unit finished within the grace period.
    AllStoppedWithin,

    /// Grace period elapsed with units still alive; they are aborted.
    ///
    /// Sets:
    /// - `count`: number of stuck units
    /// - `reason`: their names
    GraceExceeded,

    // === Process pool ===
    /// A pool member was forked.
    ///
    /// Sets:
    /// - `pid`: member pid
    /// - `index`: member index
    ProcessSpawned,

    /// A pool member exited.
    ///
    /// Sets:
    /// - `pid`: member pid
    /// - `reason`: rendered exit status
    ProcessExited,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Process that emitted the event.
    pub pid: u32,

    /// Name of the task unit, hook or subscriber, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Termination signal, if applicable.
    pub signal: Option<Signal>,
    /// Whether a shutdown takes the graceful path.
    pub graceful: Option<bool>,
    /// Listener or peer address.
    pub addr: Option<SocketAddr>,
    /// Counter payload (scheduled units, stuck units).
    pub count: Option<usize>,
    /// Pool member pid.
    pub member: Option<i32>,
    /// Pool member index.
    pub index: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: std::process::id(),
            task: None,
            reason: None,
            signal: None,
            graceful: None,
            addr: None,
            count: None,
            member: None,
            index: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task (or hook/subscriber) name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches the received signal and the chosen shutdown path.
    #[inline]
    pub fn with_signal(mut self, signal: Signal, graceful: bool) -> Self {
        self.signal = Some(signal);
        self.graceful = Some(graceful);
        self
    }

    /// Attaches a socket address.
    #[inline]
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches pool member identity.
    #[inline]
    pub fn with_member(mut self, pid: i32, index: usize) -> Self {
        self.member = Some(pid);
        self.index = Some(index);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::WorkerStarting);
        let b = Event::new(EventKind::WorkerRunning);
        assert!(b.seq > a.seq);
        assert_eq!(a.pid, std::process::id());
    }

    #[test]
    fn builder_sets_shutdown_metadata() {
        let ev = Event::new(EventKind::ShutdownRequested).with_signal(Signal::SIGTERM, false);
        assert_eq!(ev.signal, Some(Signal::SIGTERM));
        assert_eq!(ev.graceful, Some(false));
        assert!(!ev.is_subscriber_event());
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_event());
    }
}
