//! # Worker lifecycle state.
//!
//! ```text
//! Init ──(_run scheduled every task)──► Running ──(either shutdown path)──► Stopped
//!   └──────────────(startup aborted by a signal)──────────────────────────────┘
//! ```
//!
//! ## Rules
//! - The state only moves forward; a transition to an earlier or equal state is ignored.
//! - Transitions are published through a `watch` channel so callers can await them.

use std::fmt;

use tokio::sync::watch;

/// Lifecycle phase of a [`Worker`](crate::Worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkerState {
    /// Constructed; nothing scheduled yet.
    Init,
    /// Startup hook ran, listener open (if configured), every task scheduled.
    Running,
    /// Terminal: listener released and grace period over.
    Stopped,
}

impl WorkerState {
    /// Returns the state name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Init => "INIT",
            WorkerState::Running => "RUNNING",
            WorkerState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only state holder.
pub(crate) struct StateCell {
    tx: watch::Sender<WorkerState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(WorkerState::Init);
        Self { tx }
    }

    pub(crate) fn get(&self) -> WorkerState {
        *self.tx.borrow()
    }

    /// Moves to `next` if it is ahead of the current state. Returns whether it moved.
    pub(crate) fn advance(&self, next: WorkerState) -> bool {
        self.tx.send_if_modified(|cur| {
            if next > *cur {
                *cur = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_never_regresses() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), WorkerState::Init);
        assert!(cell.advance(WorkerState::Running));
        assert!(!cell.advance(WorkerState::Init));
        assert!(!cell.advance(WorkerState::Running));
        assert!(cell.advance(WorkerState::Stopped));
        assert!(!cell.advance(WorkerState::Running));
        assert_eq!(cell.get(), WorkerState::Stopped);
    }

    #[test]
    fn init_may_jump_to_stopped() {
        let cell = StateCell::new();
        let rx = cell.subscribe();
        assert!(cell.advance(WorkerState::Stopped));
        assert_eq!(*rx.borrow(), WorkerState::Stopped);
        assert_eq!(WorkerState::Stopped.to_string(), "STOPPED");
    }
}
