//! Error types used by the procvisor runtime, its hooks and its tasks.
//!
//! This module defines three enums:
//!
//! - [`WorkerError`] — errors raised by the worker lifecycle and the process pool.
//! - [`TaskError`] — errors raised by individual task units.
//! - [`HookError`] — errors returned by user lifecycle hooks.
//!
//! All types provide `as_label` for logs/metrics. [`WorkerError`] additionally
//! classifies itself as a startup or shutdown failure:
//!
//! | Class    | Effect                                                      |
//! |----------|-------------------------------------------------------------|
//! | startup  | fatal; the listener is released and the process aborts      |
//! | shutdown | published and logged; `Stopped` is still reached            |
//! | task     | isolated per unit; never reaches the worker state machine   |

use std::{io, net::SocketAddr};

use nix::sys::signal::Signal;
use thiserror::Error;

use crate::listener::AddressFamily;

/// Lifecycle hook that produced a [`WorkerError::Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Process-scoped initialization, runs before the worker starts.
    Init,
    /// Startup hook, runs before the listener opens.
    Start,
    /// Graceful shutdown hook, runs before task cancellation.
    Stop,
}

impl HookStage {
    /// Returns the hook name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::Init => "do_init",
            HookStage::Start => "on_start",
            HookStage::Stop => "on_stop",
        }
    }
}

/// # Errors produced by the worker runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The listener socket could not be created, bound or put into listening mode.
    #[error("listener bind failed on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Host name resolution for the listener failed.
    #[error("cannot resolve listener host {host:?}: {source}")]
    Resolve {
        /// Host as configured.
        host: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Host resolved, but to no address of the requested family.
    #[error("host {host:?} has no {family:?} address")]
    NoAddress {
        /// Host as configured.
        host: String,
        /// Requested address family.
        family: AddressFamily,
    },

    /// A pre-bound socket handed over in the listener config was unusable.
    #[error("pre-bound listener socket unusable: {source}")]
    Socket {
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A user lifecycle hook returned an error or panicked.
    #[error("{} hook failed: {error}", hook.as_str())]
    Hook {
        /// Which hook failed.
        hook: HookStage,
        /// Error message.
        error: String,
    },

    /// Listener teardown did not complete cleanly.
    #[error("listener close failed: {error}")]
    ListenerClose {
        /// Error message.
        error: String,
    },

    /// Registering OS signal listeners failed.
    #[error("signal registration failed: {0}")]
    Signal(#[source] io::Error),

    /// Building the per-process scheduler failed.
    #[error("cannot build worker runtime: {0}")]
    Runtime(#[source] io::Error),

    /// Spawning a pool member failed.
    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    /// Forwarding a signal to a pool member failed.
    #[error("cannot relay {signal} to pid {pid}: {source}")]
    Relay {
        /// Relayed signal.
        signal: Signal,
        /// Target member.
        pid: i32,
        /// Underlying error.
        source: nix::Error,
    },

    /// A pool member exited with a failure status or was killed by a signal.
    #[error("worker process {pid} exited abnormally: {status}")]
    WorkerExited {
        /// Member pid.
        pid: i32,
        /// Rendered exit status.
        status: String,
    },

    /// `run` was asked for zero worker processes.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::WorkerError;
    ///
    /// assert_eq!(WorkerError::InvalidWorkerCount.as_label(), "worker_invalid_count");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Bind { .. } => "listener_bind",
            WorkerError::Resolve { .. } => "listener_resolve",
            WorkerError::NoAddress { .. } => "listener_no_address",
            WorkerError::Socket { .. } => "listener_socket",
            WorkerError::Hook { .. } => "worker_hook",
            WorkerError::ListenerClose { .. } => "listener_close",
            WorkerError::Signal(_) => "worker_signal",
            WorkerError::Runtime(_) => "worker_runtime",
            WorkerError::Fork(_) => "pool_fork",
            WorkerError::Relay { .. } => "pool_relay",
            WorkerError::WorkerExited { .. } => "pool_worker_exited",
            WorkerError::InvalidWorkerCount => "worker_invalid_count",
        }
    }

    /// True for failures that abort a worker before it reaches `Running`.
    pub fn is_startup(&self) -> bool {
        match self {
            WorkerError::Hook { hook, .. } => *hook != HookStage::Stop,
            WorkerError::Bind { .. }
            | WorkerError::Resolve { .. }
            | WorkerError::NoAddress { .. }
            | WorkerError::Socket { .. }
            | WorkerError::Signal(_)
            | WorkerError::Runtime(_) => true,
            _ => false,
        }
    }

    /// True for failures raised while a worker shuts down.
    ///
    /// These are logged and never prevent the worker from reaching `Stopped`.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            WorkerError::ListenerClose { .. }
                | WorkerError::Hook {
                    hook: HookStage::Stop,
                    ..
                }
        )
    }
}

/// # Errors produced by task units.
///
/// A failing unit is reported and forgotten; it never changes the worker state.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task observed cancellation and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }
}

/// # Errors returned by user lifecycle hooks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HookError {
    /// Hook failed with a message.
    #[error("{error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },
}

impl HookError {
    /// Shorthand for [`HookError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HookError::Fail {
            error: error.into(),
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_failures_are_classified_by_stage() {
        let start = WorkerError::Hook {
            hook: HookStage::Start,
            error: "boom".into(),
        };
        assert!(start.is_startup());
        assert!(!start.is_shutdown());

        let stop = WorkerError::Hook {
            hook: HookStage::Stop,
            error: "boom".into(),
        };
        assert!(!stop.is_startup());
        assert!(stop.is_shutdown());
        assert_eq!(stop.to_string(), "on_stop hook failed: boom");
    }

    #[test]
    fn listener_failures_split_between_startup_and_shutdown() {
        let bind = WorkerError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(bind.is_startup());
        assert_eq!(bind.as_label(), "listener_bind");

        let close = WorkerError::ListenerClose {
            error: "join".into(),
        };
        assert!(close.is_shutdown());
        assert!(!close.is_startup());
    }
}
