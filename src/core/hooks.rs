//! # Lifecycle hooks.
//!
//! [`Hooks`] is an injectable capability with three extension points, all
//! defaulting to no-ops. The state machine around them never changes:
//!
//! | Hook       | Runs                                            | Failure            |
//! |------------|-------------------------------------------------|--------------------|
//! | `do_init`  | once per process, before the main routine        | aborts the process |
//! | `on_start` | inside the main routine, before the listener     | aborts the process |
//! | `on_stop`  | graceful path only, before task cancellation     | logged, ignored    |
//!
//! Panics inside hooks are caught and treated like returned errors.

use async_trait::async_trait;

use crate::error::HookError;

/// Identity of the process a worker runs in; the argument of [`Hooks::do_init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Position of this process in the pool (`0..worker_count`).
    pub index: usize,
    /// OS process id.
    pub pid: u32,
    /// Size of the pool.
    pub worker_count: usize,
}

impl ProcessInfo {
    /// Info for the calling process running as the only pool member.
    pub fn current() -> Self {
        Self {
            index: 0,
            pid: std::process::id(),
            worker_count: 1,
        }
    }
}

/// Worker lifecycle extension points.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use procvisor::{HookError, Hooks, ProcessInfo};
///
/// struct Banner;
///
/// #[async_trait]
/// impl Hooks for Banner {
///     async fn do_init(&self, info: &ProcessInfo) -> Result<(), HookError> {
///         println!("worker {}/{} is pid {}", info.index + 1, info.worker_count, info.pid);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Hooks: Send + Sync + 'static {
    /// Process-scoped initialization.
    async fn do_init(&self, _info: &ProcessInfo) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs before the listener opens and before any task is scheduled.
    async fn on_start(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs first on the graceful shutdown path, before any cancellation is issued.
    async fn on_stop(&self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}
