//! # Task abstraction.
//!
//! This module defines the [`Task`] trait and the [`TaskContext`] a unit receives.
//! The common handle type is [`TaskRef`], an `Arc<dyn Task>` suitable for sharing
//! between a worker blueprint and the processes replicated from it.
//!
//! The worker schedules each task exactly once, fire-and-forget. Its only later
//! interaction with the unit is a cancellation request on the graceful shutdown path,
//! delivered through [`TaskContext::token`].

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Boxed future produced by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// Context handed to a unit when it is scheduled.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Handle of the scheduler the worker is bound to.
    pub handle: Handle,
    /// Cancelled when the worker requests cancellation of this unit.
    pub token: CancellationToken,
}

impl TaskContext {
    /// True once cancellation of this unit has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation of this unit is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// # Schedulable, cancelable unit.
///
/// A `Task` has a stable [`name`](Task::name) and produces a fresh future per
/// [`spawn`](Task::spawn). The worker never awaits that future's result; failures
/// are reported as `TaskFailed` events and otherwise ignored.
///
/// # Example
/// ```
/// use procvisor::{BoxTaskFuture, Task, TaskContext};
///
/// struct Heartbeat;
///
/// impl Task for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     fn spawn(&self, ctx: TaskContext) -> BoxTaskFuture {
///         Box::pin(async move {
///             while !ctx.is_cancelled() {
///                 tokio::time::sleep(std::time::Duration::from_secs(1)).await;
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates the future the worker schedules.
    ///
    /// Implementations should watch `ctx.token` and return promptly once it fires.
    fn spawn(&self, ctx: TaskContext) -> BoxTaskFuture;
}
