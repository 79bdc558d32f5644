//! # Run one scheduled task unit.
//!
//! Wraps a unit's future so its outcome is reported and contained:
//!
//! ```text
//! Success:       task.spawn(ctx) → Ok(())            → publish TaskStopped
//! Cancellation:  task.spawn(ctx) → Err(Canceled)     → publish TaskStopped
//! Failure:       task.spawn(ctx) → Err(Fail)         → publish TaskFailed
//! Panic:         task.spawn(ctx) → panic             → publish TaskFailed
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event, unless the unit is aborted.
//! - Nothing escapes to the worker: a failing unit never changes the worker state.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::{
    error::{TaskError, panic_message},
    events::{Bus, Event, EventKind},
    tasks::{TaskContext, TaskRef},
};

/// Runs `task` to completion, publishing its outcome to `bus`.
pub(crate) async fn run_unit(task: TaskRef, ctx: TaskContext, bus: Bus) {
    let res = AssertUnwindSafe(async { task.spawn(ctx).await })
        .catch_unwind()
        .await;

    match res {
        Ok(Ok(())) | Ok(Err(TaskError::Canceled)) => publish_stopped(&bus, task.name()),
        Ok(Err(e)) => publish_failed(&bus, task.name(), e.to_string()),
        Err(panic) => publish_failed(
            &bus,
            task.name(),
            format!("panicked: {}", panic_message(panic.as_ref())),
        ),
    }
}

/// Publishes `TaskStopped` event (success or graceful cancellation).
fn publish_stopped(bus: &Bus, name: &str) {
    bus.publish(Event::new(EventKind::TaskStopped).with_task(name));
}

/// Publishes `TaskFailed` event with error details.
fn publish_failed(bus: &Bus, name: &str, reason: String) {
    bus.publish(
        Event::new(EventKind::TaskFailed)
            .with_task(name)
            .with_reason(reason),
    );
}
