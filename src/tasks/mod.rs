//! # Task abstractions.
//!
//! This module provides the task-related types:
//! - [`Task`] - trait for implementing schedulable, cancelable units
//! - [`TaskFn`] - function-based task implementation
//! - [`TaskRef`] - shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskContext`] - what a unit receives when the worker schedules it

mod task;
mod task_fn;

pub use task::{BoxTaskFuture, Task, TaskContext, TaskRef};
pub use task_fn::TaskFn;
