//! Runtime core: worker lifecycle and the process pool.
//!
//! Public API from this module:
//! - [`Worker`] / [`WorkerBuilder`]: one task set, one optional listener, the state machine;
//! - [`WorkerState`]: `Init → Running → Stopped`;
//! - [`Hooks`] / [`ProcessInfo`]: lifecycle extension points;
//! - [`Pool`]: forks and supervises N worker processes.
//!
//! Internal modules:
//! - [`runner`]: runs one task unit and publishes its outcome;
//! - [`shutdown`]: OS termination signal listeners that report which signal arrived.

mod builder;
mod hooks;
mod pool;
mod runner;
mod shutdown;
mod state;
mod worker;

pub use builder::WorkerBuilder;
pub use hooks::{Hooks, NoopHooks, ProcessInfo};
pub use pool::Pool;
pub use state::WorkerState;
pub use worker::Worker;
