//! # procvisor
//!
//! **Procvisor** runs N identical worker processes, each with a cooperative task
//! set and an optional embedded TCP listener, and brings every one of them to a
//! terminal state when a termination signal arrives.
//!
//! The interesting part is the per-process lifecycle: ordered startup, a binary
//! graceful/forced shutdown decided by signal identity, fire-and-forget task
//! cancellation, and a listener that is always released before `Stopped`.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                         Worker::run(worker_count)
//!                                   │
//!              ┌────────────────────┴─────────────────────┐
//!              │ worker_count == 1                        │ worker_count > 1
//!              ▼                                          ▼
//!      this process runs the lifecycle        Pool: fork() × N, relay signals, waitpid
//!                                                         │
//!                                       ┌─────────────────┼─────────────────┐
//!                                       ▼                 ▼                 ▼
//!                                  member #0         member #1   ...   member #N-1
//!                                (replicated Worker, own runtime, no shared state)
//!
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │ Worker (one per process)                                              │
//! │  - WorkerState (Init → Running → Stopped)                             │
//! │  - task units (TaskTracker + per-unit CancellationToken)              │
//! │  - Listener (optional; bind, accept, close-and-drain)                 │
//! │  - Hooks (do_init, on_start, on_stop)                                 │
//! └───────────┬──────────────────────────────────┬────────────────────────┘
//!             │ publish(Event)                   │ publish(Event)
//!             ▼                                  ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                    Bus (broadcast channel)                            │
//! │              (capacity: WorkerConfig::bus_capacity)                   │
//! └─────────────────────────────────┬─────────────────────────────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                         (per-subscriber queues)
//!                          ┌────────┼────────┐
//!                          ▼        ▼        ▼
//!                     LogWriter   sub2     subN
//! ```
//!
//! ### Lifecycle
//! ```text
//! do_init ─► on_start ─► open listener ─► schedule tasks ─► Running
//!                                                              │ signal
//!                              ┌───────────────────────────────┴──────────┐
//!                   graceful_signal                                other signal
//!                              ▼                                          ▼
//!          on_stop ─► cancel units ─► close listener          close listener
//!                              └────────────► grace wait ◄────────────────┘
//!                                                 ▼
//!                                              Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                         |
//! |-------------------|-------------------------------------------------------------------|--------------------------------------------|
//! | **Workers**       | Lifecycle state machine, graceful and forced shutdown.            | [`Worker`], [`WorkerState`], [`Hooks`]     |
//! | **Process pool**  | Fork, signal relay, reaping.                                      | [`Pool`], [`ProcessInfo`]                  |
//! | **Listener**      | Embedded TCP listener with limits, timeouts and a security layer. | [`ListenerConfig`], [`ConnectionHandler`]  |
//! | **Tasks**         | Opaque, cancelable units.                                         | [`Task`], [`TaskFn`], [`TaskContext`]      |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers).  | [`Subscribe`], [`LogWriter`]               |
//! | **Errors**        | Startup, shutdown and task failures.                              | [`WorkerError`], [`TaskError`]             |
//! | **Configuration** | Graceful signal, grace period, relayed signals.                   | [`WorkerConfig`]                           |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use procvisor::{LogWriter, Subscribe, TaskContext, TaskFn, TaskRef, Worker};
//!
//! fn main() -> Result<(), procvisor::WorkerError> {
//!     let ticker: TaskRef = TaskFn::arc("ticker", |ctx: TaskContext| async move {
//!         while !ctx.is_cancelled() {
//!             tokio::time::sleep(Duration::from_millis(250)).await;
//!         }
//!         Ok(())
//!     });
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let worker = Worker::builder(vec![ticker])
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // Blocks until Ctrl-C (graceful) or SIGTERM/SIGQUIT (forced).
//!     worker.run(2)
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod listener;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use config::WorkerConfig;
pub use core::{Hooks, NoopHooks, Pool, ProcessInfo, Worker, WorkerBuilder, WorkerState};
pub use error::{HookError, HookStage, TaskError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use listener::{
    AddressFamily, AsyncStream, BoxStream, Connection, ConnectionFn, ConnectionHandler,
    HandlerRef, Listener, ListenerConfig, SecureTransport,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{BoxTaskFuture, Task, TaskContext, TaskFn, TaskRef};

pub use nix::sys::signal::Signal;
