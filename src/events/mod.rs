//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by a worker, its listener,
//! its task units and the process pool.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Worker`, `Listener`, the unit runner, `Pool`, `SubscriberSet`
//!   units (overflow/panic).
//! - **Consumers**: the worker's fan-out into `SubscriberSet`, and anyone holding
//!   a receiver from [`Worker::subscribe`](crate::Worker::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
