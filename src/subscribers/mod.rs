//! # Event subscribers for the procvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in [`LogWriter`] that renders events through `tracing`.
//!
//! ## Architecture
//! ```text
//! Worker / Listener / Pool ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                    ┌────┴────┬────────┐
//!                                                                    ▼         ▼        ▼
//!                                                                LogWriter  Metrics  Custom
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
