//! # Embedded network listener.
//!
//! A worker may own one TCP listener. This module provides:
//! - [`ListenerConfig`] - immutable bundle of everything needed to open one listener
//! - [`ConnectionHandler`], [`ConnectionFn`] - the per-connection callback capability
//! - [`SecureTransport`] - optional security context wrapping accepted streams
//! - [`Listener`] - the live handle: open, start serving, close-and-drain
//!
//! ## Lifecycle
//! ```text
//! Listener::open(cfg)
//!   ├─► resolve host / take pre-bound socket
//!   ├─► TcpSocket: reuse flags ─► bind ─► listen(backlog)
//!   ├─► publish ListenerOpened
//!   └─► spawn accept loop ──(auto_start or start_serving())──► accept
//!                                                                 │
//!                 per connection: [limit permit] ─► handshake ─► handler.on_connection()
//!
//! Listener::close()
//!   ├─► cancel accept loop (stop accepting, socket dropped)
//!   ├─► drain in-flight connections (bounded by shutdown_timeout, stragglers aborted)
//!   └─► publish ListenerClosed
//! ```

mod config;
mod handler;
mod server;

pub use config::{AddressFamily, ListenerConfig};
pub use handler::{
    AsyncStream, BoxStream, Connection, ConnectionFn, ConnectionHandler, HandlerRef,
    SecureTransport,
};
pub use server::Listener;
