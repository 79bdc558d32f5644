//! # Listener configuration.
//!
//! [`ListenerConfig`] is a value object: a worker takes its own copy at construction
//! and never mutates it. Capabilities inside it (handler, security context, pre-bound
//! socket) are shared handles; the pre-bound socket is duplicated with `try_clone`
//! every time a listener opens, so the caller's socket is never consumed.
//!
//! ## Defaults
//! | Field               | Default       |
//! |---------------------|---------------|
//! | `host`              | `127.0.0.1`   |
//! | `port`              | `8888`        |
//! | `limit`             | `100`         |
//! | `family`            | `Unspecified` |
//! | `passive`           | `true`        |
//! | `backlog`           | `100`         |
//! | `reuse_address`     | unset (on for Unix) |
//! | `reuse_port`        | unset         |
//! | `handshake_timeout` | none          |
//! | `shutdown_timeout`  | none          |
//! | `auto_start`        | `true`        |
//!
//! ## Sentinel values
//! - `limit = 0` → no cap on concurrent connections

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use crate::listener::handler::{HandlerRef, SecureTransport};

/// Address family filter applied to resolved listener addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    /// Any family; the first usable resolved address wins.
    #[default]
    Unspecified,
    /// IPv4 only.
    Inet,
    /// IPv6 only.
    Inet6,
}

impl AddressFamily {
    /// True if `addr` belongs to this family.
    pub fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Unspecified => true,
            AddressFamily::Inet => addr.is_ipv4(),
            AddressFamily::Inet6 => addr.is_ipv6(),
        }
    }

    /// Wildcard addresses used for passive binding without a host.
    pub fn wildcards(&self) -> Vec<IpAddr> {
        match self {
            AddressFamily::Unspecified => vec![
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            ],
            AddressFamily::Inet => vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
            AddressFamily::Inet6 => vec![IpAddr::V6(Ipv6Addr::UNSPECIFIED)],
        }
    }
}

/// Parameters for opening one network listener.
#[derive(Clone)]
pub struct ListenerConfig {
    /// Invoked once per accepted connection.
    pub handler: HandlerRef,
    /// Host name or address to bind. Empty with `passive` binds the wildcard address.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Maximum number of concurrently served connections (`0` = unlimited).
    pub limit: usize,
    /// Address family filter.
    pub family: AddressFamily,
    /// Passive resolution: an empty host means "all local addresses".
    pub passive: bool,
    /// Already bound and listening socket to serve instead of binding a new one.
    pub socket: Option<Arc<StdTcpListener>>,
    /// Listen backlog depth.
    pub backlog: u32,
    /// Security context wrapping accepted streams.
    pub security: Option<Arc<dyn SecureTransport>>,
    /// `SO_REUSEADDR`; unset means on for Unix.
    pub reuse_address: Option<bool>,
    /// `SO_REUSEPORT`; unset leaves the OS default.
    pub reuse_port: Option<bool>,
    /// Upper bound on the security handshake.
    pub handshake_timeout: Option<Duration>,
    /// Upper bound on draining in-flight connections at close.
    pub shutdown_timeout: Option<Duration>,
    /// Start accepting as soon as the listener opens.
    pub auto_start: bool,
}

impl ListenerConfig {
    /// Creates a config with the default parameters and the given handler.
    pub fn new(handler: HandlerRef) -> Self {
        Self {
            handler,
            host: "127.0.0.1".to_string(),
            port: 8888,
            limit: 100,
            family: AddressFamily::Unspecified,
            passive: true,
            socket: None,
            backlog: 100,
            security: None,
            reuse_address: None,
            reuse_port: None,
            handshake_timeout: None,
            shutdown_timeout: None,
            auto_start: true,
        }
    }

    /// Sets host and port.
    pub fn with_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Sets the concurrent connection limit (`0` = unlimited).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the address family filter and passive resolution flag.
    pub fn with_family(mut self, family: AddressFamily, passive: bool) -> Self {
        self.family = family;
        self.passive = passive;
        self
    }

    /// Serves an already bound and listening socket.
    pub fn with_socket(mut self, socket: Arc<StdTcpListener>) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Sets the listen backlog.
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Sets the security context.
    pub fn with_security(mut self, security: Arc<dyn SecureTransport>) -> Self {
        self.security = Some(security);
        self
    }

    /// Sets `SO_REUSEADDR` / `SO_REUSEPORT`.
    pub fn with_reuse(mut self, address: Option<bool>, port: Option<bool>) -> Self {
        self.reuse_address = address;
        self.reuse_port = port;
        self
    }

    /// Sets handshake and shutdown timeouts.
    pub fn with_timeouts(mut self, handshake: Option<Duration>, shutdown: Option<Duration>) -> Self {
        self.handshake_timeout = handshake;
        self.shutdown_timeout = shutdown;
        self
    }

    /// Sets the auto-start flag.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Returns the connection limit as an `Option`.
    #[inline]
    pub fn connection_limit(&self) -> Option<usize> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit)
        }
    }

    /// Effective `SO_REUSEADDR` setting.
    #[inline]
    pub fn reuse_address(&self) -> bool {
        self.reuse_address.unwrap_or(cfg!(unix))
    }
}

impl fmt::Debug for ListenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("limit", &self.limit)
            .field("family", &self.family)
            .field("passive", &self.passive)
            .field("socket", &self.socket.as_ref().map(|s| s.local_addr().ok()))
            .field("backlog", &self.backlog)
            .field("security", &self.security.is_some())
            .field("reuse_address", &self.reuse_address)
            .field("reuse_port", &self.reuse_port)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("auto_start", &self.auto_start)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{Connection, ConnectionFn};

    fn noop() -> HandlerRef {
        ConnectionFn::arc(|_conn: Connection| async { Ok(()) })
    }

    #[test]
    fn defaults_follow_the_documented_table() {
        let cfg = ListenerConfig::new(noop());
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.connection_limit(), Some(100));
        assert_eq!(cfg.backlog, 100);
        assert!(cfg.auto_start);
        assert!(cfg.passive);
        assert_eq!(cfg.reuse_address(), cfg!(unix));
    }

    #[test]
    fn copies_are_independent() {
        let original = ListenerConfig::new(noop()).with_addr("127.0.0.1", 9000);
        let copy = original.clone();
        let original = original.with_addr("0.0.0.0", 9001).with_limit(0);
        assert_eq!(copy.port, 9000);
        assert_eq!(copy.host, "127.0.0.1");
        assert_eq!(copy.connection_limit(), Some(100));
        assert_eq!(original.connection_limit(), None);
    }

    #[test]
    fn family_filters_addresses() {
        let v4: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        assert!(AddressFamily::Inet.accepts(&v4));
        assert!(!AddressFamily::Inet.accepts(&v6));
        assert!(AddressFamily::Inet6.accepts(&v6));
        assert!(AddressFamily::Unspecified.accepts(&v6));
        assert_eq!(AddressFamily::Inet6.wildcards(), vec![IpAddr::V6(Ipv6Addr::UNSPECIFIED)]);
    }
}
