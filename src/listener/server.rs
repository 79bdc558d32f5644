//! # Live listener: bind, accept, close-and-drain.
//!
//! [`Listener::open`] binds per [`ListenerConfig`] and spawns the accept loop as a
//! unit on the current scheduler. [`Listener::close`] stops accepting, waits for the
//! accept loop to drop its socket and drain in-flight connections, and only then
//! returns. Once `close` returns the port is free.
//!
//! ## Rules
//! - Exactly one socket is bound: the first resolved address that binds wins.
//! - Connections beyond `limit` wait in the kernel backlog until a slot frees up.
//! - A failing or panicking handler is reported as `ConnectionFailed`; the loop continues.
//! - On close, handlers see [`Connection::shutdown`] fire; those still running after
//!   the drain limit are aborted. The limit is `shutdown_timeout`, or the fallback
//!   given to [`Listener::open_with_drain_limit`]. Without either the drain is unbounded.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::listener::config::ListenerConfig;
use crate::listener::handler::{BoxStream, Connection, HandlerRef, SecureTransport};

/// Pause after a failed `accept` (e.g. descriptor exhaustion) before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Handle to an open listener.
pub struct Listener {
    local_addr: SocketAddr,
    token: CancellationToken,
    start: Arc<Notify>,
    join: JoinHandle<Option<String>>,
    bus: Bus,
}

impl Listener {
    /// Binds a listener per `cfg` and spawns its accept loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(cfg: &ListenerConfig, bus: Bus) -> Result<Self, WorkerError> {
        Self::bind_and_spawn(cfg, bus, cfg.shutdown_timeout).await
    }

    /// Like [`open`](Listener::open), but connections are drained for at most
    /// `fallback` on close when `cfg` sets no `shutdown_timeout`.
    pub async fn open_with_drain_limit(
        cfg: &ListenerConfig,
        bus: Bus,
        fallback: Duration,
    ) -> Result<Self, WorkerError> {
        Self::bind_and_spawn(cfg, bus, cfg.shutdown_timeout.or(Some(fallback))).await
    }

    async fn bind_and_spawn(
        cfg: &ListenerConfig,
        bus: Bus,
        drain_limit: Option<Duration>,
    ) -> Result<Self, WorkerError> {
        let listener = bind(cfg).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WorkerError::Socket { source })?;

        let token = CancellationToken::new();
        let start = Arc::new(Notify::new());
        if cfg.auto_start {
            start.notify_one();
        }

        let acceptor = Acceptor {
            listener,
            handler: Arc::clone(&cfg.handler),
            security: cfg.security.clone(),
            limit: cfg.connection_limit().map(|n| Arc::new(Semaphore::new(n))),
            handshake_timeout: cfg.handshake_timeout,
            drain_limit,
            bus: bus.clone(),
            token: token.clone(),
            start: Arc::clone(&start),
        };
        let join = tokio::spawn(acceptor.run());

        bus.publish(Event::new(EventKind::ListenerOpened).with_addr(local_addr));
        Ok(Self {
            local_addr,
            token,
            start,
            join,
            bus,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections. No-op once serving.
    pub fn start_serving(&self) {
        self.start.notify_one();
    }

    /// Stops accepting, waits until the socket is released and connections are drained.
    pub async fn close(self) -> Result<(), WorkerError> {
        self.token.cancel();
        let closed = Event::new(EventKind::ListenerClosed).with_addr(self.local_addr);

        match self.join.await {
            Ok(None) => {
                self.bus.publish(closed);
                Ok(())
            }
            Ok(Some(reason)) => {
                self.bus.publish(closed.with_reason(reason));
                Ok(())
            }
            Err(e) => {
                let error = e.to_string();
                self.bus.publish(closed.with_reason(error.clone()));
                Err(WorkerError::ListenerClose { error })
            }
        }
    }
}

/// Accept loop state, owned by the listener's unit.
struct Acceptor {
    listener: TcpListener,
    handler: HandlerRef,
    security: Option<Arc<dyn SecureTransport>>,
    limit: Option<Arc<Semaphore>>,
    handshake_timeout: Option<Duration>,
    drain_limit: Option<Duration>,
    bus: Bus,
    token: CancellationToken,
    start: Arc<Notify>,
}

impl Acceptor {
    /// Runs until cancelled; returns a reason when the drain was cut short.
    async fn run(self) -> Option<String> {
        let Acceptor {
            listener,
            handler,
            security,
            limit,
            handshake_timeout,
            drain_limit,
            bus,
            token,
            start,
        } = self;

        tokio::select! {
            _ = start.notified() => {}
            _ = token.cancelled() => return None,
        }

        let mut conns: JoinSet<()> = JoinSet::new();
        loop {
            let permit = match &limit {
                Some(sem) => tokio::select! {
                    p = Arc::clone(sem).acquire_owned() => match p {
                        Ok(p) => Some(p),
                        Err(_closed) => break,
                    },
                    _ = token.cancelled() => break,
                },
                None => None,
            };

            tokio::select! {
                _ = token.cancelled() => break,
                res = listener.accept() => match res {
                    Ok((stream, peer)) => {
                        conns.spawn(serve(
                            stream,
                            peer,
                            Arc::clone(&handler),
                            security.clone(),
                            handshake_timeout,
                            token.child_token(),
                            bus.clone(),
                            permit,
                        ));
                    }
                    Err(e) => {
                        bus.publish(Event::new(EventKind::ConnectionFailed).with_reason(e.to_string()));
                        time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(res) = conns.join_next(), if !conns.is_empty() => reap(res, &bus),
            }
        }

        // Stop accepting before draining: the port is released here.
        drop(listener);

        let drained = match drain_limit {
            Some(limit) => time::timeout(limit, drain(&mut conns, &bus)).await.is_ok(),
            None => {
                drain(&mut conns, &bus).await;
                true
            }
        };
        if drained {
            return None;
        }

        let stuck = conns.len();
        conns.abort_all();
        while conns.join_next().await.is_some() {}
        Some(format!(
            "{stuck} connection(s) aborted after {:?}",
            drain_limit.unwrap_or_default()
        ))
    }
}

/// Binds the configured socket, or adopts the pre-bound one.
async fn bind(cfg: &ListenerConfig) -> Result<TcpListener, WorkerError> {
    if let Some(sock) = &cfg.socket {
        let std = sock
            .try_clone()
            .and_then(|s| s.set_nonblocking(true).map(|()| s))
            .map_err(|source| WorkerError::Socket { source })?;
        return TcpListener::from_std(std).map_err(|source| WorkerError::Socket { source });
    }

    let mut last_err = None;
    for addr in candidates(cfg).await? {
        match bind_addr(cfg, addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| WorkerError::NoAddress {
        host: cfg.host.clone(),
        family: cfg.family,
    }))
}

/// Resolves the configured host into bindable addresses of the configured family.
async fn candidates(cfg: &ListenerConfig) -> Result<Vec<SocketAddr>, WorkerError> {
    let resolved: Vec<SocketAddr> = if cfg.host.is_empty() && cfg.passive {
        cfg.family
            .wildcards()
            .into_iter()
            .map(|ip| SocketAddr::new(ip, cfg.port))
            .collect()
    } else {
        let host = if cfg.host.is_empty() {
            "localhost"
        } else {
            cfg.host.as_str()
        };
        lookup_host((host, cfg.port))
            .await
            .map_err(|source| WorkerError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect()
    };

    let matching: Vec<SocketAddr> = resolved
        .into_iter()
        .filter(|a| cfg.family.accepts(a))
        .collect();
    if matching.is_empty() {
        return Err(WorkerError::NoAddress {
            host: cfg.host.clone(),
            family: cfg.family,
        });
    }
    Ok(matching)
}

fn bind_addr(cfg: &ListenerConfig, addr: SocketAddr) -> Result<TcpListener, WorkerError> {
    let bind_err = |source: io::Error| WorkerError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(cfg.reuse_address()).map_err(bind_err)?;
    if let Some(reuse) = cfg.reuse_port {
        socket.set_reuseport(reuse).map_err(bind_err)?;
    }
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(cfg.backlog).map_err(bind_err)
}

/// Serves one connection; the permit (if any) is held until the handler returns.
#[allow(clippy::too_many_arguments)]
async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    handler: HandlerRef,
    security: Option<Arc<dyn SecureTransport>>,
    handshake_timeout: Option<Duration>,
    shutdown: CancellationToken,
    bus: Bus,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let res = async {
        let io: BoxStream = match security {
            Some(sec) => handshake(sec.as_ref(), stream, handshake_timeout).await?,
            None => Box::new(stream),
        };
        let (reader, writer) = tokio::io::split(io);
        handler
            .on_connection(Connection {
                reader,
                writer,
                peer,
                shutdown,
            })
            .await
    }
    .await;

    if let Err(e) = res {
        bus.publish(
            Event::new(EventKind::ConnectionFailed)
                .with_addr(peer)
                .with_reason(e.to_string()),
        );
    }
}

async fn handshake(
    sec: &dyn SecureTransport,
    stream: TcpStream,
    limit: Option<Duration>,
) -> io::Result<BoxStream> {
    match limit {
        Some(limit) => time::timeout(limit, sec.handshake(stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))?,
        None => sec.handshake(stream).await,
    }
}

async fn drain(conns: &mut JoinSet<()>, bus: &Bus) {
    while let Some(res) = conns.join_next().await {
        reap(res, bus);
    }
}

fn reap(res: Result<(), JoinError>, bus: &Bus) {
    if let Err(e) = res {
        if e.is_panic() {
            bus.publish(
                Event::new(EventKind::ConnectionFailed).with_reason("connection handler panicked"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::listener::{ConnectionFn, ListenerConfig};

    fn echo() -> HandlerRef {
        ConnectionFn::arc(|mut conn: Connection| async move {
            let mut buf = [0u8; 64];
            loop {
                let n = tokio::select! {
                    n = conn.reader.read(&mut buf) => n?,
                    _ = conn.shutdown.cancelled() => return Ok(()),
                };
                if n == 0 {
                    return Ok(());
                }
                conn.writer.write_all(&buf[..n]).await?;
            }
        })
    }

    fn ephemeral(handler: HandlerRef) -> ListenerConfig {
        ListenerConfig::new(handler).with_addr("127.0.0.1", 0)
    }

    async fn roundtrip(addr: SocketAddr, msg: &[u8]) -> Vec<u8> {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(msg).await.unwrap();
        let mut buf = vec![0u8; msg.len()];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn serves_and_releases_the_port() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let listener = Listener::open(&ephemeral(echo()), bus).await.unwrap();
        let addr = listener.local_addr();

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ListenerOpened);
        assert_eq!(roundtrip(addr, b"ping").await, b"ping");

        listener.close().await.unwrap();
        let closed = rx.recv().await.unwrap();
        assert_eq!(closed.kind, EventKind::ListenerClosed);
        assert!(closed.reason.is_none());

        let again = TcpSocket::new_v4().unwrap();
        again.set_reuseaddr(true).unwrap();
        again.bind(addr).unwrap();
        again.listen(8).unwrap();
    }

    #[tokio::test]
    async fn does_not_accept_until_started() {
        let served = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&served);
        let handler = ConnectionFn::arc(move |_conn: Connection| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let cfg = ephemeral(handler).with_auto_start(false);
        let listener = Listener::open(&cfg, Bus::new(8)).await.unwrap();

        let _client = TcpStream::connect(listener.local_addr()).await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(served.load(Ordering::SeqCst), 0);

        listener.start_serving();
        for _ in 0..100 {
            if served.load(Ordering::SeqCst) == 1 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(served.load(Ordering::SeqCst), 1);
        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn adopts_a_pre_bound_socket() {
        let std = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std.local_addr().unwrap();
        let cfg = ListenerConfig::new(echo()).with_socket(Arc::new(std));

        let listener = Listener::open(&cfg, Bus::new(8)).await.unwrap();
        assert_eq!(listener.local_addr(), addr);
        assert_eq!(roundtrip(addr, b"reuse").await, b"reuse");
        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_a_startup_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let cfg = ListenerConfig::new(echo())
            .with_addr("127.0.0.1", port)
            .with_reuse(Some(false), None);

        let err = Listener::open(&cfg, Bus::new(8)).await.err().unwrap();
        assert!(matches!(err, WorkerError::Bind { .. }));
        assert!(err.is_startup());
    }

    struct Prefixed;

    #[async_trait]
    impl SecureTransport for Prefixed {
        async fn handshake(&self, mut stream: TcpStream) -> io::Result<BoxStream> {
            stream.write_all(b"hello:").await?;
            Ok(Box::new(stream))
        }
    }

    #[tokio::test]
    async fn security_context_wraps_every_connection() {
        let cfg = ephemeral(echo())
            .with_security(Arc::new(Prefixed))
            .with_timeouts(Some(Duration::from_secs(1)), None);
        let listener = Listener::open(&cfg, Bus::new(8)).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 7];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello:x");
        listener.close().await.unwrap();
    }

    #[tokio::test]
    async fn stuck_connections_are_aborted_after_shutdown_timeout() {
        let stubborn = ConnectionFn::arc(|_conn: Connection| async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let cfg = ephemeral(stubborn).with_timeouts(None, Some(Duration::from_millis(20)));
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let listener = Listener::open(&cfg, bus).await.unwrap();

        let _client = TcpStream::connect(listener.local_addr()).await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        listener.close().await.unwrap();

        let mut closed = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ListenerClosed {
                closed = Some(ev);
            }
        }
        let reason = closed.and_then(|ev| ev.reason).unwrap();
        assert!(reason.contains("1 connection(s) aborted"));
    }

    #[tokio::test]
    async fn drain_limit_fallback_applies_without_shutdown_timeout() {
        let deaf = ConnectionFn::arc(|mut conn: Connection| async move {
            let mut sink = Vec::new();
            conn.reader.read_to_end(&mut sink).await?;
            Ok(())
        });
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let listener =
            Listener::open_with_drain_limit(&ephemeral(deaf), bus, Duration::from_millis(20))
                .await
                .unwrap();

        let _idle = TcpStream::connect(listener.local_addr()).await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        time::timeout(Duration::from_secs(3), listener.close())
            .await
            .expect("close must not wait for an idle client")
            .unwrap();

        let mut reason = None;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ListenerClosed {
                reason = ev.reason;
            }
        }
        assert!(reason.unwrap().contains("1 connection(s) aborted after 20ms"));
    }

    #[tokio::test]
    async fn limit_caps_concurrent_connections() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let handler = ConnectionFn::arc(move |conn: Connection| {
            let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_millis(30)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                drop(conn);
                Ok(())
            }
        });
        let listener = Listener::open(&ephemeral(handler).with_limit(1), Bus::new(64))
            .await
            .unwrap();

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(TcpStream::connect(listener.local_addr()).await.unwrap());
        }
        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        listener.close().await.unwrap();
    }
}
