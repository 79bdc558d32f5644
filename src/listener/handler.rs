//! # Per-connection callback and security context.
//!
//! [`ConnectionHandler`] is the capability a listener invokes once per accepted
//! connection, handing over the connection's input and output streams.
//! [`ConnectionFn`] adapts a closure, the way [`TaskFn`](crate::TaskFn) adapts tasks.
//!
//! [`SecureTransport`] is the optional security context: it receives the raw TCP
//! stream and returns the stream the handler should talk through (e.g. a TLS session).

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Byte stream a handler reads from and writes to.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased connection stream.
pub type BoxStream = Box<dyn AsyncStream>;

/// One accepted connection.
pub struct Connection {
    /// Input stream.
    pub reader: ReadHalf<BoxStream>,
    /// Output stream.
    pub writer: WriteHalf<BoxStream>,
    /// Remote address.
    pub peer: SocketAddr,
    /// Cancelled when the listener starts closing; handlers should finish up.
    pub shutdown: CancellationToken,
}

/// Callback invoked once per accepted connection.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection to completion.
    ///
    /// Errors are published as `ConnectionFailed` and never affect the listener.
    async fn on_connection(&self, conn: Connection) -> io::Result<()>;
}

/// Shared handle to a connection handler.
pub type HandlerRef = Arc<dyn ConnectionHandler>;

/// Closure-backed connection handler.
///
/// ## Example
/// ```rust
/// use procvisor::{Connection, ConnectionFn, HandlerRef};
/// use tokio::io::AsyncWriteExt;
///
/// let hello: HandlerRef = ConnectionFn::arc(|mut conn: Connection| async move {
///     conn.writer.write_all(b"hello\n").await
/// });
/// # let _ = hello;
/// ```
pub struct ConnectionFn<F> {
    f: F,
}

impl<F> ConnectionFn<F> {
    /// Wraps `f` as a handler.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Self { f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc<Fut>(f: F) -> Arc<Self>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> ConnectionHandler for ConnectionFn<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    async fn on_connection(&self, conn: Connection) -> io::Result<()> {
        (self.f)(conn).await
    }
}

/// Security context applied to every accepted stream before the handler sees it.
///
/// The listener bounds [`handshake`](SecureTransport::handshake) with the configured
/// handshake timeout.
#[async_trait]
pub trait SecureTransport: Send + Sync + 'static {
    /// Performs the handshake and returns the secured stream.
    async fn handshake(&self, stream: TcpStream) -> io::Result<BoxStream>;
}
