//! # Example: echo_pool
//!
//! Three worker processes share one TCP port (`SO_REUSEPORT`) and echo
//! whatever clients send.
//!
//! Shows how to:
//! - Embed a listener with [`ListenerConfig`] and a [`ConnectionFn`] handler
//! - Tell pool members apart in [`Hooks::do_init`]
//! - Stop the whole pool: Ctrl-C is graceful, `kill <parent pid>` (SIGTERM) is forced
//!
//! ## Run
//! ```bash
//! cargo run --example echo_pool
//! # in another terminal
//! nc 127.0.0.1 9000
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use procvisor::{
    Connection, ConnectionFn, HookError, Hooks, ListenerConfig, LogWriter, ProcessInfo,
    Subscribe, Worker,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Banner;

#[async_trait]
impl Hooks for Banner {
    async fn do_init(&self, info: &ProcessInfo) -> Result<(), HookError> {
        println!(
            "member {}/{} is pid {}",
            info.index + 1,
            info.worker_count,
            info.pid
        );
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), HookError> {
        println!("pid {} saying goodbye", std::process::id());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("procvisor=debug")),
        )
        .init();

    let echo = ConnectionFn::arc(|mut conn: Connection| async move {
        let greeting = format!("hello from pid {}\n", std::process::id());
        conn.writer.write_all(greeting.as_bytes()).await?;

        let mut buf = [0u8; 1024];
        loop {
            let n = tokio::select! {
                _ = conn.shutdown.cancelled() => return Ok(()),
                n = conn.reader.read(&mut buf) => n?,
            };
            if n == 0 {
                return Ok(());
            }
            conn.writer.write_all(&buf[..n]).await?;
        }
    });

    let listener = ListenerConfig::new(echo)
        .with_addr("127.0.0.1", 9000)
        .with_limit(16)
        .with_reuse(Some(true), Some(true))
        .with_timeouts(None, Some(Duration::from_secs(2)));

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let worker = Worker::builder(Vec::new())
        .with_listener(listener)
        .with_hooks(Arc::new(Banner))
        .with_subscribers(subs)
        .build();

    worker.run(3)?;
    Ok(())
}
