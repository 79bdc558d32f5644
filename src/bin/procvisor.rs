//! Runs a pool of heartbeat/echo workers.
//!
//! Every worker process prints one `state=RUNNING pid=<pid>` line once it is
//! running and one `state=STOPPED pid=<pid>` line when it stops, plus
//! `on_start`/`on_stop` lines from its hooks. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use procvisor::{
    Connection, ConnectionFn, Event, EventKind, HookError, Hooks, ListenerConfig, LogWriter,
    Signal, Subscribe, TaskContext, TaskError, TaskFn, TaskRef, Worker, WorkerConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

/// Multi-process worker supervisor demo.
#[derive(Parser)]
#[command(name = "procvisor", about = "Run N heartbeat/echo worker processes")]
struct Cli {
    /// Number of worker processes
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Listener host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listener port (0 = ephemeral port per worker)
    #[arg(long, default_value_t = 8888)]
    port: u16,

    /// Run without the echo listener
    #[arg(long)]
    no_listener: bool,

    /// Signal that selects the graceful shutdown path (e.g. SIGINT, USR1)
    #[arg(long, default_value = "SIGINT", value_parser = parse_signal)]
    graceful_signal: Signal,

    /// Grace period for cancelled tasks, in milliseconds
    #[arg(long, default_value_t = 100)]
    grace_ms: u64,

    /// Heartbeat interval, in milliseconds
    #[arg(long, default_value_t = 1000)]
    heartbeat_ms: u64,
}

fn parse_signal(s: &str) -> Result<Signal, String> {
    let name = s.to_ascii_uppercase();
    let name = if name.starts_with("SIG") {
        name
    } else {
        format!("SIG{name}")
    };
    name.parse::<Signal>()
        .map_err(|e| format!("unknown signal {s:?}: {e}"))
}

/// Prints hook invocations to stdout.
struct PrintHooks;

#[async_trait]
impl Hooks for PrintHooks {
    async fn on_start(&self) -> Result<(), HookError> {
        println!("on_start pid={}", std::process::id());
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), HookError> {
        println!("on_stop pid={}", std::process::id());
        Ok(())
    }
}

/// Prints state transitions and the bound address to stdout.
struct StatusPrinter;

#[async_trait]
impl Subscribe for StatusPrinter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::WorkerRunning => println!("state=RUNNING pid={}", e.pid),
            EventKind::WorkerStopped => println!("state=STOPPED pid={}", e.pid),
            EventKind::ListenerOpened => {
                if let Some(addr) = e.addr {
                    println!("listening addr={addr} pid={}", e.pid);
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "status"
    }
}

fn heartbeat(every: Duration) -> TaskRef {
    TaskFn::arc("heartbeat", move |ctx: TaskContext| async move {
        let mut beats: u64 = 0;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::info!(beats, "heartbeat cancelled");
                    return Err(TaskError::Canceled);
                }
                _ = tokio::time::sleep(every) => {
                    beats += 1;
                    tracing::debug!(beats, pid = std::process::id(), "heartbeat");
                }
            }
        }
    })
}

fn echo_listener(cli: &Cli) -> ListenerConfig {
    let handler = ConnectionFn::arc(|mut conn: Connection| async move {
        let mut buf = vec![0u8; 4096];
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

    let cfg = ListenerConfig::new(handler)
        .with_addr(cli.host.clone(), cli.port)
        .with_timeouts(None, Some(Duration::from_secs(1)));
    if cli.workers > 1 && cli.port != 0 {
        cfg.with_reuse(None, Some(true))
    } else {
        cfg
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = WorkerConfig {
        graceful_signal: cli.graceful_signal,
        grace: Duration::from_millis(cli.grace_ms),
        ..WorkerConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new()), Arc::new(StatusPrinter)];

    let mut builder = Worker::builder(vec![heartbeat(Duration::from_millis(cli.heartbeat_ms))])
        .with_config(cfg)
        .with_hooks(Arc::new(PrintHooks))
        .with_subscribers(subs);
    if !cli.no_listener {
        builder = builder.with_listener(echo_listener(&cli));
    }
    let worker = builder.build();

    tracing::info!(workers = cli.workers, graceful = %cli.graceful_signal, "starting");
    worker.run(cli.workers)?;
    Ok(())
}
