//! # Worker: one task set, one optional listener, one lifecycle.
//!
//! A [`Worker`] is the per-process unit of the runtime. It owns the task
//! blueprint, an optional [`ListenerConfig`] and the [`WorkerState`] machine,
//! and drives startup and shutdown around user [`Hooks`].
//!
//! ## Startup (`_run`)
//! ```text
//! do_init(info) ──► WorkerInitialized
//!      │
//!      ▼
//! bind scheduler handle (first writer wins)
//!      ├─► WorkerStarting
//!      ├─► on_start()
//!      ├─► start_web_server()           (no-op without a listener config)
//!      ├─► schedule every task          (TaskScheduled × N, fire-and-forget)
//!      └─► state = Running              (WorkerRunning{count})
//! ```
//!
//! ## Shutdown
//! ```text
//! stop(signal)
//!   ├─ signal == graceful_signal ──► on_stop() ─► cancel units ─► stop_web_server() ─► _stop
//!   └─ any other signal          ──────────────────────────────► stop_web_server() ─► _stop
//!
//! _stop:
//!   wait ≤ grace for units ─┬─ all done   → AllStoppedWithin
//!                           └─ elapsed    → GraceExceeded (graceful path aborts stragglers)
//!   state = Stopped ──► WorkerStopped
//! ```
//!
//! ## Rules
//! - `on_start` completes before the listener opens; the listener opens before any
//!   task is scheduled; `Running` is set only after every task was scheduled.
//! - Cancellation is fire-and-forget: the shutdown path never joins a unit.
//! - The listener is closed and its socket released before `Stopped` is set, on both paths.
//!   Connections still open then are aborted after `shutdown_timeout`, or after `grace`
//!   when the listener config sets none.
//! - A signal that arrives during startup pre-empts it; the state then goes `Init → Stopped`.
//! - `stop` runs at most once; later calls return immediately.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use futures::FutureExt;
use nix::sys::signal::Signal;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{
    config::WorkerConfig,
    core::{
        builder::WorkerBuilder,
        hooks::{Hooks, ProcessInfo},
        pool::{Pool, run_process},
        runner::run_unit,
        shutdown::{HeldSignals, StopSignals},
        state::{StateCell, WorkerState},
    },
    error::{HookError, HookStage, WorkerError, panic_message},
    events::{Bus, Event, EventKind},
    listener::{Listener, ListenerConfig},
    subscribers::{Subscribe, SubscriberSet},
    tasks::{TaskContext, TaskRef},
};

/// A scheduled task unit.
struct Unit {
    name: Arc<str>,
    token: CancellationToken,
    abort: AbortHandle,
}

/// Per-process worker: task set, optional listener and lifecycle state machine.
///
/// Construct with [`Worker::new`] or [`Worker::builder`]; both return an `Arc`
/// because the lifecycle runs concurrently with the signal wait.
pub struct Worker {
    tasks: Vec<TaskRef>,
    listener_cfg: Option<ListenerConfig>,
    cfg: WorkerConfig,
    hooks: Arc<dyn Hooks>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    bus: Bus,

    handle: OnceLock<Handle>,
    listener: AsyncMutex<Option<Listener>>,
    units: Mutex<Vec<Unit>>,
    tracker: TaskTracker,
    scheduled: AtomicUsize,
    state: StateCell,
    stopping: AtomicBool,
}

impl Worker {
    /// Creates a worker in state `Init` with default config and no-op hooks.
    ///
    /// The graceful signal is `SIGINT` and the grace is 100 ms. Use
    /// [`with_shutdown`](Worker::with_shutdown) or [`builder`](Worker::builder) to pick
    /// others. Performs no I/O and schedules nothing.
    pub fn new(tasks: Vec<TaskRef>, listener: Option<ListenerConfig>) -> Arc<Self> {
        let cfg = WorkerConfig::default();
        Self::with_shutdown(tasks, listener, cfg.graceful_signal, cfg.grace)
    }

    /// Creates a worker in state `Init` that treats `graceful_signal` as the graceful
    /// stop request and waits up to `grace` for units on shutdown (`ZERO` skips the wait).
    pub fn with_shutdown(
        tasks: Vec<TaskRef>,
        listener: Option<ListenerConfig>,
        graceful_signal: Signal,
        grace: Duration,
    ) -> Arc<Self> {
        let builder = Self::builder(tasks)
            .with_graceful_signal(graceful_signal)
            .with_grace(grace);
        match listener {
            Some(cfg) => builder.with_listener(cfg).build(),
            None => builder.build(),
        }
    }

    /// Returns a builder for a worker running `tasks`.
    pub fn builder(tasks: Vec<TaskRef>) -> WorkerBuilder {
        WorkerBuilder::new(tasks)
    }

    pub(crate) fn from_parts(
        tasks: Vec<TaskRef>,
        listener_cfg: Option<ListenerConfig>,
        cfg: WorkerConfig,
        hooks: Arc<dyn Hooks>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        Self {
            bus: Bus::new(cfg.bus_capacity_clamped()),
            tasks,
            listener_cfg,
            cfg,
            hooks,
            subscribers,
            handle: OnceLock::new(),
            listener: AsyncMutex::new(None),
            units: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
            scheduled: AtomicUsize::new(0),
            state: StateCell::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Fresh `Init` worker built from the same blueprint (tasks, listener config,
    /// config, hooks, subscribers). Used once per pool member.
    pub fn replicate(&self) -> Arc<Self> {
        Arc::new(Self::from_parts(
            self.tasks.clone(),
            self.listener_cfg.clone(),
            self.cfg.clone(),
            Arc::clone(&self.hooks),
            self.subscribers.clone(),
        ))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Scheduler handle bound by `_run`, `None` before startup.
    pub fn handle(&self) -> Option<&Handle> {
        self.handle.get()
    }

    /// Number of task units scheduled so far.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Address of the open listener.
    ///
    /// `None` when no listener is open, or while one is being opened or closed.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener
            .try_lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(Listener::local_addr))
    }

    /// Subscribes to this worker's raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Runtime configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.cfg
    }

    /// Runs the worker in `worker_count` processes and blocks until all of them exit.
    ///
    /// With `worker_count == 1` the lifecycle runs in the calling process on this
    /// instance. Otherwise a [`Pool`] forks `worker_count` members, each running a
    /// [`replicate`](Worker::replicate) of this worker; this instance stays `Init`.
    ///
    /// Must not be called from within a Tokio runtime.
    pub fn run(self: &Arc<Self>, worker_count: usize) -> Result<(), WorkerError> {
        match worker_count {
            0 => Err(WorkerError::InvalidWorkerCount),
            1 => run_process(Arc::clone(self), ProcessInfo::current(), None),
            n => Pool::new(n, self.cfg.clone())
                .with_subscribers(self.subscribers.clone())
                .run(|_info| self.replicate()),
        }
    }

    /// Runs the full lifecycle in the current runtime, reacting to OS signals.
    ///
    /// Returns once `Stopped` is reached, or with the startup failure that aborted it.
    pub async fn serve(self: &Arc<Self>, info: ProcessInfo) -> Result<(), WorkerError> {
        self.serve_releasing(info, None).await
    }

    /// [`serve`](Worker::serve) for a process that starts with its stop signals held:
    /// they are released once the handlers are registered.
    pub(crate) async fn serve_releasing(
        self: &Arc<Self>,
        info: ProcessInfo,
        held: Option<&HeldSignals>,
    ) -> Result<(), WorkerError> {
        let registered = StopSignals::register(&self.cfg.stop_signals());
        if let Some(held) = held {
            held.release();
        }
        let mut signals = registered.map_err(WorkerError::Signal)?;
        self.serve_until(info, async move { signals.recv().await })
            .await
    }

    /// Like [`serve`](Worker::serve), but the termination signal is whatever `shutdown` yields.
    pub async fn serve_until<S>(
        self: &Arc<Self>,
        info: ProcessInfo,
        shutdown: S,
    ) -> Result<(), WorkerError>
    where
        S: Future<Output = Signal>,
    {
        let fanout_stop = CancellationToken::new();
        let fanout = (!self.subscribers.is_empty()).then(|| {
            SubscriberSet::new(self.subscribers.clone(), self.bus.clone())
                .forward(self.bus.subscribe(), fanout_stop.clone())
        });

        let res = self.lifecycle(info, shutdown).await;

        fanout_stop.cancel();
        if let Some(fanout) = fanout {
            let _ = fanout.await;
        }
        res
    }

    async fn lifecycle<S>(&self, info: ProcessInfo, shutdown: S) -> Result<(), WorkerError>
    where
        S: Future<Output = Signal>,
    {
        self.call_hook(HookStage::Init, self.hooks.do_init(&info))
            .await?;
        self.bus.publish(
            Event::new(EventKind::WorkerInitialized).with_member(info.pid as i32, info.index),
        );

        let mut startup = Box::pin(self.start(Handle::current()));
        tokio::pin!(shutdown);

        let early = tokio::select! {
            res = &mut startup => match res {
                Ok(()) => None,
                Err(e) => {
                    self.abort_startup(&e).await;
                    return Err(e);
                }
            },
            sig = &mut shutdown => Some(sig),
        };
        // Dropping the routine pre-empts an unfinished startup.
        drop(startup);

        let signal = match early {
            Some(sig) => sig,
            None => shutdown.await,
        };
        self.stop(signal).await;
        Ok(())
    }

    /// Main run routine (`_run`): hook, listener, tasks, then `Running`.
    async fn start(&self, handle: Handle) -> Result<(), WorkerError> {
        let handle = self.handle.get_or_init(|| handle).clone();
        self.bus.publish(Event::new(EventKind::WorkerStarting));

        self.call_hook(HookStage::Start, self.hooks.on_start())
            .await?;
        self.start_web_server().await?;
        for task in &self.tasks {
            self.schedule(task, &handle);
        }

        self.state.advance(WorkerState::Running);
        self.bus.publish(Event::new(EventKind::WorkerRunning).with_count(self.scheduled_count()));
        Ok(())
    }

    fn schedule(&self, task: &TaskRef, handle: &Handle) {
        let token = CancellationToken::new();
        let ctx = TaskContext {
            handle: handle.clone(),
            token: token.clone(),
        };
        let name: Arc<str> = Arc::from(task.name());

        self.bus
            .publish(Event::new(EventKind::TaskScheduled).with_task(Arc::clone(&name)));
        let join = self
            .tracker
            .spawn_on(run_unit(Arc::clone(task), ctx, self.bus.clone()), handle);

        self.lock_units().push(Unit {
            name,
            token,
            abort: join.abort_handle(),
        });
        self.scheduled.fetch_add(1, Ordering::AcqRel);
    }

    /// Single entry point for termination.
    ///
    /// The graceful path runs when `signal` equals the configured graceful signal,
    /// the forced path for every other signal. Either way the worker ends `Stopped`.
    pub async fn stop(&self, signal: Signal) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            tracing::debug!(%signal, "shutdown already in progress");
            return;
        }
        let graceful = signal == self.cfg.graceful_signal;
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_signal(signal, graceful));

        if graceful {
            self.graceful_shutdown().await;
        } else {
            self.forced_shutdown().await;
        }
    }

    async fn graceful_shutdown(&self) {
        // HookFailed is already published; shutdown carries on regardless.
        let _ = self
            .call_hook(HookStage::Stop, self.hooks.on_stop())
            .await;
        self.cancel_units();
        self.close_listener().await;
        self.finish(true).await;
    }

    async fn forced_shutdown(&self) {
        self.close_listener().await;
        self.finish(false).await;
    }

    /// Requests cancellation of every unit that has not finished yet. Does not wait.
    fn cancel_units(&self) {
        for unit in self.lock_units().iter() {
            if unit.abort.is_finished() {
                continue;
            }
            unit.token.cancel();
            self.bus
                .publish(Event::new(EventKind::CancelRequested).with_task(Arc::clone(&unit.name)));
        }
    }

    /// Opens the listener. No-op without a listener config or when one is already open.
    ///
    /// Without a `shutdown_timeout` in the listener config, connections are drained
    /// for at most `grace` when the listener closes.
    pub async fn start_web_server(&self) -> Result<(), WorkerError> {
        let Some(cfg) = &self.listener_cfg else {
            return Ok(());
        };
        let mut slot = self.listener.lock().await;
        if slot.is_none() {
            let open = Listener::open_with_drain_limit(cfg, self.bus.clone(), self.cfg.grace);
            *slot = Some(open.await?);
        }
        Ok(())
    }

    /// Closes the listener and waits until its socket is released. No-op when none is open.
    pub async fn stop_web_server(&self) -> Result<(), WorkerError> {
        let mut slot = self.listener.lock().await;
        match slot.take() {
            Some(listener) => listener.close().await,
            None => Ok(()),
        }
    }

    async fn close_listener(&self) {
        if let Err(e) = self.stop_web_server().await {
            tracing::warn!(error = %e, "listener teardown failed");
        }
    }

    /// Terminal step (`_stop`): bounded wait for units, then `Stopped`.
    async fn finish(&self, graceful: bool) {
        self.tracker.close();

        if let Some(grace) = self.cfg.grace_period() {
            match time::timeout(grace, self.tracker.wait()).await {
                Ok(()) => self.bus.publish(Event::new(EventKind::AllStoppedWithin)),
                Err(_) => self.report_stuck(graceful),
            }
        }

        self.state.advance(WorkerState::Stopped);
        self.bus.publish(Event::new(EventKind::WorkerStopped));
    }

    fn report_stuck(&self, abort: bool) {
        let units = self.lock_units();
        let stuck: Vec<&Unit> = units.iter().filter(|u| !u.abort.is_finished()).collect();
        let names = stuck
            .iter()
            .map(|u| u.name.as_ref())
            .collect::<Vec<_>>()
            .join(", ");

        self.bus.publish(
            Event::new(EventKind::GraceExceeded)
                .with_count(stuck.len())
                .with_reason(names),
        );
        if abort {
            for unit in stuck {
                unit.abort.abort();
            }
        }
    }

    /// Releases whatever a failed startup left behind.
    async fn abort_startup(&self, error: &WorkerError) {
        self.close_listener().await;
        self.state.advance(WorkerState::Stopped);
        self.bus
            .publish(Event::new(EventKind::WorkerStopped).with_reason(error.to_string()));
    }

    async fn call_hook<F>(&self, stage: HookStage, fut: F) -> Result<(), WorkerError>
    where
        F: Future<Output = Result<(), HookError>>,
    {
        let error = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        self.bus.publish(
            Event::new(EventKind::HookFailed)
                .with_task(stage.as_str())
                .with_reason(error.clone()),
        );
        Err(WorkerError::Hook { hook: stage, error })
    }

    fn lock_units(&self) -> MutexGuard<'_, Vec<Unit>> {
        self.units.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
