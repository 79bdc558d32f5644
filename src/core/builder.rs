use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;

use crate::{
    config::WorkerConfig,
    core::{
        hooks::{Hooks, NoopHooks},
        worker::Worker,
    },
    listener::ListenerConfig,
    subscribers::Subscribe,
    tasks::TaskRef,
};

/// Builder for constructing a [`Worker`] with optional features.
pub struct WorkerBuilder {
    tasks: Vec<TaskRef>,
    listener: Option<ListenerConfig>,
    cfg: WorkerConfig,
    hooks: Arc<dyn Hooks>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl WorkerBuilder {
    /// Creates a new builder for a worker running `tasks`.
    pub fn new(tasks: Vec<TaskRef>) -> Self {
        Self {
            tasks,
            listener: None,
            cfg: WorkerConfig::default(),
            hooks: Arc::new(NoopHooks),
            subscribers: Vec::new(),
        }
    }

    /// Embeds a listener. The worker owns this copy; it is opened during startup.
    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Replaces the whole runtime configuration.
    pub fn with_config(mut self, cfg: WorkerConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the signal that selects the graceful shutdown path.
    pub fn with_graceful_signal(mut self, signal: Signal) -> Self {
        self.cfg.graceful_signal = signal;
        self
    }

    /// Sets the shutdown grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.cfg.grace = grace;
        self
    }

    /// Installs lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (lifecycle, listener, task failures)
    /// through dedicated units with bounded queues, in every process the worker runs in.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the worker in state `Init`.
    ///
    /// Performs no I/O; may be called outside a Tokio runtime.
    pub fn build(self) -> Arc<Worker> {
        Arc::new(Worker::from_parts(
            self.tasks,
            self.listener,
            self.cfg,
            self.hooks,
            self.subscribers,
        ))
    }
}
