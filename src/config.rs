//! # Worker runtime configuration.
//!
//! Provides [`WorkerConfig`], the settings shared by every process of a pool.
//!
//! ## Sentinel values
//! - `grace = 0s` → do not wait for cancelled units before `Stopped`
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use nix::sys::signal::Signal;

/// Global configuration for a worker and the pool that replicates it.
///
/// ## Field semantics
/// - `graceful_signal`: the one signal that selects the graceful shutdown path
/// - `grace`: upper bound on the wait for cancelled units (`0s` = no wait)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `relay_signals`: signals the pool forwards to its members
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Signal treated as a graceful stop request. Every other relayed signal forces shutdown.
    pub graceful_signal: Signal,

    /// Grace period between listener teardown and the `Stopped` state.
    ///
    /// The worker waits until every scheduled unit has finished or `grace` elapses,
    /// whichever comes first. Units still alive afterwards are aborted.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Termination signals routed to each worker process.
    ///
    /// The pool parent forwards these to its members; every member listens for them.
    /// `graceful_signal` is always included, see [`WorkerConfig::stop_signals`].
    pub relay_signals: Vec<Signal>,
}

impl WorkerConfig {
    /// Returns the grace period as an `Option`.
    ///
    /// - `None` → no wait
    /// - `Some(d)` → bounded wait for cancelled units
    #[inline]
    pub fn grace_period(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the deduplicated set of signals a worker process reacts to.
    pub fn stop_signals(&self) -> Vec<Signal> {
        let mut signals = vec![self.graceful_signal];
        for sig in &self.relay_signals {
            if !signals.contains(sig) {
                signals.push(*sig);
            }
        }
        signals
    }
}

impl Default for WorkerConfig {
    /// Default configuration:
    ///
    /// - `graceful_signal = SIGINT`
    /// - `grace = 100ms`
    /// - `bus_capacity = 1024`
    /// - `relay_signals = [SIGINT, SIGTERM, SIGQUIT]`
    fn default() -> Self {
        Self {
            graceful_signal: Signal::SIGINT,
            grace: Duration::from_millis(100),
            bus_capacity: 1024,
            relay_signals: vec![Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signals_always_include_the_graceful_one() {
        let cfg = WorkerConfig {
            graceful_signal: Signal::SIGUSR1,
            relay_signals: vec![Signal::SIGTERM, Signal::SIGUSR1],
            ..WorkerConfig::default()
        };
        assert_eq!(cfg.stop_signals(), vec![Signal::SIGUSR1, Signal::SIGTERM]);
    }

    #[test]
    fn zero_grace_means_no_wait() {
        let cfg = WorkerConfig {
            grace: Duration::ZERO,
            bus_capacity: 0,
            ..WorkerConfig::default()
        };
        assert!(cfg.grace_period().is_none());
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
