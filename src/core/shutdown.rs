//! # OS termination signal handling.
//!
//! [`StopSignals`] listens for a configured set of signals and reports **which** one
//! arrived, so the worker can branch on signal identity (graceful vs forced).
//!
//! Registration must happen inside a Tokio runtime. Once registered, the process
//! no longer runs the default disposition for these signals.
//!
//! [`HeldSignals`] covers the window before registration: the signals are blocked on
//! the calling thread, stay pending, and are delivered to the handlers on release.

use std::io;

use futures::future::{self, FutureExt};
use nix::sys::signal::{SigSet, Signal};
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};

/// Set of registered termination signal listeners.
pub(crate) struct StopSignals {
    streams: Vec<(Signal, SignalStream)>,
}

impl StopSignals {
    /// Registers a listener for each signal in `signals`.
    ///
    /// Fails for signals that cannot be caught (`SIGKILL`, `SIGSTOP`).
    pub(crate) fn register(signals: &[Signal]) -> io::Result<Self> {
        let streams = signals
            .iter()
            .map(|&sig| Ok((sig, signal(SignalKind::from_raw(sig as i32))?)))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { streams })
    }

    /// Waits for the next registered signal and returns it.
    pub(crate) async fn recv(&mut self) -> Signal {
        loop {
            if self.streams.is_empty() {
                return future::pending().await;
            }
            let waits = self
                .streams
                .iter_mut()
                .map(|(sig, stream)| {
                    let sig = *sig;
                    stream.recv().map(move |got| got.map(|()| sig)).boxed()
                })
                .collect::<Vec<_>>();

            let (got, idx, _) = future::select_all(waits).await;
            match got {
                Some(sig) => return sig,
                None => {
                    self.streams.swap_remove(idx);
                }
            }
        }
    }
}

/// Signals blocked on the calling thread until [`release`](HeldSignals::release).
///
/// The mask is inherited across `fork`, so children start with the same signals held.
pub(crate) struct HeldSignals {
    set: SigSet,
}

impl HeldSignals {
    /// Blocks `signals` on the calling thread.
    pub(crate) fn hold(signals: &[Signal]) -> io::Result<Self> {
        let mut set = SigSet::empty();
        for &sig in signals {
            set.add(sig);
        }
        set.thread_block()?;
        Ok(Self { set })
    }

    /// Unblocks the held signals; pending ones are delivered right away.
    ///
    /// Must run on the thread that called [`hold`](HeldSignals::hold).
    pub(crate) fn release(&self) {
        if let Err(e) = self.set.thread_unblock() {
            tracing::warn!(error = %e, "cannot unblock stop signals");
        }
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    use super::*;

    #[tokio::test]
    async fn reports_the_signal_that_arrived() {
        let mut signals = StopSignals::register(&[Signal::SIGUSR1, Signal::SIGUSR2]).unwrap();
        kill(Pid::this(), Signal::SIGUSR2).unwrap();
        let got = tokio::time::timeout(std::time::Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(got, Signal::SIGUSR2);
    }

    #[test]
    fn held_signal_is_delivered_after_registration() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let held = HeldSignals::hold(&[Signal::SIGUSR1]).unwrap();
            // Thread-directed, so it stays pending on this thread while blocked.
            nix::sys::pthread::pthread_kill(nix::sys::pthread::pthread_self(), Signal::SIGUSR1)
                .unwrap();

            let mut signals = StopSignals::register(&[Signal::SIGUSR1]).unwrap();
            held.release();
            let got = tokio::time::timeout(std::time::Duration::from_secs(5), signals.recv())
                .await
                .unwrap();
            assert_eq!(got, Signal::SIGUSR1);
        });
    }

    #[test]
    fn uncatchable_signals_fail_registration() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            assert!(StopSignals::register(&[Signal::SIGKILL]).is_err());
        });
    }
}
