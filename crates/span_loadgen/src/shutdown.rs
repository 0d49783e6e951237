//! Shutdown utilities for graceful termination.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable signal for stopping a run from outside.
///
/// Once triggered, producers stop enqueueing and workers exit after their
/// current send. Triggering is idempotent and cannot be undone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Triggers shutdown, waking every task waiting in [`cancelled`](Self::cancelled).
    pub fn shutdown(&self) {
        self.tx.send_if_modified(|stopped| !std::mem::replace(stopped, true));
    }

    /// Returns `true` if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once shutdown has been triggered (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // the sender lives in `self`, so the channel cannot close under us
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Either of two signals: the run-wide one and a phase-local one.
#[derive(Debug, Clone)]
pub(crate) struct Halt {
    run: ShutdownSignal,
    phase: ShutdownSignal,
}

impl Halt {
    pub(crate) fn new(run: ShutdownSignal) -> Self {
        Self {
            run,
            phase: ShutdownSignal::new(),
        }
    }

    /// Halts this phase only.
    pub(crate) fn trigger(&self) {
        self.phase.shutdown();
    }

    pub(crate) fn is_set(&self) -> bool {
        self.run.is_shutdown() || self.phase.is_shutdown()
    }

    /// `true` if the run-wide signal fired, as opposed to a phase-local halt.
    pub(crate) fn is_run_shutdown(&self) -> bool {
        self.run.is_shutdown()
    }

    pub(crate) async fn wait(&self) {
        tokio::select! {
            () = self.run.cancelled() => {}
            () = self.phase.cancelled() => {}
        }
    }
}
