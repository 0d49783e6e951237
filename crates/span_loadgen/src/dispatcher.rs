//! Phase Dispatcher
//!
//! Runs one phase as a producer → bounded queue → worker pool pipeline:
//!
//! ```text
//!             ┌──────────┐  Batch/Stop  ┌─────────────┐   send()   ┌────────┐
//!  pacer ───► │ producer │ ───────────► │ worker × N  │ ─────────► │ Sender │
//!             └──────────┘  (bounded)   └─────────────┘            └────────┘
//!                                              │ SendOutcome
//!                                              ▼
//!                                      ┌──────────────┐
//!                                      │  aggregator  │ (run_phase itself)
//!                                      └──────────────┘
//! ```
//!
//! - Pacing lives only in the producer. Workers never sleep, so the time a
//!   send takes does not change the time between enqueues.
//! - The queue holds at most `concurrency × queue_depth_factor` batches. When
//!   workers fall behind, the producer blocks on enqueue instead of buffering.
//! - Each of the `concurrency` workers has at most one send in flight.
//! - Outcomes travel over a channel to the aggregator, which alone owns the
//!   counters.
//! - `run_phase` returns only after the producer and every worker have been
//!   joined.

use crate::batch::{Batch, BatchSource};
use crate::error::{DispatchError, SendError};
use crate::invariants::{debug_assert_drained, debug_assert_within_plan};
use crate::phase::Phase;
use crate::report::{PhaseResult, PhaseTally};
use crate::scheduler::{Pacer, RatePlan};
use crate::sender::{BatchSender, SendOutcome};
use crate::shutdown::{Halt, ShutdownSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for phase dispatch.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline for a single send.
    ///
    /// Default: 10s
    pub send_timeout: Duration,

    /// Queue capacity as a multiple of the phase's concurrency.
    ///
    /// Default: 2
    pub queue_depth_factor: usize,

    /// Consecutive `Unavailable` outcomes after which the phase is halted
    /// and the endpoint reported as lost.
    ///
    /// Default: 5
    pub unavailable_threshold: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
            queue_depth_factor: 2,
            unavailable_threshold: 5,
        }
    }
}

impl DispatcherConfig {
    /// Sets the per-send deadline.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the queue depth factor (clamped to at least 1).
    pub fn with_queue_depth_factor(mut self, factor: usize) -> Self {
        self.queue_depth_factor = factor.max(1);
        self
    }

    /// Sets the unavailability threshold (clamped to at least 1).
    pub fn with_unavailable_threshold(mut self, threshold: u32) -> Self {
        self.unavailable_threshold = threshold.max(1);
        self
    }

    fn queue_capacity(&self, concurrency: usize) -> usize {
        concurrency.saturating_mul(self.queue_depth_factor).max(1)
    }
}

/// Item on the production queue.
enum WorkItem<P> {
    Batch(Batch<P>),
    /// Termination marker, one per worker.
    Stop,
}

/// Runs phases against a batch source and a sender.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatcherConfig,
    shutdown: ShutdownSignal,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Uses `signal` as the external cancellation signal.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Returns a handle that cancels any phase run by this dispatcher.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs one phase to completion.
    ///
    /// Issues exactly `RatePlan::total_batches` send attempts unless the run
    /// is cancelled or the endpoint is lost. Failed and timed-out sends are
    /// counted in the result, never returned as errors.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the batch source or the sender after the
    /// remaining tasks have drained.
    pub async fn run_phase<S, T>(
        &self,
        phase: &Phase,
        source: Arc<S>,
        sender: Arc<T>,
    ) -> Result<PhaseResult, DispatchError>
    where
        S: BatchSource + ?Sized + 'static,
        T: BatchSender<S::Payload> + 'static,
    {
        let plan = RatePlan::for_phase(phase)?;
        self.run_plan(phase, plan, source, sender).await
    }

    /// Runs a phase whose plan has already been computed and validated.
    pub(crate) async fn run_plan<S, T>(
        &self,
        phase: &Phase,
        plan: RatePlan,
        source: Arc<S>,
        sender: Arc<T>,
    ) -> Result<PhaseResult, DispatchError>
    where
        S: BatchSource + ?Sized + 'static,
        T: BatchSender<S::Payload> + 'static,
    {
        if plan.total_batches == 0 {
            debug!(rate = phase.target_rate, duration = phase.duration_seconds, "phase plans no batches");
            return Ok(PhaseResult::empty(0));
        }

        let workers = phase.concurrency;
        let halt = Halt::new(self.shutdown.clone());
        let (queue_tx, queue_rx) = mpsc::channel(self.config.queue_capacity(workers));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (report_tx, mut report_rx) = mpsc::channel::<SendOutcome>(workers);

        debug!(
            batches = plan.total_batches,
            interval = ?plan.interval,
            workers,
            source = source.name(),
            sender = sender.name(),
            "dispatching phase"
        );

        let start = Instant::now();

        let producer = tokio::spawn(produce(
            Arc::clone(&source),
            plan,
            phase.batch_size,
            workers,
            queue_tx,
            halt.clone(),
        ));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(work(
                id,
                Arc::clone(&queue_rx),
                Arc::clone(&sender),
                self.config.send_timeout,
                report_tx.clone(),
                halt.clone(),
            ));
        }
        // workers hold the only remaining handles
        drop(report_tx);
        drop(queue_rx);

        let mut tally = PhaseTally::new(plan.total_batches);
        let mut lost = None;
        while let Some(outcome) = report_rx.recv().await {
            tally.record(&outcome);
            debug_assert_within_plan!(tally.batches_sent(), plan.total_batches);

            if lost.is_none() && tally.consecutive_unavailable() >= self.config.unavailable_threshold {
                let cause = tally.last_unavailable().unwrap_or("endpoint unavailable").to_string();
                warn!(
                    consecutive = tally.consecutive_unavailable(),
                    %cause,
                    "endpoint unreachable, halting phase"
                );
                halt.trigger();
                lost = Some(cause);
            }
        }

        // the first panic is re-raised once every task has been joined
        let mut panic = None;
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task failed");
                if e.is_panic() && panic.is_none() {
                    panic = Some(e.into_panic());
                }
            }
        }
        let enqueued = match producer.await {
            Ok(enqueued) => Some(enqueued),
            Err(e) => {
                warn!(error = %e, "producer task failed");
                if e.is_panic() && panic.is_none() {
                    panic = Some(e.into_panic());
                }
                None
            }
        };
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }
        if let Some(enqueued) = enqueued {
            debug_assert_drained!(enqueued, tally.batches_sent(), halt.is_set());
        }
        if halt.is_run_shutdown() {
            debug!(sent = tally.batches_sent(), planned = plan.total_batches, "phase cancelled");
        }

        let result = tally.finish(start.elapsed());
        match lost {
            Some(cause) => Err(DispatchError::TransportUnavailable {
                cause,
                partial: result,
            }),
            None => Ok(result),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

/// Producer task: emits `plan.total_batches` batches at the planned pace,
/// then one `Stop` per worker. Returns the number of batches enqueued.
///
/// On halt it returns early and drops the queue sender, which closes the
/// queue once workers have drained it.
async fn produce<S>(
    source: Arc<S>,
    plan: RatePlan,
    batch_size: usize,
    workers: usize,
    queue: mpsc::Sender<WorkItem<S::Payload>>,
    halt: Halt,
) -> u64
where
    S: BatchSource + ?Sized,
{
    let mut pacer = plan.pacer();
    let mut enqueued = 0;

    while enqueued < plan.total_batches {
        tokio::select! {
            biased;
            () = halt.wait() => return enqueued,
            () = pacer.wait() => {}
        }

        let batch = source.next_batch(batch_size);
        tokio::select! {
            biased;
            () = halt.wait() => return enqueued,
            sent = queue.send(WorkItem::Batch(batch)) => {
                if sent.is_err() {
                    // every worker is gone
                    return enqueued;
                }
            }
        }
        enqueued += 1;
    }

    for _ in 0..workers {
        tokio::select! {
            biased;
            () = halt.wait() => break,
            sent = queue.send(WorkItem::Stop) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    enqueued
}

/// Worker task: takes batches off the shared queue and sends them one at a
/// time until it sees `Stop`, the queue closes, or the phase is halted.
async fn work<P, T>(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem<P>>>>,
    sender: Arc<T>,
    deadline: Duration,
    reports: mpsc::Sender<SendOutcome>,
    halt: Halt,
) where
    P: Send + 'static,
    T: BatchSender<P>,
{
    loop {
        let next = tokio::select! {
            biased;
            () = halt.wait() => None,
            item = async { queue.lock().await.recv().await } => item,
        };

        let batch = match next {
            Some(WorkItem::Batch(batch)) => batch,
            Some(WorkItem::Stop) | None => break,
        };
        // no new send may start once a halt is visible
        if halt.is_set() {
            break;
        }

        let records = batch.records();
        let started = Instant::now();
        let result = match tokio::time::timeout(deadline, sender.send(batch, deadline)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(SendError::Timeout),
        };
        let elapsed = started.elapsed();

        if let Err(e) = &result {
            debug!(worker = id, error = %e, connectivity = e.is_connectivity(), ?elapsed, "send failed");
        }

        if reports
            .send(SendOutcome::from_result(result, elapsed, records))
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CountingSource;
    use crate::error::PhaseError;
    use crate::sender::NullSender;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sender that records how many batches it was handed.
    #[derive(Default)]
    struct CountingSender {
        calls: AtomicU64,
    }

    impl BatchSender<()> for CountingSender {
        async fn send(&self, _batch: Batch<()>, _deadline: Duration) -> Result<(), SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_queue_capacity() {
        let config = DispatcherConfig::default();
        assert_eq!(config.queue_capacity(4), 8);
        assert_eq!(config.with_queue_depth_factor(0).queue_capacity(3), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_phase_sends_planned_batches() {
        let sender = Arc::new(CountingSender::default());
        let result = Dispatcher::default()
            .run_phase(&Phase::new(50.0, 2.0, 5, 3), Arc::new(CountingSource), Arc::clone(&sender))
            .await
            .unwrap();

        assert_eq!(sender.calls.load(Ordering::SeqCst), 20);
        assert_eq!(result.batches_sent, 20);
        assert_eq!(result.records_sent, 100);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_invalid_phase_is_rejected() {
        let err = Dispatcher::default()
            .run_phase(&Phase::new(10.0, 1.0, 0, 1), Arc::new(CountingSource), Arc::new(NullSender))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidPhase(PhaseError::NonPositiveBatchSize(0))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_sends_nothing() {
        let dispatcher = Dispatcher::default();
        dispatcher.shutdown_signal().shutdown();

        let sender = Arc::new(CountingSender::default());
        let result = dispatcher
            .run_phase(&Phase::new(100.0, 1.0, 1, 2), Arc::new(CountingSource), Arc::clone(&sender))
            .await
            .unwrap();

        assert_eq!(sender.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.batches_sent, 0);
        assert!(result.cancelled);
    }
}
