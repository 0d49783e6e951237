use span_loadgen::error::{DispatchError, PhaseError, SendError};
use span_loadgen::{Batch, BatchSender, BatchSource, CountingSource, Dispatcher, DispatcherConfig, NullSender, Phase};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Sender that records every call and holds each one for `delay`.
struct RecordingSender {
    delay: Duration,
    calls: AtomicU64,
    records: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl RecordingSender {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicU64::new(0),
            records: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn records(&self) -> u64 {
        self.records.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl BatchSender<()> for RecordingSender {
    async fn send(&self, batch: Batch<()>, _deadline: Duration) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records.fetch_add(batch.records() as u64, Ordering::SeqCst);
        self.started.lock().unwrap().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Rejects every 3rd call and stalls every 5th past any deadline.
struct FlakySender {
    calls: AtomicU64,
}

impl BatchSender<()> for FlakySender {
    async fn send(&self, _batch: Batch<()>, deadline: Duration) -> Result<(), SendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 5 == 0 {
            tokio::time::sleep(deadline * 10).await;
            return Ok(());
        }
        if n % 3 == 0 {
            return Err(SendError::Rejected("quota exceeded".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test(start_paused = true)]
async fn test_exact_batch_count_for_any_concurrency() {
    for concurrency in 1..=8 {
        let sender = Arc::new(RecordingSender::new(Duration::ZERO));
        let result = Dispatcher::default()
            .run_phase(&Phase::new(200.0, 1.0, 4, concurrency), Arc::new(CountingSource), Arc::clone(&sender))
            .await
            .unwrap();

        assert_eq!(sender.calls(), 50, "concurrency {concurrency}");
        assert_eq!(sender.records(), 200);
        assert_eq!(result.batches_sent, 50);
        assert_eq!(result.planned_batches, 50);
        assert_eq!(result.records_sent, 200);
        assert_eq!(result.succeeded(), 50);
        assert!(!result.cancelled);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reference_phase_paces_over_duration() {
    let sender = Arc::new(RecordingSender::new(Duration::ZERO));
    let result = Dispatcher::default()
        .run_phase(&Phase::new(1000.0, 10.0, 100, 4), Arc::new(CountingSource), Arc::clone(&sender))
        .await
        .unwrap();

    assert_eq!(result.batches_sent, 100);
    assert_eq!(result.records_sent, 10_000);
    let elapsed = result.elapsed_seconds();
    assert!((9.5..=10.5).contains(&elapsed), "elapsed {elapsed}");

    // one emission every 100ms
    let started = sender.started.lock().unwrap();
    let span = started[started.len() - 1] - started[0];
    assert!(
        span >= Duration::from_millis(9_800) && span <= Duration::from_millis(10_000),
        "emission span {span:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_sends_bounded_by_concurrency() {
    let sender = Arc::new(RecordingSender::new(Duration::from_millis(200)));
    let result = Dispatcher::default()
        .run_phase(&Phase::new(100.0, 1.0, 1, 4), Arc::new(CountingSource), Arc::clone(&sender))
        .await
        .unwrap();

    assert_eq!(result.batches_sent, 100);
    assert_eq!(sender.max_in_flight(), 4);
    // 100 sends of 200ms on 4 workers cannot finish in the nominal second
    assert!(result.elapsed >= Duration::from_millis(4_900), "elapsed {:?}", result.elapsed);
    assert!(result.max_latency >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_phase_drains_before_returning() {
    let sender = Arc::new(RecordingSender::new(Duration::from_millis(50)));
    let source = Arc::new(CountingSource);
    Dispatcher::default()
        .run_phase(&Phase::new(40.0, 1.0, 1, 3), Arc::clone(&source), Arc::clone(&sender))
        .await
        .unwrap();

    // every producer and worker task has let go of its handles
    assert_eq!(Arc::strong_count(&sender), 1);
    assert_eq!(Arc::strong_count(&source), 1);
    assert_eq!(sender.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failures_and_timeouts_are_counted_not_raised() {
    let sender = Arc::new(FlakySender {
        calls: AtomicU64::new(0),
    });
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_send_timeout(Duration::from_millis(100)));
    let result = dispatcher
        .run_phase(&Phase::new(30.0, 1.0, 1, 3), Arc::new(CountingSource), Arc::clone(&sender))
        .await
        .unwrap();

    assert_eq!(result.batches_sent, 30);
    assert_eq!(result.timeouts, 6);
    assert_eq!(result.failures, 8);
    assert_eq!(result.succeeded(), 16);
    assert!(!result.cancelled);
}

#[tokio::test]
async fn test_non_positive_rate_is_rejected_before_sending() {
    let sender = Arc::new(RecordingSender::new(Duration::ZERO));
    let err = Dispatcher::default()
        .run_phase(&Phase::new(0.0, 10.0, 1, 1), Arc::new(CountingSource), Arc::clone(&sender))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidPhase(PhaseError::NonPositiveRate(_))));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
    let err = Dispatcher::default()
        .run_phase(&Phase::new(10.0, 1.0, 1, 0), Arc::new(CountingSource), Arc::new(NullSender))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidPhase(PhaseError::NonPositiveConcurrency(0))));
}

#[tokio::test(start_paused = true)]
async fn test_phase_shorter_than_one_batch_sends_nothing() {
    let sender = Arc::new(RecordingSender::new(Duration::ZERO));
    let result = Dispatcher::default()
        .run_phase(&Phase::new(1.0, 0.5, 10, 2), Arc::new(CountingSource), Arc::clone(&sender))
        .await
        .unwrap();

    assert_eq!(result.planned_batches, 0);
    assert_eq!(result.batches_sent, 0);
    assert_eq!(result.elapsed, Duration::ZERO);
    assert!(!result.cancelled);
    assert_eq!(sender.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_streak_halts_phase() {
    struct DownSender;

    impl BatchSender<()> for DownSender {
        async fn send(&self, _batch: Batch<()>, _deadline: Duration) -> Result<(), SendError> {
            Err(SendError::Unavailable("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_unavailable_threshold(3));
    let err = dispatcher
        .run_phase(&Phase::new(10.0, 10.0, 1, 1), Arc::new(CountingSource), Arc::new(DownSender))
        .await
        .unwrap_err();

    match err {
        DispatchError::TransportUnavailable { cause, partial } => {
            assert!(cause.contains("connection refused"));
            assert!(partial.batches_sent >= 3 && partial.batches_sent < 100);
            assert_eq!(partial.failures, partial.batches_sent);
            assert!(partial.cancelled);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Source that fails on its third batch.
struct BrokenSource {
    batches: AtomicU64,
}

impl BatchSource for BrokenSource {
    type Payload = ();

    fn next_batch(&self, size: usize) -> Batch<()> {
        if self.batches.fetch_add(1, Ordering::SeqCst) == 2 {
            panic!("source exhausted");
        }
        Batch::new((), size)
    }

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "source exhausted")]
async fn test_source_panic_is_not_reported_as_success() {
    let source = Arc::new(BrokenSource {
        batches: AtomicU64::new(0),
    });
    let _ = Dispatcher::default()
        .run_phase(&Phase::new(10.0, 1.0, 1, 2), source, Arc::new(NullSender))
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_sender_panic_resurfaces_after_drain() {
    struct PanickingSender {
        calls: AtomicU64,
    }

    impl BatchSender<()> for PanickingSender {
        async fn send(&self, _batch: Batch<()>, _deadline: Duration) -> Result<(), SendError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 4 {
                panic!("sender bug");
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    let sender = Arc::new(PanickingSender {
        calls: AtomicU64::new(0),
    });
    let run = tokio::spawn({
        let sender = Arc::clone(&sender);
        async move {
            Dispatcher::default()
                .run_phase(&Phase::new(10.0, 1.0, 1, 3), Arc::new(CountingSource), sender)
                .await
        }
    });

    let err = run.await.unwrap_err();
    assert!(err.is_panic());
    // the surviving workers kept sending until the plan was exhausted
    assert_eq!(sender.calls.load(Ordering::SeqCst), 10);
    assert_eq!(Arc::strong_count(&sender), 1);
}
