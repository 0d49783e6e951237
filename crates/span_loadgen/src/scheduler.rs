//! Rate Scheduling
//!
//! Turns a [`Phase`] into a [`RatePlan`] (how many batches, how far apart) and
//! provides the [`Pacer`] abstraction the dispatcher's producer awaits between
//! enqueues. Pacing is kept behind a trait so interval, token-bucket or
//! adaptive strategies can be swapped in without touching the dispatcher.

use crate::error::PhaseError;
use crate::phase::Phase;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Emission plan for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    /// Number of batches the phase emits.
    pub total_batches: u64,
    /// Average target spacing between two batch emissions.
    pub interval: Duration,
}

impl RatePlan {
    /// Computes the plan for `phase`.
    ///
    /// A phase whose rate × duration is smaller than one batch yields a valid
    /// plan with zero batches.
    pub fn for_phase(phase: &Phase) -> Result<Self, PhaseError> {
        phase.validate()?;

        let total_batches = phase.total_records() / phase.batch_size as u64;
        let interval = Duration::try_from_secs_f64(phase.batch_size as f64 / phase.target_rate)
            .unwrap_or(Duration::MAX);

        Ok(Self {
            total_batches,
            interval,
        })
    }

    /// Records covered by the plan for the given batch size.
    pub fn total_records(&self, batch_size: usize) -> u64 {
        self.total_batches * batch_size as u64
    }

    /// Time the producer needs to emit every batch at the nominal pace.
    ///
    /// The first emission happens immediately, so this is one interval short
    /// of `total_batches * interval`.
    pub fn emission_span(&self) -> Duration {
        let gaps = self.total_batches.saturating_sub(1);
        self.interval
            .checked_mul(u32::try_from(gaps).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Builds the pacer that realizes this plan.
    pub fn pacer(&self) -> IntervalPacer {
        IntervalPacer::new(self.interval)
    }
}

/// Paces a sequence of emissions.
///
/// Implementors are awaited once before each emission.
pub trait Pacer: Send {
    /// Wait until the next emission is due.
    fn wait(&mut self) -> impl Future<Output = ()> + Send;

    /// Returns the emission rate per second, if bounded.
    fn target_rate(&self) -> Option<f64> {
        None
    }
}

/// Interval-based pacer using `tokio::time::Interval`.
///
/// The first tick completes immediately. Missed ticks are replayed in a burst
/// so the average rate holds after the producer was blocked on a full queue.
pub struct IntervalPacer {
    interval: Option<Interval>,
    rate_per_sec: f64,
}

impl IntervalPacer {
    /// Create a pacer with a fixed period between emissions.
    ///
    /// A zero period yields to the runtime on every wait and never sleeps.
    pub fn new(period: Duration) -> Self {
        if period.is_zero() {
            return Self {
                interval: None,
                rate_per_sec: f64::INFINITY,
            };
        }

        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        Self {
            interval: Some(interval),
            rate_per_sec: 1.0 / period.as_secs_f64(),
        }
    }

    /// Create an unbounded pacer.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Pacer for IntervalPacer {
    async fn wait(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => tokio::task::yield_now().await,
        }
    }

    fn target_rate(&self) -> Option<f64> {
        if self.rate_per_sec.is_infinite() {
            None
        } else {
            Some(self.rate_per_sec)
        }
    }
}
