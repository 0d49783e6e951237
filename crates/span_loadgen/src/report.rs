//! Phase and scenario results.
//!
//! [`PhaseTally`] is the accumulator owned by a single aggregation point, so it
//! uses plain integers instead of atomics. It is frozen into an immutable
//! [`PhaseResult`] once a phase has drained.

use crate::sender::{SendOutcome, SendStatus};
use std::fmt;
use std::time::Duration;

/// Statistics for one completed (or halted) phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    /// Batches the plan called for.
    pub planned_batches: u64,
    /// Send attempts made, whatever their outcome.
    pub batches_sent: u64,
    /// Records carried by those attempts.
    pub records_sent: u64,
    /// Wall time from phase start to full drain.
    pub elapsed: Duration,
    /// Rejected sends, including ones that failed to reach the endpoint.
    pub failures: u64,
    pub timeouts: u64,
    /// Longest single send.
    pub max_latency: Duration,
    /// Sum of all send latencies.
    pub total_latency: Duration,
    /// The phase stopped before emitting every planned batch.
    pub cancelled: bool,
}

impl PhaseResult {
    /// Result of a phase that had nothing to send.
    pub fn empty(planned_batches: u64) -> Self {
        Self {
            planned_batches,
            batches_sent: 0,
            records_sent: 0,
            elapsed: Duration::ZERO,
            failures: 0,
            timeouts: 0,
            max_latency: Duration::ZERO,
            total_latency: Duration::ZERO,
            cancelled: false,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Observed records per second over the phase.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed_seconds();
        if secs > 0.0 {
            self.records_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Attempts that neither failed nor timed out.
    pub fn succeeded(&self) -> u64 {
        self.batches_sent - self.failures - self.timeouts
    }

    pub fn mean_latency(&self) -> Duration {
        if self.batches_sent == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency.as_nanos() / u128::from(self.batches_sent);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for PhaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} records in {}/{} batches over {:.2}s (~{:.0} records/s), {} failed, {} timed out, latency mean {:?} max {:?}",
            self.records_sent,
            self.batches_sent,
            self.planned_batches,
            self.elapsed_seconds(),
            self.throughput(),
            self.failures,
            self.timeouts,
            self.mean_latency(),
            self.max_latency,
        )?;
        if self.cancelled {
            write!(f, " [stopped early]")?;
        }
        Ok(())
    }
}

/// Running counters for one phase. Single owner, no synchronization.
#[derive(Debug)]
pub struct PhaseTally {
    planned_batches: u64,
    batches_sent: u64,
    records_sent: u64,
    failures: u64,
    timeouts: u64,
    max_latency: Duration,
    total_latency: Duration,
    consecutive_unavailable: u32,
    last_unavailable: Option<String>,
}

impl PhaseTally {
    pub fn new(planned_batches: u64) -> Self {
        Self {
            planned_batches,
            batches_sent: 0,
            records_sent: 0,
            failures: 0,
            timeouts: 0,
            max_latency: Duration::ZERO,
            total_latency: Duration::ZERO,
            consecutive_unavailable: 0,
            last_unavailable: None,
        }
    }

    /// Accounts for one finished send.
    pub fn record(&mut self, outcome: &SendOutcome) {
        self.batches_sent += 1;
        self.records_sent += outcome.records as u64;
        self.total_latency += outcome.elapsed;
        self.max_latency = self.max_latency.max(outcome.elapsed);

        match &outcome.status {
            SendStatus::Success => {
                self.consecutive_unavailable = 0;
            }
            SendStatus::Failure(_) => {
                self.failures += 1;
                self.consecutive_unavailable = 0;
            }
            SendStatus::Timeout => {
                self.timeouts += 1;
            }
            SendStatus::Unavailable(cause) => {
                self.failures += 1;
                self.consecutive_unavailable += 1;
                self.last_unavailable = Some(cause.clone());
            }
        }
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// Number of `Unavailable` outcomes in a row, reset by any answer from
    /// the endpoint.
    pub fn consecutive_unavailable(&self) -> u32 {
        self.consecutive_unavailable
    }

    pub fn last_unavailable(&self) -> Option<&str> {
        self.last_unavailable.as_deref()
    }

    /// Freezes the tally into a [`PhaseResult`].
    pub fn finish(self, elapsed: Duration) -> PhaseResult {
        PhaseResult {
            planned_batches: self.planned_batches,
            batches_sent: self.batches_sent,
            records_sent: self.records_sent,
            elapsed,
            failures: self.failures,
            timeouts: self.timeouts,
            max_latency: self.max_latency,
            total_latency: self.total_latency,
            cancelled: self.batches_sent < self.planned_batches,
        }
    }
}

/// Results of a whole scenario, one entry per phase that ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub phases: Vec<PhaseResult>,
    /// The run was stopped by an external signal.
    pub cancelled: bool,
}

impl ScenarioSummary {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            phases: Vec::new(),
            cancelled: false,
        }
    }

    pub fn total_elapsed(&self) -> Duration {
        self.phases.iter().map(|p| p.elapsed).sum()
    }

    pub fn total_batches(&self) -> u64 {
        self.phases.iter().map(|p| p.batches_sent).sum()
    }

    pub fn total_records(&self) -> u64 {
        self.phases.iter().map(|p| p.records_sent).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.phases.iter().map(|p| p.failures).sum()
    }

    pub fn total_timeouts(&self) -> u64 {
        self.phases.iter().map(|p| p.timeouts).sum()
    }
}

impl fmt::Display for ScenarioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Scenario '{}' ===", self.scenario)?;
        for (i, phase) in self.phases.iter().enumerate() {
            writeln!(f, "  phase {}: {}", i + 1, phase)?;
        }
        let elapsed = self.total_elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.total_records() as f64 / elapsed
        } else {
            0.0
        };
        write!(
            f,
            "  total: {} records in {} batches over {:.2}s (~{:.0} records/s), {} failed, {} timed out",
            self.total_records(),
            self.total_batches(),
            elapsed,
            rate,
            self.total_failures(),
            self.total_timeouts(),
        )?;
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: SendStatus, ms: u64) -> SendOutcome {
        SendOutcome {
            status,
            elapsed: Duration::from_millis(ms),
            records: 10,
        }
    }

    #[test]
    fn test_tally_counts_outcomes() {
        let mut tally = PhaseTally::new(4);
        tally.record(&outcome(SendStatus::Success, 5));
        tally.record(&outcome(SendStatus::Failure("bad".into()), 15));
        tally.record(&outcome(SendStatus::Timeout, 100));
        tally.record(&outcome(SendStatus::Success, 20));

        let result = tally.finish(Duration::from_secs(2));
        assert_eq!(result.batches_sent, 4);
        assert_eq!(result.records_sent, 40);
        assert_eq!(result.failures, 1);
        assert_eq!(result.timeouts, 1);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.max_latency, Duration::from_millis(100));
        assert_eq!(result.mean_latency(), Duration::from_millis(35));
        assert_eq!(result.throughput(), 20.0);
        assert!(!result.cancelled);
    }

    #[test]
    fn test_unavailable_streak_resets_on_answer() {
        let mut tally = PhaseTally::new(10);
        tally.record(&outcome(SendStatus::Unavailable("refused".into()), 1));
        tally.record(&outcome(SendStatus::Unavailable("refused".into()), 1));
        assert_eq!(tally.consecutive_unavailable(), 2);
        assert_eq!(tally.last_unavailable(), Some("refused"));

        // a timeout says nothing about reachability
        tally.record(&outcome(SendStatus::Timeout, 1));
        assert_eq!(tally.consecutive_unavailable(), 2);

        tally.record(&outcome(SendStatus::Failure("quota".into()), 1));
        assert_eq!(tally.consecutive_unavailable(), 0);

        let result = tally.finish(Duration::from_secs(1));
        assert_eq!(result.failures, 3);
        assert!(result.cancelled);
    }

    #[test]
    fn test_empty_result() {
        let result = PhaseResult::empty(0);
        assert_eq!(result.throughput(), 0.0);
        assert_eq!(result.mean_latency(), Duration::ZERO);
        assert!(!result.cancelled);
    }

    #[test]
    fn test_summary_totals_and_display() {
        let mut tally = PhaseTally::new(1);
        tally.record(&outcome(SendStatus::Success, 1));
        let mut summary = ScenarioSummary::new("Baseline");
        summary.phases.push(tally.finish(Duration::from_secs(1)));
        summary.phases.push(PhaseResult::empty(0));

        assert_eq!(summary.total_records(), 10);
        assert_eq!(summary.total_batches(), 1);
        assert_eq!(summary.total_elapsed(), Duration::from_secs(1));

        let text = summary.to_string();
        assert!(text.contains("Scenario 'Baseline'"));
        assert!(text.contains("phase 2"));
        assert!(!text.contains("[cancelled]"));
    }
}
