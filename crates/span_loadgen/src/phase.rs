//! Phase and scenario definitions.

use crate::error::PhaseError;

/// One segment of a scenario with a fixed rate, duration, batch size and
/// concurrency.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    /// Target records (spans) per second.
    pub target_rate: f64,
    pub duration_seconds: f64,
    /// Records carried by each batch.
    pub batch_size: usize,
    /// Number of worker tasks, and so the bound on in-flight sends.
    pub concurrency: usize,
}

impl Phase {
    pub fn new(target_rate: f64, duration_seconds: f64, batch_size: usize, concurrency: usize) -> Self {
        Self {
            target_rate,
            duration_seconds,
            batch_size,
            concurrency,
        }
    }

    /// Checks the constraints every schedulable phase must satisfy.
    pub fn validate(&self) -> Result<(), PhaseError> {
        if !(self.target_rate.is_finite() && self.target_rate > 0.0) {
            return Err(PhaseError::NonPositiveRate(self.target_rate));
        }
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(PhaseError::NonPositiveDuration(self.duration_seconds));
        }
        if self.batch_size == 0 {
            return Err(PhaseError::NonPositiveBatchSize(0));
        }
        if self.concurrency == 0 {
            return Err(PhaseError::NonPositiveConcurrency(0));
        }
        Ok(())
    }

    /// `floor(target_rate * duration_seconds)`.
    pub fn total_records(&self) -> u64 {
        (self.target_rate * self.duration_seconds).floor() as u64
    }
}

/// A named, ordered sequence of phases.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, phases: Vec<Phase>) -> Self {
        Self {
            name: name.into(),
            phases,
        }
    }

    /// A scenario made of exactly one phase.
    pub fn single(name: impl Into<String>, phase: Phase) -> Self {
        Self::new(name, vec![phase])
    }

    /// Sum of the phases' nominal durations, in seconds.
    pub fn nominal_duration(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_seconds).sum()
    }
}
