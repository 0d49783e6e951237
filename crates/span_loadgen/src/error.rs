//! Error types for load generation.

use crate::report::PhaseResult;
use std::path::PathBuf;
use thiserror::Error;

/// Reasons a phase cannot be scheduled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseError {
    /// Target rate is zero, negative or not finite.
    #[error("spans_per_second must be a positive number, got {0}")]
    NonPositiveRate(f64),

    /// Duration is zero, negative or not finite.
    #[error("duration_seconds must be a positive number, got {0}")]
    NonPositiveDuration(f64),

    #[error("batch_size must be positive, got {0}")]
    NonPositiveBatchSize(i64),

    #[error("concurrency must be at least 1, got {0}")]
    NonPositiveConcurrency(i64),

    /// A required field was absent from the scenario file.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The scenario declares an empty `phases` list.
    #[error("scenario declares no phases")]
    NoPhases,
}

/// Outcome of a single failed send, as reported by a [`BatchSender`].
///
/// [`BatchSender`]: crate::sender::BatchSender
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The remote end received the batch and refused it.
    #[error("batch rejected: {0}")]
    Rejected(String),

    /// The call did not complete before its deadline.
    #[error("send timed out")]
    Timeout,

    /// The endpoint could not be reached at all.
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),
}

impl SendError {
    /// Returns `true` if this error points at a lost connection rather than a
    /// problem with one batch.
    #[inline]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors returned by [`Dispatcher::run_phase`](crate::dispatcher::Dispatcher::run_phase).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid phase: {0}")]
    InvalidPhase(#[from] PhaseError),

    /// The phase was halted because the endpoint stopped answering.
    /// `partial` holds the outcomes accounted before the halt.
    #[error("transport unavailable: {cause}")]
    TransportUnavailable { cause: String, partial: PhaseResult },
}

/// Top-level errors for running a scenario.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("phase {phase} is invalid: {source}")]
    InvalidPhaseConfig {
        phase: usize,
        #[source]
        source: PhaseError,
    },

    #[error("scenario '{0}' not found in config")]
    ScenarioNotFound(String),

    #[error("scenario '{0}' is defined more than once")]
    DuplicateScenario(String),

    /// The scenario aborted because the endpoint was lost. `completed` holds
    /// every phase result collected so far, including the aborted phase.
    #[error("transport unavailable: {cause}")]
    TransportUnavailable {
        cause: String,
        completed: Vec<PhaseResult>,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("template {} contains no spans", path.display())]
    EmptyTemplate { path: PathBuf },

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl LoadError {
    /// Returns `true` for errors detected before any batch is sent.
    pub fn is_config_error(&self) -> bool {
        !matches!(self, Self::TransportUnavailable { .. })
    }

    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_config_error() {
            2
        } else {
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_connectivity() {
        assert!(SendError::Unavailable("refused".into()).is_connectivity());
        assert!(!SendError::Timeout.is_connectivity());
        assert!(!SendError::Rejected("quota".into()).is_connectivity());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LoadError::ScenarioNotFound("x".into()).exit_code(), 2);
        let lost = LoadError::TransportUnavailable {
            cause: "refused".into(),
            completed: Vec::new(),
        };
        assert!(!lost.is_config_error());
        assert_eq!(lost.exit_code(), 3);
    }
}
