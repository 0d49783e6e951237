//! Batch senders and send outcomes.

use crate::batch::Batch;
use crate::error::SendError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Transmits one batch to a remote endpoint.
///
/// Uses native async fn in traits. Implementations must honour `deadline`;
/// the dispatcher additionally cancels calls that overrun it and records them
/// as timeouts.
pub trait BatchSender<P>: Send + Sync {
    /// Sends `batch`, resolving once the remote end has answered.
    fn send(&self, batch: Batch<P>, deadline: Duration) -> impl Future<Output = Result<(), SendError>> + Send;

    /// Returns the sender name for logging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`BatchSender`] for dynamic dispatch.
pub trait BatchSenderBoxed<P>: Send + Sync {
    fn send_boxed(
        &self,
        batch: Batch<P>,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>>;

    fn name(&self) -> &str;
}

impl<P: Send + 'static, T: BatchSender<P>> BatchSenderBoxed<P> for T {
    fn send_boxed(
        &self,
        batch: Batch<P>,
        deadline: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
        Box::pin(self.send(batch, deadline))
    }

    fn name(&self) -> &str {
        BatchSender::name(self)
    }
}

impl<P: Send + 'static> BatchSender<P> for Box<dyn BatchSenderBoxed<P>> {
    fn send(&self, batch: Batch<P>, deadline: Duration) -> impl Future<Output = Result<(), SendError>> + Send {
        self.as_ref().send_boxed(batch, deadline)
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

/// Classification of a finished send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    /// Application-level rejection.
    Failure(String),
    /// The deadline elapsed first.
    Timeout,
    /// The endpoint could not be reached.
    Unavailable(String),
}

/// Result of one send attempt, reported by a worker to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub status: SendStatus,
    /// Wall time spent in the call.
    pub elapsed: Duration,
    /// Records carried by the batch.
    pub records: usize,
}

impl SendOutcome {
    pub fn from_result(result: Result<(), SendError>, elapsed: Duration, records: usize) -> Self {
        let status = match result {
            Ok(()) => SendStatus::Success,
            Err(SendError::Rejected(cause)) => SendStatus::Failure(cause),
            Err(SendError::Timeout) => SendStatus::Timeout,
            Err(SendError::Unavailable(cause)) => SendStatus::Unavailable(cause),
        };
        Self {
            status,
            elapsed,
            records,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}

/// Sender that discards every batch (dry runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSender;

impl<P: Send + 'static> BatchSender<P> for NullSender {
    async fn send(&self, _batch: Batch<P>, _deadline: Duration) -> Result<(), SendError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
