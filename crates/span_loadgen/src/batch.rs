//! Batches and the sources that produce them.

/// One unit of payload sent in a single outbound call.
///
/// A batch is created per send attempt, moved into exactly one worker, and
/// dropped once its outcome is recorded.
#[derive(Debug)]
pub struct Batch<P> {
    payload: P,
    records: usize,
}

impl<P> Batch<P> {
    /// Wraps `payload`, declaring that it carries `records` records.
    pub fn new(payload: P, records: usize) -> Self {
        Self { payload, records }
    }

    /// Number of records (spans) declared for this batch.
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consumes the batch, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }
}

/// Produces batches on demand.
///
/// `next_batch` is called from the dispatcher's producer task only, once per
/// planned emission. It must not fail for a positive `size`; sources may use
/// randomness internally.
pub trait BatchSource: Send + Sync {
    type Payload: Send + 'static;

    /// Builds a batch carrying `size` records.
    fn next_batch(&self, size: usize) -> Batch<Self::Payload>;

    /// Returns the source name for logging.
    fn name(&self) -> &str;
}

/// A source that carries no payload, only a record count.
///
/// Useful for dry runs and tests that only care about pacing.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSource;

impl BatchSource for CountingSource {
    type Payload = ();

    fn next_batch(&self, size: usize) -> Batch<()> {
        Batch::new((), size)
    }

    fn name(&self) -> &str {
        "counting"
    }
}
