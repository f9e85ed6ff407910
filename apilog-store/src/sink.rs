use apilog_core::error::ApiLogError;
use apilog_core::record::StoredRecord;
use std::sync::{Arc, Mutex, PoisonError};

/// Destination for flushed batches.
///
/// Owned by the consumer thread; only that thread ever calls it, so
/// implementations need `Send` but not `Sync`.
pub trait RecordSink: Send + 'static {
    /// Persist one batch. An `Err` that [`ApiLogError::is_retryable`] is retried.
    fn write_batch(&mut self, batch: &[StoredRecord]) -> Result<(), ApiLogError>;

    /// Called once when the consumer shuts down.
    fn close(&mut self) -> Result<(), ApiLogError> {
        Ok(())
    }
}

impl<F> RecordSink for F
where
    F: FnMut(&[StoredRecord]) -> Result<(), ApiLogError> + Send + 'static,
{
    fn write_batch(&mut self, batch: &[StoredRecord]) -> Result<(), ApiLogError> {
        self(batch)
    }
}

impl RecordSink for Box<dyn RecordSink> {
    fn write_batch(&mut self, batch: &[StoredRecord]) -> Result<(), ApiLogError> {
        (**self).write_batch(batch)
    }

    fn close(&mut self) -> Result<(), ApiLogError> {
        (**self).close()
    }
}

/// In-memory sink; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<StoredRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn write_batch(&mut self, batch: &[StoredRecord]) -> Result<(), ApiLogError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Ok(())
    }
}
