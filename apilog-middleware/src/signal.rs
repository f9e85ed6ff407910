use apilog_core::record::LogRecord;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

/// Receives every record synchronously on the request task.
///
/// Observers should be quick; slow work belongs behind the delivery queue.
pub trait RecordObserver: Send + Sync {
    fn on_record(&self, record: &LogRecord);
}

impl<F> RecordObserver for F
where
    F: Fn(&LogRecord) + Send + Sync,
{
    fn on_record(&self, record: &LogRecord) {
        self(record)
    }
}

/// Fan-out of records to registered observers.
#[derive(Clone, Default)]
pub struct SignalHub {
    observers: Vec<Arc<dyn RecordObserver>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl RecordObserver + 'static) {
        self.observers.push(Arc::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Call every observer in registration order.
    ///
    /// A panicking observer is logged and skipped; the rest still run.
    /// Returns how many observers completed.
    pub fn dispatch(&self, record: &LogRecord) -> usize {
        let mut delivered = 0;
        for (index, observer) in self.observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_record(record))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(observer = index, api = %record.api, "Record observer panicked"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("observers", &self.observers.len())
            .finish()
    }
}
