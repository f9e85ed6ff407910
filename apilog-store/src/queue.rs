use apilog_core::config::{DeliveryConfig, OverflowPolicy};
use apilog_core::record::StoredRecord;
use apilog_observability::DeliveryMetrics;
use crossbeam_channel::{SendTimeoutError, Sender, TrySendError};
use std::time::Duration;
use tracing::debug;

/// Why a record was not accepted by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Queue at capacity (immediately, or after the bounded wait).
    QueueFull,
    /// Consumer has stopped.
    Disconnected,
    /// Queue created with [`DeliveryQueue::disabled`].
    Disabled,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::QueueFull => "queue_full",
            DropReason::Disconnected => "disconnected",
            DropReason::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    Dropped(DropReason),
}

impl SubmitOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, SubmitOutcome::Enqueued)
    }
}

/// Producer handle for the delivery queue.
///
/// Cloneable and shareable across request tasks. `submit` never returns an
/// error and never waits longer than the configured block timeout.
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: Option<Sender<StoredRecord>>,
    overflow: OverflowPolicy,
    block_timeout: Duration,
    metrics: Option<DeliveryMetrics>,
}

impl DeliveryQueue {
    pub(crate) fn new(
        sender: Sender<StoredRecord>,
        config: &DeliveryConfig,
        metrics: DeliveryMetrics,
    ) -> Self {
        Self {
            sender: Some(sender),
            overflow: config.overflow,
            block_timeout: config.block_timeout(),
            metrics: Some(metrics),
        }
    }

    /// A queue that drops every record. Used when persistence is off.
    pub fn disabled() -> Self {
        Self {
            sender: None,
            overflow: OverflowPolicy::Drop,
            block_timeout: Duration::ZERO,
            metrics: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Records currently waiting for the consumer.
    pub fn len(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn submit(&self, record: StoredRecord) -> SubmitOutcome {
        let Some(ref sender) = self.sender else {
            return SubmitOutcome::Dropped(DropReason::Disabled);
        };

        let result = match self.overflow {
            OverflowPolicy::Drop => sender.try_send(record).map_err(|e| match e {
                TrySendError::Full(_) => DropReason::QueueFull,
                TrySendError::Disconnected(_) => DropReason::Disconnected,
            }),
            OverflowPolicy::Block => sender
                .send_timeout(record, self.block_timeout)
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => DropReason::QueueFull,
                    SendTimeoutError::Disconnected(_) => DropReason::Disconnected,
                }),
        };

        match result {
            Ok(()) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.records_enqueued.inc();
                    metrics.queue_depth.set(sender.len() as i64);
                }
                SubmitOutcome::Enqueued
            }
            Err(reason) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.record_dropped(reason.as_str());
                }
                debug!(reason = %reason, "Log record dropped");
                SubmitOutcome::Dropped(reason)
            }
        }
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("enabled", &self.is_enabled())
            .field("overflow", &self.overflow)
            .field("len", &self.len())
            .finish()
    }
}
