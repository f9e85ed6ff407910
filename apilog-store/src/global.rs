//! Process-wide delivery service.
//!
//! Hosts that cannot thread a [`DeliveryQueue`] through to the interceptor
//! start the service here once at boot and stop it at shutdown. Between the
//! two, [`queue`] and [`submit`] reach the running consumer from anywhere.

use crate::queue::{DeliveryQueue, DropReason, SubmitOutcome};
use crate::service::{DeliveryReport, DeliveryService};
use crate::sink::RecordSink;
use apilog_core::config::DeliveryConfig;
use apilog_core::error::ApiLogError;
use apilog_core::record::StoredRecord;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

static ACTIVE: Mutex<Option<DeliveryService>> = Mutex::new(None);
static QUEUE: ArcSwapOption<DeliveryQueue> = ArcSwapOption::const_empty();

/// Start the process-wide consumer.
///
/// Fails with [`ApiLogError::AlreadyRunning`] if one is already active.
pub fn start<S: RecordSink>(config: DeliveryConfig, sink: S) -> Result<DeliveryQueue, ApiLogError> {
    let mut active = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
    if active.is_some() {
        return Err(ApiLogError::AlreadyRunning);
    }
    let service = DeliveryService::start(config, sink)?;
    let queue = service.queue();
    QUEUE.store(Some(Arc::new(queue.clone())));
    *active = Some(service);
    info!("Global delivery service started");
    Ok(queue)
}

/// Producer handle for the running consumer, if any.
pub fn queue() -> Option<DeliveryQueue> {
    QUEUE.load_full().map(|q| (*q).clone())
}

/// Submit through the global queue without cloning a handle.
pub fn submit(record: StoredRecord) -> SubmitOutcome {
    match QUEUE.load().as_ref() {
        Some(queue) => queue.submit(record),
        None => SubmitOutcome::Dropped(DropReason::Disabled),
    }
}

pub fn is_running() -> bool {
    QUEUE.load().is_some()
}

/// Stop the process-wide consumer. `None` if nothing was running.
pub fn stop() -> Option<DeliveryReport> {
    let service = {
        let mut active = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
        let service = active.take()?;
        // Cleared under the lock so a concurrent `start` cannot be unpublished.
        QUEUE.store(None);
        service
    };
    Some(service.stop())
}
