//! Background delivery: one consumer thread draining the bounded queue into a
//! [`RecordSink`] in batches.

use crate::queue::DeliveryQueue;
use crate::sink::RecordSink;
use apilog_core::config::DeliveryConfig;
use apilog_core::error::ApiLogError;
use apilog_core::record::StoredRecord;
use apilog_observability::DeliveryMetrics;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const CONSUMER_THREAD_NAME: &str = "apilog-consumer";

/// Totals reported by the consumer when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Records the sink accepted.
    pub flushed: u64,
    /// Records in batches that failed after every retry.
    pub lost: u64,
    /// Records still queued when the shutdown deadline passed.
    pub discarded: u64,
    /// Successful sink writes.
    pub batches: u64,
}

/// Handle to a running consumer thread.
///
/// Dropping the handle stops the consumer the same way [`DeliveryService::stop`] does.
pub struct DeliveryService {
    queue: DeliveryQueue,
    metrics: DeliveryMetrics,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<DeliveryReport>>,
}

impl DeliveryService {
    /// Spawn the consumer with its own metrics registry.
    pub fn start<S: RecordSink>(config: DeliveryConfig, sink: S) -> Result<Self, ApiLogError> {
        let metrics = DeliveryMetrics::new()
            .map_err(|e| ApiLogError::Config(format!("delivery metrics: {e}")))?;
        Self::start_with_metrics(config, sink, metrics)
    }

    pub fn start_with_metrics<S: RecordSink>(
        config: DeliveryConfig,
        sink: S,
        metrics: DeliveryMetrics,
    ) -> Result<Self, ApiLogError> {
        config.validate()?;

        let (records_tx, records_rx) = bounded::<StoredRecord>(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let queue = DeliveryQueue::new(records_tx, &config, metrics.clone());

        let consumer = Consumer {
            records: records_rx,
            shutdown: shutdown_rx,
            sink,
            metrics: metrics.clone(),
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            report: DeliveryReport::default(),
        };

        let handle = thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || consumer.run())?;

        info!(
            capacity = config.queue_capacity,
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            overflow = ?config.overflow,
            "Delivery consumer started"
        );

        Ok(Self {
            queue,
            metrics,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// A new producer handle.
    pub fn queue(&self) -> DeliveryQueue {
        self.queue.clone()
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the consumer to drain.
    ///
    /// Returns once the consumer has flushed what it could within the
    /// shutdown timeout; queued records past that point are discarded.
    pub fn stop(mut self) -> DeliveryReport {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> DeliveryReport {
        // Dropping the sender disconnects the shutdown channel.
        drop(self.shutdown.take());
        let Some(handle) = self.handle.take() else {
            return DeliveryReport::default();
        };
        match handle.join() {
            Ok(report) => {
                info!(
                    flushed = report.flushed,
                    lost = report.lost,
                    discarded = report.discarded,
                    batches = report.batches,
                    "Delivery consumer stopped"
                );
                report
            }
            Err(_) => {
                error!("Delivery consumer panicked");
                DeliveryReport::default()
            }
        }
    }
}

impl Drop for DeliveryService {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown_and_join();
        }
    }
}

struct Consumer<S> {
    records: Receiver<StoredRecord>,
    shutdown: Receiver<()>,
    sink: S,
    metrics: DeliveryMetrics,
    batch_size: usize,
    flush_interval: Duration,
    shutdown_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    report: DeliveryReport,
}

impl<S: RecordSink> Consumer<S> {
    fn run(mut self) -> DeliveryReport {
        let mut batch: Vec<StoredRecord> = Vec::with_capacity(self.batch_size);
        // Set when the first record of the current batch arrives.
        let mut batch_started: Option<Instant> = None;
        let records = self.records.clone();
        let shutdown = self.shutdown.clone();

        loop {
            let wait = match batch_started {
                Some(started) => self.flush_interval.saturating_sub(started.elapsed()),
                None => self.flush_interval,
            };

            select! {
                recv(records) -> msg => match msg {
                    Ok(record) => {
                        if batch.is_empty() {
                            batch_started = Some(Instant::now());
                        }
                        batch.push(record);
                        self.metrics.queue_depth.set(records.len() as i64);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch);
                            batch_started = None;
                        }
                    }
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                default(wait) => {
                    if !batch.is_empty() {
                        debug!(records = batch.len(), "Flush interval elapsed");
                        self.flush(&mut batch);
                    }
                    batch_started = None;
                }
            }
        }

        self.drain(batch);
        if let Err(e) = self.sink.close() {
            warn!(error = %e, "Sink close failed");
        }
        self.metrics.queue_depth.set(0);
        self.report
    }

    /// Flush whatever is queued until the shutdown deadline, then discard.
    fn drain(&mut self, mut batch: Vec<StoredRecord>) {
        let deadline = Instant::now() + self.shutdown_timeout;

        loop {
            if batch.len() >= self.batch_size {
                self.flush(&mut batch);
            }
            if Instant::now() >= deadline {
                break;
            }
            match self.records.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            if Instant::now() < deadline {
                self.flush(&mut batch);
            } else {
                self.report.discarded += batch.len() as u64;
                batch.clear();
            }
        }

        let remaining = self.records.try_iter().count() as u64;
        if remaining > 0 || self.report.discarded > 0 {
            warn!(
                discarded = self.report.discarded + remaining,
                "Shutdown deadline reached, discarding queued records"
            );
        }
        self.report.discarded += remaining;
    }

    /// Write a batch with bounded retries. Always leaves `batch` empty.
    fn flush(&mut self, batch: &mut Vec<StoredRecord>) {
        let count = batch.len();
        let mut attempt: u32 = 0;

        loop {
            match self.sink.write_batch(batch) {
                Ok(()) => {
                    self.metrics.record_flushed(count);
                    self.report.flushed += count as u64;
                    self.report.batches += 1;
                    debug!(records = count, "Batch flushed");
                    break;
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    self.metrics.flush_retries.inc();
                    warn!(error = %e, attempt, records = count, "Sink write failed, retrying");
                    thread::sleep(self.retry_backoff * attempt);
                }
                Err(e) => {
                    self.metrics.record_lost(count);
                    self.report.lost += count as u64;
                    error!(error = %e, attempts = attempt + 1, records = count, "Batch lost");
                    break;
                }
            }
        }
        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(api: &str) -> StoredRecord {
        StoredRecord {
            app_name: "api".into(),
            api: api.into(),
            headers: "{}".into(),
            body: String::new(),
            method: "POST".into(),
            client_ip_address: "127.0.0.1".into(),
            response: String::new(),
            status_code: 201,
            execution_time: 0.002,
            added_on: Utc::now(),
        }
    }

    fn config(batch_size: usize, flush_interval_ms: u64) -> DeliveryConfig {
        DeliveryConfig {
            batch_size,
            flush_interval_ms,
            retry_backoff_ms: 1,
            ..DeliveryConfig::default()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = DeliveryService::start(config(0, 10), MemorySink::new());
        assert!(matches!(result, Err(ApiLogError::Config(_))));
        let result = DeliveryService::start(config(10, 0), MemorySink::new());
        assert!(matches!(result, Err(ApiLogError::Config(_))));
    }

    #[test]
    fn full_batch_flushes_before_interval() {
        let sink = MemorySink::new();
        let service = DeliveryService::start(config(3, 60_000), sink.clone()).unwrap();
        let queue = service.queue();
        for i in 0..3 {
            assert!(queue.submit(record(&format!("/r{i}"))).is_enqueued());
        }
        assert!(wait_for(|| sink.len() == 3));
        let report = service.stop();
        assert_eq!(report.flushed, 3);
        assert_eq!(report.batches, 1);
    }

    #[test]
    fn partial_batch_flushes_on_interval() {
        let sink = MemorySink::new();
        let service = DeliveryService::start(config(100, 20), sink.clone()).unwrap();
        service.queue().submit(record("/only"));
        assert!(wait_for(|| sink.len() == 1));
        assert!(service.is_running());
        service.stop();
    }

    #[test]
    fn stop_drains_pending_records() {
        let sink = MemorySink::new();
        let service = DeliveryService::start(config(1000, 60_000), sink.clone()).unwrap();
        let queue = service.queue();
        for i in 0..25 {
            queue.submit(record(&format!("/r{i}")));
        }
        let report = service.stop();
        assert_eq!(report.flushed, 25);
        assert_eq!(report.discarded, 0);
        assert_eq!(sink.len(), 25);
    }

    #[test]
    fn transient_sink_failure_is_retried() {
        let sink = MemorySink::new();
        let failures = Arc::new(AtomicU32::new(0));
        let mut inner = sink.clone();
        let counter = failures.clone();
        let flaky = move |batch: &[StoredRecord]| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ApiLogError::Sink("database unavailable".into()));
            }
            inner.write_batch(batch)
        };

        let service = DeliveryService::start(config(2, 60_000), flaky).unwrap();
        let metrics = service.metrics().clone();
        service.queue().submit(record("/a"));
        service.queue().submit(record("/b"));
        let report = service.stop();

        assert_eq!(report.flushed, 2);
        assert_eq!(report.lost, 0);
        assert_eq!(metrics.flush_retries.get(), 1);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn exhausted_retries_count_batch_as_lost() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let broken = move |_: &[StoredRecord]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ApiLogError::Sink("disk full".into()))
        };
        let mut cfg = config(2, 60_000);
        cfg.max_retries = 2;

        let service = DeliveryService::start(cfg, broken).unwrap();
        let metrics = service.metrics().clone();
        service.queue().submit(record("/a"));
        service.queue().submit(record("/b"));
        let report = service.stop();

        assert_eq!(report.lost, 2);
        assert_eq!(report.flushed, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.records_lost.get(), 2);
    }

    #[test]
    fn non_retryable_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let broken = move |_: &[StoredRecord]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ApiLogError::Config("bad mapping".into()))
        };
        let service = DeliveryService::start(config(1, 60_000), broken).unwrap();
        service.queue().submit(record("/a"));
        let report = service.stop();
        assert_eq!(report.lost, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_is_disconnected_after_stop() {
        let service = DeliveryService::start(config(10, 60_000), MemorySink::new()).unwrap();
        let queue = service.queue();
        service.stop();
        assert!(!queue.submit(record("/late")).is_enqueued());
    }

    #[test]
    fn drop_stops_consumer() {
        let sink = MemorySink::new();
        {
            let service = DeliveryService::start(config(100, 60_000), sink.clone()).unwrap();
            service.queue().submit(record("/a"));
        }
        assert_eq!(sink.len(), 1);
    }
}
