use apilog_core::config::{DeliveryConfig, FileSinkConfig, OverflowPolicy};
use apilog_core::error::ApiLogError;
use apilog_core::record::StoredRecord;
use apilog_store::{DeliveryService, JsonLinesSink, MemorySink, SubmitOutcome};
use chrono::Utc;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

// =============================================================================
// Helper Functions
// =============================================================================

fn record(api: String) -> StoredRecord {
    StoredRecord {
        app_name: "api".to_string(),
        api,
        headers: "{}".to_string(),
        body: String::new(),
        method: "GET".to_string(),
        client_ip_address: "127.0.0.1".to_string(),
        response: String::new(),
        status_code: 200,
        execution_time: 0.001,
        added_on: Utc::now(),
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_n_producers_yield_exactly_n_records() {
    const PRODUCERS: usize = 64;

    let sink = MemorySink::new();
    let config = DeliveryConfig {
        batch_size: 7,
        flush_interval_ms: 5,
        ..DeliveryConfig::default()
    };
    let service = DeliveryService::start(config, sink.clone()).unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|i| {
            let queue = service.queue();
            thread::spawn(move || queue.submit(record(format!("/api/items/{i}"))))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), SubmitOutcome::Enqueued);
    }

    let report = service.stop();
    assert_eq!(report.flushed, PRODUCERS as u64);
    assert_eq!(report.lost + report.discarded, 0);

    let apis: HashSet<String> = sink.records().into_iter().map(|r| r.api).collect();
    assert_eq!(apis.len(), PRODUCERS);
}

#[test]
fn test_block_policy_accepts_with_slow_consumer() {
    let sink = MemorySink::new();
    let config = DeliveryConfig {
        queue_capacity: 2,
        batch_size: 1,
        overflow: OverflowPolicy::Block,
        block_timeout_ms: 1_000,
        ..DeliveryConfig::default()
    };
    let service = DeliveryService::start(config, sink.clone()).unwrap();
    let queue = service.queue();
    for i in 0..20 {
        assert!(queue.submit(record(format!("/r{i}"))).is_enqueued());
    }
    let report = service.stop();
    assert_eq!(report.flushed, 20);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_records_past_shutdown_deadline_are_discarded() {
    const SUBMITTED: u64 = 50;

    let slow_sink = |_: &[StoredRecord]| -> Result<(), ApiLogError> {
        thread::sleep(Duration::from_millis(100));
        Ok(())
    };
    let config = DeliveryConfig {
        batch_size: 1,
        shutdown_timeout_ms: 50,
        ..DeliveryConfig::default()
    };
    let service = DeliveryService::start(config, slow_sink).unwrap();
    let queue = service.queue();
    for i in 0..SUBMITTED {
        assert!(queue.submit(record(format!("/r{i}"))).is_enqueued());
    }

    let report = service.stop();
    assert!(report.discarded > 0);
    assert_eq!(report.lost, 0);
    assert_eq!(report.flushed + report.lost + report.discarded, SUBMITTED);
}

// =============================================================================
// Metrics
// =============================================================================

#[test]
fn test_metrics_track_delivery() {
    let service = DeliveryService::start(
        DeliveryConfig {
            batch_size: 5,
            ..DeliveryConfig::default()
        },
        MemorySink::new(),
    )
    .unwrap();
    let metrics = service.metrics().clone();
    for i in 0..10 {
        service.queue().submit(record(format!("/r{i}")));
    }
    service.stop();

    assert_eq!(metrics.records_enqueued.get(), 10);
    assert_eq!(metrics.records_flushed.get(), 10);
    assert_eq!(metrics.batches_flushed.get(), 2);
    let text = metrics.render();
    assert!(text.contains("apilog_records_flushed_total 10"));
}

// =============================================================================
// File sink end-to-end
// =============================================================================

#[test]
fn test_records_reach_jsonl_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records").join("apilog.jsonl");
    let sink = JsonLinesSink::new(FileSinkConfig {
        file_path: path.clone(),
        max_file_size_bytes: 0,
        max_rotated_files: 0,
    })
    .unwrap();

    let service = DeliveryService::start(DeliveryConfig::default(), sink).unwrap();
    for i in 0..3 {
        service.queue().submit(record(format!("/api/{i}")));
    }
    let report = service.stop();
    assert_eq!(report.flushed, 3);

    let content = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<StoredRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].client_ip_address, "127.0.0.1");
}
