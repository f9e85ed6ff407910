use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "apilog";

/// Counters for the record delivery pipeline.
///
/// Cloning is cheap: every clone shares the same underlying series.
#[derive(Clone)]
pub struct DeliveryMetrics {
    registry: Registry,
    pub records_enqueued: IntCounter,
    pub records_dropped: IntCounterVec,
    pub records_flushed: IntCounter,
    pub records_lost: IntCounter,
    pub batches_flushed: IntCounter,
    pub flush_retries: IntCounter,
    pub queue_depth: IntGauge,
}

impl DeliveryMetrics {
    /// Create a collector backed by its own registry.
    pub fn new() -> anyhow::Result<Self> {
        Self::register(Registry::new())
    }

    /// Create a collector and register its series in `registry`, so a host
    /// that already exposes Prometheus metrics can scrape them together.
    pub fn register(registry: Registry) -> anyhow::Result<Self> {
        let records_enqueued = IntCounter::with_opts(
            Opts::new("records_enqueued_total", "Records accepted by the delivery queue")
                .namespace(NAMESPACE),
        )?;
        let records_dropped = IntCounterVec::new(
            Opts::new("records_dropped_total", "Records rejected at enqueue time")
                .namespace(NAMESPACE),
            &["reason"],
        )?;
        let records_flushed = IntCounter::with_opts(
            Opts::new("records_flushed_total", "Records written by the sink").namespace(NAMESPACE),
        )?;
        let records_lost = IntCounter::with_opts(
            Opts::new("records_lost_total", "Records in batches that exhausted their retries")
                .namespace(NAMESPACE),
        )?;
        let batches_flushed = IntCounter::with_opts(
            Opts::new("batches_flushed_total", "Batches written by the sink").namespace(NAMESPACE),
        )?;
        let flush_retries = IntCounter::with_opts(
            Opts::new("flush_retries_total", "Sink write retries").namespace(NAMESPACE),
        )?;
        let queue_depth = IntGauge::with_opts(
            Opts::new("queue_depth", "Records waiting in the delivery queue").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(records_enqueued.clone()))?;
        registry.register(Box::new(records_dropped.clone()))?;
        registry.register(Box::new(records_flushed.clone()))?;
        registry.register(Box::new(records_lost.clone()))?;
        registry.register(Box::new(batches_flushed.clone()))?;
        registry.register(Box::new(flush_retries.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            records_enqueued,
            records_dropped,
            records_flushed,
            records_lost,
            batches_flushed,
            flush_retries,
            queue_depth,
        })
    }

    #[inline]
    pub fn record_dropped(&self, reason: &str) {
        self.records_dropped.with_label_values(&[reason]).inc();
    }

    #[inline]
    pub fn record_flushed(&self, records: usize) {
        self.records_flushed.inc_by(records as u64);
        self.batches_flushed.inc();
    }

    #[inline]
    pub fn record_lost(&self, records: usize) {
        self.records_lost.inc_by(records as u64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or(());
        String::from_utf8(buffer).unwrap_or_default()
    }
}
