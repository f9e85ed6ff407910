pub mod logging;
pub mod metrics;
pub mod redact;

pub use metrics::DeliveryMetrics;
pub use redact::{MASK, Redactor};
