pub mod file_sink;
pub mod global;
pub mod queue;
pub mod service;
pub mod sink;

pub use file_sink::JsonLinesSink;
pub use queue::{DeliveryQueue, DropReason, SubmitOutcome};
pub use service::{DeliveryReport, DeliveryService};
pub use sink::{MemorySink, RecordSink};
