pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod route;
pub mod router;

pub use config::ApiLoggerConfig;
pub use error::ApiLogError;
pub use filter::{ContentKind, FilterPolicy, SkipReason, Verdict};
pub use record::{LogRecord, StoredRecord};
pub use route::{RouteInfo, RouteResolver};
pub use router::RouteTable;
