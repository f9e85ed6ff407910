//! Log record types.
//!
//! [`LogRecord`] is what the interceptor builds once per request cycle and
//! what signal observers receive. [`StoredRecord`] is the row shape handed to
//! persistence sinks: structured fields are already rendered to JSON strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status code recorded when the downstream handler failed.
pub const EXCEPTION_STATUS: u16 = 500;

/// One logged request/response event.
///
/// `headers`, `body` and `response` are already redacted. A `Null` body or
/// response means "empty": absent, unparseable or over the size limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// First non-empty path segment of the request URL.
    pub app_name: String,
    /// Redacted request URL in the configured path representation.
    pub api: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    /// Uppercase HTTP verb.
    pub method: String,
    pub client_ip: String,
    pub response: Value,
    pub status_code: u16,
    /// Seconds spent in the downstream handler. Zero on the exception path.
    pub execution_time: f64,
    pub added_on: DateTime<Utc>,
}

/// Persistence row for a [`LogRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub app_name: String,
    pub api: String,
    /// Pretty-printed JSON object.
    pub headers: String,
    /// Pretty-printed JSON, or empty string when the body was empty.
    pub body: String,
    pub method: String,
    pub client_ip_address: String,
    /// Pretty-printed JSON, or empty string when the response was empty.
    pub response: String,
    pub status_code: u16,
    pub execution_time: f64,
    pub added_on: DateTime<Utc>,
}

impl From<&LogRecord> for StoredRecord {
    fn from(record: &LogRecord) -> Self {
        Self {
            app_name: record.app_name.clone(),
            api: record.api.clone(),
            headers: to_pretty_json(&record.headers),
            body: render_value(&record.body),
            method: record.method.clone(),
            client_ip_address: record.client_ip.clone(),
            response: render_value(&record.response),
            status_code: record.status_code,
            execution_time: record.execution_time,
            added_on: record.added_on,
        }
    }
}

impl StoredRecord {
    /// Serialise to one compact JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn render_value(value: &Value) -> String {
    if value.is_null() {
        String::new()
    } else {
        to_pretty_json(value)
    }
}

/// Four-space indented JSON; non-ASCII characters are written as-is.
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    if value.serialize(&mut ser).is_err() {
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}
