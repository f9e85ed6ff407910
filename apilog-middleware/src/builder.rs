use crate::request::{RequestSnapshot, ResponseContent, ResponseSnapshot, parse_json};
use apilog_core::config::{ApiLoggerConfig, CaptureConfig, PathType};
use apilog_core::record::{EXCEPTION_STATUS, LogRecord};
use apilog_observability::Redactor;
use chrono::Utc;
use serde_json::Value;
use std::backtrace::Backtrace;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

pub const GZIP_PLACEHOLDER: &str = "** GZIP Archive **";
pub const STREAMING_PLACEHOLDER: &str = "** Streaming **";

/// How the request cycle ended.
#[derive(Clone, Copy)]
pub enum Completion<'a> {
    Response(&'a ResponseSnapshot),
    Exception(&'a dyn Debug),
}

/// Turns request/response snapshots into redacted [`LogRecord`]s.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    path_type: PathType,
    capture: CaptureConfig,
    redactor: Arc<Redactor>,
}

impl RecordBuilder {
    pub fn new(config: &ApiLoggerConfig) -> Self {
        Self {
            path_type: config.filter.path_type,
            capture: config.capture.clone(),
            redactor: Arc::new(Redactor::new(&config.redaction)),
        }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn build(
        &self,
        request: &RequestSnapshot,
        completion: Completion<'_>,
        started: Instant,
    ) -> LogRecord {
        let body = request
            .try_parse_body(self.capture.max_request_body_size)
            .map(|v| self.redactor.mask(&v))
            .unwrap_or(Value::Null);

        let (response, status_code, execution_time) = match completion {
            Completion::Response(snapshot) => (
                self.redactor.mask(&self.response_value(snapshot)),
                snapshot.status,
                started.elapsed().as_secs_f64(),
            ),
            Completion::Exception(error) => {
                let url = self.redactor.mask_url(&request.absolute_url());
                let message = format!(
                    "**{url}**\n\n{error:?}\n\n````{}````",
                    Backtrace::force_capture()
                );
                (Value::String(message), EXCEPTION_STATUS, 0.0)
            }
        };

        LogRecord {
            app_name: app_name(&request.path),
            api: self.redactor.mask_url(&request.url(self.path_type)),
            headers: self.redactor.mask_headers(&request.headers),
            body,
            method: request.method.clone(),
            client_ip: self.redactor.client_ip(&request.client_ip),
            response,
            status_code,
            execution_time,
            added_on: Utc::now(),
        }
    }

    fn response_value(&self, snapshot: &ResponseSnapshot) -> Value {
        match snapshot.content {
            ResponseContent::Gzip => Value::String(GZIP_PLACEHOLDER.to_string()),
            ResponseContent::Streaming => Value::String(STREAMING_PLACEHOLDER.to_string()),
            ResponseContent::Bytes(ref bytes) => {
                parse_json(bytes, self.capture.max_response_body_size).unwrap_or(Value::Null)
            }
        }
    }
}

fn app_name(path: &str) -> String {
    path.split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .to_string()
}
