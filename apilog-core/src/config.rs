use crate::error::ApiLogError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level logger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiLoggerConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub sink: FileSinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which requests get logged and where the records go.
///
/// Process-wide and read-only once the interceptor is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Hand records to the delivery queue (persistence sink).
    #[serde(default)]
    pub enable_persistence: bool,
    /// Dispatch records to registered signal observers.
    #[serde(default)]
    pub enable_signal: bool,
    #[serde(default)]
    pub path_type: PathType,
    #[serde(default)]
    pub skip_route_names: HashSet<String>,
    #[serde(default)]
    pub skip_namespaces: HashSet<String>,
    /// Uppercase HTTP verbs. Empty = all methods.
    #[serde(default)]
    pub allowed_methods: HashSet<String>,
    /// Empty = all status codes.
    #[serde(default)]
    pub allowed_status_codes: HashSet<u16>,
}

/// How the `api` field of a record represents the request URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PathType {
    /// `scheme://host/path?query`
    #[default]
    Absolute,
    /// Scheme plus the `Host` header exactly as the client sent it.
    RawUri,
    /// `/path?query`
    FullPath,
}

impl PathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Absolute => "ABSOLUTE",
            PathType::RawUri => "RAW_URI",
            PathType::FullPath => "FULL_PATH",
        }
    }
}

impl From<String> for PathType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ABSOLUTE" => PathType::Absolute,
            "RAW_URI" => PathType::RawUri,
            "FULL_PATH" => PathType::FullPath,
            other => {
                tracing::warn!(path_type = %other, "Unknown path type, falling back to ABSOLUTE");
                PathType::Absolute
            }
        }
    }
}

impl From<PathType> for String {
    fn from(value: PathType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for PathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensitive-key policy applied to URLs, headers and bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Case-insensitive substrings; any mapping key containing one is masked.
    #[serde(default = "default_sensitive_keys")]
    pub sensitive_keys: Vec<String>,
    /// Regular expressions matched against mapping keys and query names.
    #[serde(default)]
    pub sensitive_patterns: Vec<String>,
    /// Header names masked on exact (case-insensitive) match.
    #[serde(default = "default_sensitive_headers")]
    pub sensitive_headers: Vec<String>,
    /// Truncate the recorded client IP (IPv4 /24, IPv6 /64).
    #[serde(default)]
    pub anonymize_client_ip: bool,
}

/// Limits on captured bodies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Request bodies larger than this many bytes are recorded as empty.
    #[serde(default)]
    pub max_request_body_size: Option<usize>,
    /// Response bodies larger than this many bytes are recorded as empty.
    #[serde(default)]
    pub max_response_body_size: Option<usize>,
}

/// What a producer does when the delivery queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop the record immediately.
    #[default]
    Drop,
    /// Wait up to `block_timeout_ms`, then drop.
    Block,
}

/// Delivery queue and background consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Flush as soon as this many records are buffered.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush a partial batch once its first record has waited this long.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_block_timeout")]
    pub block_timeout_ms: u64,
    /// Upper bound on the final drain at shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

/// JSON-lines persistence sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    #[serde(default = "default_sink_path")]
    pub file_path: PathBuf,
    /// 0 = size-based rotation disabled (daily rotation only).
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// 0 = keep every rotated file.
    #[serde(default = "default_max_rotated_files")]
    pub max_rotated_files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_sensitive_keys() -> Vec<String> {
    ["password", "token", "access", "refresh"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_sensitive_headers() -> Vec<String> {
    ["authorization", "cookie", "set-cookie", "x-api-key", "proxy-authorization"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_queue_capacity() -> usize { 10_000 }
fn default_batch_size() -> usize { 50 }
fn default_flush_interval() -> u64 { 10_000 }
fn default_block_timeout() -> u64 { 5 }
fn default_shutdown_timeout() -> u64 { 5_000 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_backoff() -> u64 { 100 }
fn default_sink_path() -> PathBuf { PathBuf::from("data/apilog.jsonl") }
fn default_max_file_size() -> u64 { 100 * 1024 * 1024 }
fn default_max_rotated_files() -> usize { 30 }
fn default_log_level() -> String { "info".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            sensitive_keys: default_sensitive_keys(),
            sensitive_patterns: Vec::new(),
            sensitive_headers: default_sensitive_headers(),
            anonymize_client_ip: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval(),
            overflow: OverflowPolicy::Drop,
            block_timeout_ms: default_block_timeout(),
            shutdown_timeout_ms: default_shutdown_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl DeliveryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ApiLogError> {
        if self.queue_capacity == 0 {
            return Err(ApiLogError::Config("delivery.queue_capacity must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ApiLogError::Config("delivery.batch_size must be > 0".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ApiLogError::Config("delivery.flush_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            file_path: default_sink_path(),
            max_file_size_bytes: default_max_file_size(),
            max_rotated_files: default_max_rotated_files(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl FilterConfig {
    /// Whether any output (persistence or signal) is switched on.
    pub fn any_output_enabled(&self) -> bool {
        self.enable_persistence || self.enable_signal
    }
}

impl ApiLoggerConfig {
    /// Load configuration from a YAML file + `APILOG_` env overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `APILOG_FILTER__ENABLE_PERSISTENCE=true`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: ApiLoggerConfig = Figment::from(Serialized::defaults(ApiLoggerConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("APILOG_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ApiLogError> {
        self.delivery.validate()
    }
}
