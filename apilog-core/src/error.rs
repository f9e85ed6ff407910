use thiserror::Error;

/// Unified error type for apilog.
///
/// None of these ever reach the end user of the wrapped application: the
/// interceptor swallows them on the request path and the consumer thread
/// logs them.
#[derive(Error, Debug)]
pub enum ApiLogError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Route error: {0}")]
    Route(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Delivery service already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ApiLogError {
    /// Whether a failed sink write may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiLogError::Sink(_) | ApiLogError::Io(_))
    }
}

impl From<matchit::InsertError> for ApiLogError {
    fn from(e: matchit::InsertError) -> Self {
        ApiLogError::Route(e.to_string())
    }
}
