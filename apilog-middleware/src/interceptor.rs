//! The request/response logging interceptor.
//!
//! ```text
//!   START ──pre-dispatch skip──────────────────────────────▶ passthrough
//!     │
//!     ▼ snapshot request, start timer
//!   AWAIT_RESPONSE ──handler Err──▶ EXCEPTION ──▶ deliver, return Err
//!     │
//!     ▼ handler Ok
//!   status / method / content-type ──skip──▶ return response
//!     │
//!     ▼
//!   COMPLETE ──▶ build, deliver, return response unmodified
//! ```

use crate::builder::{Completion, RecordBuilder};
use crate::request::{ApiRequest, ApiResponse, RequestSnapshot, ResponseSnapshot};
use crate::signal::{RecordObserver, SignalHub};
use apilog_core::config::ApiLoggerConfig;
use apilog_core::filter::{FilterPolicy, SkipReason, Verdict};
use apilog_core::record::{LogRecord, StoredRecord};
use apilog_core::route::{RouteInfo, RouteResolver};
use apilog_store::{DeliveryQueue, SubmitOutcome, global};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Downstream request handler wrapped by the interceptor.
#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Debug + Send;

    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, Self::Error>;
}

#[async_trait]
impl<F, Fut, E> Handler for F
where
    F: Fn(ApiRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ApiResponse, E>> + Send + 'static,
    E: Debug + Send + 'static,
{
    type Error = E;

    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, E> {
        self(request).await
    }
}

/// Logs request/response cycles around a [`Handler`].
///
/// Built once at startup and shared (it is `Send + Sync`); the configuration
/// is read-only afterwards.
pub struct Interceptor {
    policy: FilterPolicy,
    builder: RecordBuilder,
    resolver: Arc<dyn RouteResolver>,
    queue: Option<DeliveryQueue>,
    signals: SignalHub,
}

impl Interceptor {
    pub fn builder(config: ApiLoggerConfig) -> InterceptorBuilder {
        InterceptorBuilder {
            config,
            resolver: None,
            queue: None,
            signals: SignalHub::new(),
        }
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Run `handler` on `request`, logging the cycle when the filter allows.
    ///
    /// The handler's response or error is returned exactly as produced.
    pub async fn handle<H: Handler>(
        &self,
        request: ApiRequest,
        handler: &H,
    ) -> Result<ApiResponse, H::Error> {
        let route = self.resolver.resolve(request.uri().path());
        if let Verdict::Skip(reason) = self.policy.pre_dispatch(&route) {
            trace!(path = %request.uri().path(), reason = %reason, "Request not logged");
            return handler.call(request).await;
        }

        let started = Instant::now();
        let snapshot = RequestSnapshot::capture(&request);

        match handler.call(request).await {
            Ok(response) => {
                let status = response.status().as_u16();
                if let Verdict::Skip(reason) = self.policy.post_response(&snapshot.method, status) {
                    self.log_skip(&snapshot, reason);
                    return Ok(response);
                }
                let response_snapshot = ResponseSnapshot::capture(&response);
                if !response_snapshot.is_loggable() {
                    self.log_skip(&snapshot, SkipReason::UnsupportedContentType);
                    return Ok(response);
                }
                let record = self.builder.build(
                    &snapshot,
                    Completion::Response(&response_snapshot),
                    started,
                );
                self.deliver(record);
                Ok(response)
            }
            Err(error) => {
                let record = self.builder.build(&snapshot, Completion::Exception(&error), started);
                self.deliver(record);
                Err(error)
            }
        }
    }

    /// Record a handler failure reported outside of [`Interceptor::handle`].
    ///
    /// Only the route-based filter rules apply to exception records.
    pub fn record_exception<E: Debug>(&self, request: &ApiRequest, error: &E) {
        let route = self.resolver.resolve(request.uri().path());
        if !self.policy.pre_dispatch(&route).is_log() {
            return;
        }
        let snapshot = RequestSnapshot::capture(request);
        let record = self
            .builder
            .build(&snapshot, Completion::Exception(error), Instant::now());
        self.deliver(record);
    }

    fn deliver(&self, record: LogRecord) {
        let config = self.policy.config();

        if config.enable_persistence {
            let stored = StoredRecord::from(&record);
            let outcome = match self.queue {
                Some(ref queue) => queue.submit(stored),
                None => global::submit(stored),
            };
            if let SubmitOutcome::Dropped(reason) = outcome {
                debug!(api = %record.api, reason = %reason, "Record not persisted");
            }
        }

        if config.enable_signal {
            self.signals.dispatch(&record);
        }
    }

    fn log_skip(&self, snapshot: &RequestSnapshot, reason: SkipReason) {
        trace!(path = %snapshot.path, method = %snapshot.method, reason = %reason, "Response not logged");
    }
}

/// Assembles an [`Interceptor`].
pub struct InterceptorBuilder {
    config: ApiLoggerConfig,
    resolver: Option<Arc<dyn RouteResolver>>,
    queue: Option<DeliveryQueue>,
    signals: SignalHub,
}

impl InterceptorBuilder {
    /// Route resolver used for the name/namespace rules. Without one every
    /// request resolves to an anonymous route.
    pub fn routes(mut self, resolver: impl RouteResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Queue for persisted records. Defaults to the process-wide queue.
    pub fn queue(mut self, queue: DeliveryQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn observer(mut self, observer: impl RecordObserver + 'static) -> Self {
        self.signals.subscribe(observer);
        self
    }

    pub fn build(self) -> Interceptor {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(|_: &str| RouteInfo::default()));
        debug!(
            persistence = self.config.filter.enable_persistence,
            signal = self.config.filter.enable_signal,
            observers = self.signals.len(),
            path_type = %self.config.filter.path_type,
            "Interceptor built"
        );
        Interceptor {
            policy: FilterPolicy::new(self.config.filter.clone()),
            builder: RecordBuilder::new(&self.config),
            resolver,
            queue: self.queue,
            signals: self.signals,
        }
    }
}
