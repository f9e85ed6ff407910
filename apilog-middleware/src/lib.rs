pub mod builder;
pub mod interceptor;
pub mod request;
pub mod signal;

pub use builder::{Completion, RecordBuilder};
pub use interceptor::{Handler, Interceptor, InterceptorBuilder};
pub use request::{ApiRequest, ApiResponse, RemoteAddr, RequestSnapshot, ResponseBody, ResponseSnapshot};
pub use signal::{RecordObserver, SignalHub};
