//! Request and response types seen by the interceptor, and the read-only
//! snapshots taken of them for record building.

use apilog_core::config::PathType;
use apilog_core::filter::ContentKind;
use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tokio::sync::mpsc;

/// Request shape the host framework adapts to. The body is fully buffered.
pub type ApiRequest = http::Request<Bytes>;

/// Response shape the host framework adapts to.
pub type ApiResponse = http::Response<ResponseBody>;

/// Peer address of the connection, set as a request extension by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAddr(pub IpAddr);

/// Response payload. Streaming bodies are never read by the interceptor.
#[derive(Debug)]
pub enum ResponseBody {
    Full(Bytes),
    Streaming(mpsc::Receiver<Bytes>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseBody::Streaming(_))
    }

    /// Buffered bytes, or `None` for a streaming body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Full(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::Full(Bytes::from(bytes))
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        ResponseBody::Full(Bytes::from(s))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        ResponseBody::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<mpsc::Receiver<Bytes>> for ResponseBody {
    fn from(rx: mpsc::Receiver<Bytes>) -> Self {
        ResponseBody::Streaming(rx)
    }
}

// ── Request snapshot ─────────────────────────────────────────

/// Everything the record builder needs from the request, captured before the
/// request is handed to the downstream handler.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    /// Uppercase verb.
    pub method: String,
    pub scheme: String,
    /// Host (and port) from the URI authority, else from the `Host` header.
    pub host: Option<String>,
    /// `Host` header exactly as sent.
    pub raw_host: Option<String>,
    pub path: String,
    pub query: Option<String>,
    /// Lowercase header names; repeated headers joined with `", "`.
    pub headers: BTreeMap<String, String>,
    pub client_ip: String,
    pub body: Bytes,
}

impl RequestSnapshot {
    pub fn capture(request: &ApiRequest) -> Self {
        let uri = request.uri();
        let headers = request.headers();

        let raw_host = header_str(headers, http::header::HOST).map(str::to_string);
        let host = uri
            .authority()
            .map(|a| match a.port_u16() {
                // Userinfo is never part of the recorded host.
                Some(port) => format!("{}:{port}", a.host()),
                None => a.host().to_string(),
            })
            .or_else(|| raw_host.as_ref().map(|h| h.trim().to_string()));

        let scheme = uri
            .scheme_str()
            .map(str::to_string)
            .or_else(|| {
                header_str(headers, "x-forwarded-proto")
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_ascii_lowercase())
                    .filter(|v| !v.is_empty())
            })
            .unwrap_or_else(|| "http".to_string());

        Self {
            method: request.method().as_str().to_ascii_uppercase(),
            scheme,
            host,
            raw_host,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers: header_map(headers),
            client_ip: client_ip(request),
            body: request.body().clone(),
        }
    }

    /// `path?query`
    pub fn full_path(&self) -> String {
        match self.query {
            Some(ref q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// `scheme://host/path?query`
    pub fn absolute_url(&self) -> String {
        let host = self.host.as_deref().unwrap_or("");
        format!("{}://{}{}", self.scheme, host, self.full_path())
    }

    /// Scheme plus the raw `Host` header verbatim plus `path?query`.
    pub fn raw_uri(&self) -> String {
        let host = self.raw_host.as_deref().unwrap_or("");
        format!("{}://{}{}", self.scheme, host, self.full_path())
    }

    /// The request URL in the configured representation (not yet redacted).
    pub fn url(&self, path_type: PathType) -> String {
        match path_type {
            PathType::Absolute => self.absolute_url(),
            PathType::RawUri => self.raw_uri(),
            PathType::FullPath => self.full_path(),
        }
    }

    /// Best-effort JSON parse of the request body.
    ///
    /// `None` when the body is empty, not JSON, or longer than `max_size`.
    pub fn try_parse_body(&self, max_size: Option<usize>) -> Option<Value> {
        parse_json(&self.body, max_size)
    }
}

// ── Response snapshot ────────────────────────────────────────

/// What the response body looks like to the record builder.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseContent {
    Gzip,
    Streaming,
    Bytes(Bytes),
}

#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_kind: Option<ContentKind>,
    pub content: ResponseContent,
}

impl ResponseSnapshot {
    /// Capture without consuming the response. Streaming bodies are not read.
    pub fn capture(response: &ApiResponse) -> Self {
        let content_kind = header_str(response.headers(), http::header::CONTENT_TYPE)
            .and_then(ContentKind::from_content_type);

        let content = match (content_kind, response.body()) {
            (Some(ContentKind::Gzip), _) => ResponseContent::Gzip,
            (_, ResponseBody::Streaming(_)) => ResponseContent::Streaming,
            (_, ResponseBody::Full(bytes)) => ResponseContent::Bytes(bytes.clone()),
        };

        Self {
            status: response.status().as_u16(),
            content_kind,
            content,
        }
    }

    /// Only JSON, JSON:API and gzip responses are logged.
    pub fn is_loggable(&self) -> bool {
        self.content_kind.is_some()
    }
}

// ── Helpers ──────────────────────────────────────────────────

pub(crate) fn parse_json(bytes: &[u8], max_size: Option<usize>) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    if let Some(max) = max_size
        && bytes.len() > max
    {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn header_str<K: http::header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

/// First `X-Forwarded-For` entry, else the connection peer, else empty.
fn client_ip(request: &ApiRequest) -> String {
    if let Some(forwarded) = header_str(request.headers(), "x-forwarded-for")
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }
    request
        .extensions()
        .get::<RemoteAddr>()
        .map(|addr| addr.0.to_string())
        .unwrap_or_default()
}
