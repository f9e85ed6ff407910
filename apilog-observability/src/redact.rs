//! Redaction of sensitive values in headers, JSON bodies and URLs.
//!
//! Everything that leaves process memory as part of a log record goes through
//! a [`Redactor`] first. A key is sensitive when its lowercase form contains
//! one of the configured sensitive keys, or when it matches one of the
//! configured regex patterns. Sensitive values are replaced wholesale by
//! [`MASK`]; nothing is partially masked.
//!
//! # Usage
//!
//! ```
//! use apilog_core::config::RedactionConfig;
//! use apilog_observability::redact::Redactor;
//! use serde_json::json;
//!
//! let redactor = Redactor::new(&RedactionConfig::default());
//!
//! let body = redactor.mask(&json!({"password": "hunter2", "name": "bob"}));
//! assert_eq!(body, json!({"password": "***", "name": "bob"}));
//!
//! let url = redactor.mask_url("https://example.com/login?token=abc&page=2");
//! assert_eq!(url, "https://example.com/login?token=***&page=2");
//! ```

use apilog_core::config::RedactionConfig;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Replacement string used for all masked values.
pub const MASK: &str = "***";

/// Headers that are always masked, on top of the configured ones.
pub const ALWAYS_SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "proxy-authorization",
    "www-authenticate",
];

/// Compiled redaction policy.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and never fail.
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: Vec<String>,
    patterns: Vec<Regex>,
    headers: Vec<String>,
    anonymize_ip: bool,
}

impl Redactor {
    pub fn new(config: &RedactionConfig) -> Self {
        let mut headers: Vec<String> = ALWAYS_SENSITIVE_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect();
        for header in &config.sensitive_headers {
            let lower = header.to_ascii_lowercase();
            if !headers.contains(&lower) {
                headers.push(lower);
            }
        }
        Self {
            keys: normalize_keys(&config.sensitive_keys),
            patterns: compile_patterns(&config.sensitive_patterns),
            headers,
            anonymize_ip: config.anonymize_client_ip,
        }
    }

    /// Key-only policy, without patterns or extra header names.
    pub fn from_keys(keys: &[String]) -> Self {
        Self {
            keys: normalize_keys(keys),
            patterns: Vec::new(),
            headers: ALWAYS_SENSITIVE_HEADERS.iter().map(|h| h.to_string()).collect(),
            anonymize_ip: false,
        }
    }

    /// Whether a mapping key (or query parameter name) must be masked.
    pub fn is_sensitive_key(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.keys.iter().any(|k| lower.contains(k.as_str()))
            || self.patterns.iter().any(|re| re.is_match(key))
    }

    pub fn is_sensitive_header(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.headers.contains(&lower) || self.is_sensitive_key(name)
    }

    /// Return a masked copy of a JSON value.
    ///
    /// Objects get a fresh map with sensitive values replaced by [`MASK`] and
    /// every other value masked recursively. Arrays are masked element-wise.
    /// Scalars come back unchanged.
    pub fn mask(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, inner) in map {
                    let masked = if self.is_sensitive_key(key) {
                        Value::String(MASK.to_string())
                    } else {
                        self.mask(inner)
                    };
                    out.insert(key.clone(), masked);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask(v)).collect()),
            other => other.clone(),
        }
    }

    /// Mask the values of sensitive query parameters in a URL.
    ///
    /// Parameter names are percent-decoded before matching. Everything else
    /// (path, other parameters, their order and encoding, the fragment) is
    /// kept byte-for-byte.
    pub fn mask_url(&self, url: &str) -> String {
        let (before_fragment, fragment) = match url.find('#') {
            Some(idx) => url.split_at(idx),
            None => (url, ""),
        };
        let Some((base, query)) = before_fragment.split_once('?') else {
            return url.to_string();
        };
        if query.is_empty() {
            return url.to_string();
        }

        let masked: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((name, _)) if self.is_sensitive_key(&decode_query_name(name)) => {
                    format!("{name}={MASK}")
                }
                _ => pair.to_string(),
            })
            .collect();

        format!("{base}?{}{fragment}", masked.join("&"))
    }

    /// The client IP as it should be recorded.
    pub fn client_ip(&self, ip: &str) -> String {
        if self.anonymize_ip {
            anonymize_ip(ip)
        } else {
            ip.to_string()
        }
    }

    /// Return a masked copy of a header map.
    pub fn mask_headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                if self.is_sensitive_header(name) {
                    (name.clone(), MASK.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(&RedactionConfig::default())
    }
}

/// Mask `value` against a plain list of sensitive keys.
///
/// With `is_url` set, a string value is treated as a URL and its query
/// parameters are masked; any other shape is masked as JSON.
pub fn mask(value: &Value, sensitive_keys: &[String], is_url: bool) -> Value {
    let redactor = Redactor::from_keys(sensitive_keys);
    match value {
        Value::String(url) if is_url => Value::String(redactor.mask_url(url)),
        other => redactor.mask(other),
    }
}

/// Truncate an IP address to its network prefix.
///
/// IPv4 keeps the leading /24 and IPv6 the leading /64. Input that does not
/// parse as an IP is returned unchanged.
pub fn anonymize_ip(ip: &str) -> String {
    match ip.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ipv4Addr::from(u32::from(addr) & 0xffff_ff00).to_string(),
        Ok(IpAddr::V6(addr)) => Ipv6Addr::from(u128::from(addr) & (!0u128 << 64)).to_string(),
        Err(_) => ip.to_string(),
    }
}

/// Compile regex pattern strings, skipping invalid ones with a warning.
pub fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            Regex::new(p)
                .map_err(|e| tracing::warn!(pattern = %p, error = %e, "Invalid redaction pattern, skipping"))
                .ok()
        })
        .collect()
}

fn normalize_keys(keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn decode_query_name(name: &str) -> String {
    let spaced = name.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
