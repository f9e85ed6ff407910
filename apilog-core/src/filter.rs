//! Decision logic for whether a request/response pair is logged.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! | # | Rule                                              | Reason               |
//! |---|---------------------------------------------------|----------------------|
//! | 1 | persistence and signal both disabled               | `Disabled`           |
//! | 2 | namespace is `admin` (not configurable)            | `AdminNamespace`     |
//! | 3 | route name in `skip_route_names`                   | `SkippedRouteName`   |
//! | 4 | namespace in `skip_namespaces`                     | `SkippedNamespace`   |
//! | 5 | status not in a non-empty `allowed_status_codes`   | `StatusNotAllowed`   |
//! | 6 | method not in a non-empty `allowed_methods`        | `MethodNotAllowed`   |
//!
//! Rules 1–4 only need the resolved route and run before the request is
//! dispatched ([`FilterPolicy::pre_dispatch`]). Rule 5 needs the response.
//! Content type is checked separately through [`ContentKind`].

use crate::config::FilterConfig;
use crate::route::RouteInfo;

/// Why a request is not logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    AdminNamespace,
    SkippedRouteName,
    SkippedNamespace,
    StatusNotAllowed,
    MethodNotAllowed,
    UnsupportedContentType,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::AdminNamespace => "admin_namespace",
            SkipReason::SkippedRouteName => "skipped_route_name",
            SkipReason::SkippedNamespace => "skipped_namespace",
            SkipReason::StatusNotAllowed => "status_not_allowed",
            SkipReason::MethodNotAllowed => "method_not_allowed",
            SkipReason::UnsupportedContentType => "unsupported_content_type",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating the filter rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Log,
    Skip(SkipReason),
}

impl Verdict {
    pub fn is_log(&self) -> bool {
        matches!(self, Verdict::Log)
    }
}

/// Stateless evaluator over a read-only [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    config: FilterConfig,
}

impl FilterPolicy {
    pub fn new(mut config: FilterConfig) -> Self {
        config.allowed_methods = config
            .allowed_methods
            .into_iter()
            .map(|m| m.to_ascii_uppercase())
            .collect();
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Rules 1–4: everything that can be decided from the route alone.
    pub fn pre_dispatch(&self, route: &RouteInfo) -> Verdict {
        if !self.config.any_output_enabled() {
            return Verdict::Skip(SkipReason::Disabled);
        }
        if route.is_admin() {
            return Verdict::Skip(SkipReason::AdminNamespace);
        }
        if let Some(name) = route.name()
            && self.config.skip_route_names.contains(name)
        {
            return Verdict::Skip(SkipReason::SkippedRouteName);
        }
        if let Some(namespace) = route.namespace()
            && self.config.skip_namespaces.contains(namespace)
        {
            return Verdict::Skip(SkipReason::SkippedNamespace);
        }
        Verdict::Log
    }

    /// Rules 5–6: checks that need the response status and request method.
    pub fn post_response(&self, method: &str, status: u16) -> Verdict {
        if !self.config.allowed_status_codes.is_empty()
            && !self.config.allowed_status_codes.contains(&status)
        {
            return Verdict::Skip(SkipReason::StatusNotAllowed);
        }
        self.method_verdict(method)
    }

    /// Evaluate every rule in order.
    ///
    /// `status` is `None` before the response exists; the status rule is then
    /// not applied.
    pub fn evaluate(&self, route: &RouteInfo, method: &str, status: Option<u16>) -> Verdict {
        let verdict = self.pre_dispatch(route);
        if !verdict.is_log() {
            return verdict;
        }
        match status {
            Some(status) => self.post_response(method, status),
            None => self.method_verdict(method),
        }
    }

    pub fn should_log(&self, route: &RouteInfo, method: &str, status: Option<u16>) -> bool {
        self.evaluate(route, method, status).is_log()
    }

    fn method_verdict(&self, method: &str) -> Verdict {
        if !self.config.allowed_methods.is_empty()
            && !self.config.allowed_methods.contains(&method.to_ascii_uppercase())
        {
            return Verdict::Skip(SkipReason::MethodNotAllowed);
        }
        Verdict::Log
    }
}

/// Response content types that are eligible for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    JsonApi,
    /// Recorded with a placeholder body; never inflated.
    Gzip,
}

impl ContentKind {
    /// Classify a `Content-Type` header value by its media-type essence.
    ///
    /// Parameters such as `charset` are ignored; matching is case-insensitive.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "application/json" => Some(ContentKind::Json),
            "application/vnd.api+json" => Some(ContentKind::JsonApi),
            "application/gzip" => Some(ContentKind::Gzip),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteInfo;

    fn enabled() -> FilterConfig {
        FilterConfig {
            enable_persistence: true,
            ..FilterConfig::default()
        }
    }

    #[test]
    fn disabled_outputs_skip_everything() {
        let policy = FilterPolicy::new(FilterConfig::default());
        assert_eq!(
            policy.pre_dispatch(&RouteInfo::named("users")),
            Verdict::Skip(SkipReason::Disabled)
        );
    }

    #[test]
    fn signal_alone_enables_logging() {
        let policy = FilterPolicy::new(FilterConfig {
            enable_signal: true,
            ..FilterConfig::default()
        });
        assert!(policy.should_log(&RouteInfo::default(), "GET", Some(200)));
    }

    #[test]
    fn admin_namespace_wins_over_everything() {
        let mut cfg = enabled();
        cfg.allowed_status_codes.insert(200);
        let policy = FilterPolicy::new(cfg);
        let route = RouteInfo::named("index").in_namespace("admin");
        assert_eq!(
            policy.evaluate(&route, "GET", Some(200)),
            Verdict::Skip(SkipReason::AdminNamespace)
        );
    }

    #[test]
    fn route_name_checked_before_namespace() {
        let mut cfg = enabled();
        cfg.skip_route_names.insert("health".into());
        cfg.skip_namespaces.insert("internal".into());
        let policy = FilterPolicy::new(cfg);
        let route = RouteInfo::named("health").in_namespace("internal");
        assert_eq!(policy.pre_dispatch(&route), Verdict::Skip(SkipReason::SkippedRouteName));
        let route = RouteInfo::named("debug").in_namespace("internal");
        assert_eq!(policy.pre_dispatch(&route), Verdict::Skip(SkipReason::SkippedNamespace));
    }

    #[test]
    fn status_checked_before_method() {
        let mut cfg = enabled();
        cfg.allowed_status_codes.insert(200);
        cfg.allowed_methods.insert("POST".into());
        let policy = FilterPolicy::new(cfg);
        assert_eq!(policy.post_response("GET", 404), Verdict::Skip(SkipReason::StatusNotAllowed));
        assert_eq!(policy.post_response("GET", 200), Verdict::Skip(SkipReason::MethodNotAllowed));
        assert_eq!(policy.post_response("POST", 200), Verdict::Log);
    }

    #[test]
    fn method_allow_set_is_case_insensitive() {
        let mut cfg = enabled();
        cfg.allowed_methods.insert("post".into());
        let policy = FilterPolicy::new(cfg);
        assert!(policy.post_response("POST", 200).is_log());
        assert!(policy.post_response("post", 200).is_log());
    }

    #[test]
    fn unknown_status_skips_status_rule() {
        let mut cfg = enabled();
        cfg.allowed_status_codes.insert(200);
        let policy = FilterPolicy::new(cfg);
        assert!(policy.should_log(&RouteInfo::default(), "GET", None));
    }

    #[test]
    fn content_kind_classification() {
        assert_eq!(ContentKind::from_content_type("application/json"), Some(ContentKind::Json));
        assert_eq!(
            ContentKind::from_content_type("Application/JSON; charset=utf-8"),
            Some(ContentKind::Json)
        );
        assert_eq!(
            ContentKind::from_content_type("application/vnd.api+json"),
            Some(ContentKind::JsonApi)
        );
        assert_eq!(ContentKind::from_content_type("application/gzip"), Some(ContentKind::Gzip));
        assert_eq!(ContentKind::from_content_type("text/html"), None);
        assert_eq!(ContentKind::from_content_type(""), None);
    }
}
