use serde::{Deserialize, Serialize};

/// Namespace that is never logged, regardless of configuration.
pub const ADMIN_NAMESPACE: &str = "admin";

/// Framework-level identity of a resolved request path.
///
/// Both fields are `None` when the framework could not resolve the path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Route name (e.g. `"user-detail"`).
    #[serde(default)]
    pub name: Option<String>,
    /// Namespace grouping a set of routes (e.g. `"api"`, `"admin"`).
    #[serde(default)]
    pub namespace: Option<String>,
}

impl RouteInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.namespace() == Some(ADMIN_NAMESPACE)
    }
}

/// Maps a request path to its route name and namespace.
///
/// This is the boundary to the host framework's router. [`crate::router::RouteTable`]
/// is a standalone implementation; closures work too.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, path: &str) -> RouteInfo;
}

impl<F> RouteResolver for F
where
    F: Fn(&str) -> RouteInfo + Send + Sync,
{
    fn resolve(&self, path: &str) -> RouteInfo {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_route_in_namespace() {
        let info = RouteInfo::named("user-detail").in_namespace("api");
        assert_eq!(info.name(), Some("user-detail"));
        assert_eq!(info.namespace(), Some("api"));
        assert!(!info.is_admin());
    }

    #[test]
    fn admin_namespace_is_detected() {
        assert!(RouteInfo::named("index").in_namespace("admin").is_admin());
        assert!(!RouteInfo::default().is_admin());
    }

    #[test]
    fn closure_is_a_resolver() {
        let resolver = |path: &str| {
            if path.starts_with("/admin") {
                RouteInfo::default().in_namespace(ADMIN_NAMESPACE)
            } else {
                RouteInfo::default()
            }
        };
        assert!(resolver.resolve("/admin/users").is_admin());
        assert!(!resolver.resolve("/api/users").is_admin());
    }
}
