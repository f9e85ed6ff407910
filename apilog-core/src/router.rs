use crate::error::ApiLogError;
use crate::route::{RouteInfo, RouteResolver};
use matchit::Router as MatchitRouter;
use tracing::{debug, info};

/// Radix-tree route table resolving paths to [`RouteInfo`].
///
/// Patterns use `matchit` syntax: `/users/{id}` for a parameter and
/// `/static/{*rest}` for a catch-all. Paths that match nothing resolve to an
/// anonymous route (no name, no namespace), which the filter policy logs.
pub struct RouteTable {
    inner: MatchitRouter<RouteInfo>,
    len: usize,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            inner: MatchitRouter::new(),
            len: 0,
        }
    }

    /// Register a pattern. Fails on conflicting or malformed patterns.
    pub fn insert(&mut self, pattern: &str, info: RouteInfo) -> Result<(), ApiLogError> {
        info!(
            pattern = %pattern,
            name = ?info.name,
            namespace = ?info.namespace,
            "Adding route"
        );
        self.inner.insert(pattern, info)?;
        self.len += 1;
        Ok(())
    }

    /// Builder-style [`RouteTable::insert`].
    pub fn route(mut self, pattern: &str, info: RouteInfo) -> Result<Self, ApiLogError> {
        self.insert(pattern, info)?;
        Ok(self)
    }

    /// Register every route of an app under one namespace.
    ///
    /// `prefix` is prepended to each pattern, so `mount("/admin", "admin", ..)`
    /// with `("/users", "user-list")` registers `/admin/users`.
    pub fn mount<'a>(
        mut self,
        prefix: &str,
        namespace: &str,
        routes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ApiLogError> {
        let prefix = prefix.trim_end_matches('/');
        for (pattern, name) in routes {
            let full = format!("{prefix}{pattern}");
            self.insert(&full, RouteInfo::named(name).in_namespace(namespace))?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, path: &str) -> RouteInfo {
        match self.inner.at(path) {
            Ok(matched) => {
                debug!(path = %path, name = ?matched.value.name, "Route resolved");
                matched.value.clone()
            }
            Err(_) => {
                debug!(path = %path, "No route matched");
                RouteInfo::default()
            }
        }
    }
}
