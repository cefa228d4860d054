//! Route registry: (method, normalized path pattern) → permission expression.
//!
//! Built once at startup by the route builder and shared read-only behind an
//! `Arc`; the guard never mutates it.

use axum::http::Method;
use std::collections::HashMap;

/// Permission expression attached to a registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Always allowed, no identity required.
    Public,
    /// `"resource:action"` requirement. Kept as the raw stored string and
    /// validated at evaluation time, so a malformed expression surfaces as a
    /// configuration error when the route is hit.
    Required(String),
}

impl Expr {
    pub fn required(raw: impl Into<String>) -> Self {
        Self::Required(raw.into())
    }
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<(Method, String), Expr>,
}

impl RouteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the permission expression for a route. Must be called before
    /// the first request reaches the guard.
    pub fn register(&mut self, method: Method, pattern: &str, expr: Expr) {
        self.routes
            .insert((method, normalize_path(pattern).to_string()), expr);
    }

    #[must_use]
    pub fn lookup(&self, method: &Method, pattern: &str) -> Option<&Expr> {
        self.routes
            .get(&(method.clone(), normalize_path(pattern).to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Strip a single trailing slash, except for the root path.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Turn a concrete request path into its registered pattern by substituting
/// each runtime path-parameter value with its `:name` placeholder, so
/// `/role/42` with `[("id", "42")]` resolves against `/role/:id`.
///
/// Substitution is segment-wise; a parameter value never matches part of a
/// segment.
#[must_use]
pub fn pattern_for(path: &str, params: &[(String, String)]) -> String {
    let normalized = normalize_path(path);
    if params.is_empty() {
        return normalized.to_string();
    }

    let segments: Vec<String> = normalized
        .split('/')
        .map(|segment| {
            params
                .iter()
                .find(|(_, value)| value.as_str() == segment && !segment.is_empty())
                .map_or_else(|| segment.to_string(), |(name, _)| format!(":{name}"))
        })
        .collect();

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_one_trailing_slash() {
        assert_eq!(normalize_path("/role/"), "/role");
        assert_eq!(normalize_path("/role"), "/role");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn pattern_substitutes_params_per_segment() {
        let params = vec![("id".to_string(), "42".to_string())];
        assert_eq!(pattern_for("/role/42", &params), "/role/:id");
        assert_eq!(pattern_for("/role/42/", &params), "/role/:id");
    }

    #[test]
    fn pattern_does_not_touch_partial_matches() {
        let params = vec![("id".to_string(), "42".to_string())];
        assert_eq!(pattern_for("/role/420", &params), "/role/420");
    }

    #[test]
    fn pattern_without_params_is_normalized_path() {
        assert_eq!(pattern_for("/role/", &[]), "/role");
    }

    #[test]
    fn register_and_lookup_normalize_consistently() {
        let mut registry = RouteRegistry::new();
        registry.register(Method::POST, "/role/", Expr::required("OAUTH2_role:create"));

        assert_eq!(
            registry.lookup(&Method::POST, "/role"),
            Some(&Expr::required("OAUTH2_role:create"))
        );
        assert_eq!(registry.lookup(&Method::GET, "/role"), None);
        assert_eq!(registry.lookup(&Method::POST, "/other"), None);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}
