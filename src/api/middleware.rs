//! Identity decoding and guard middleware.
//!
//! Identity runs first: a verifiable bearer token populates the
//! authenticated subject extension, anything else leaves the request
//! anonymous (public routes stay reachable). The guard then decides against
//! the route registry.

use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use crate::cli::globals::GlobalArgs;
use crate::credentials;
use crate::guard::{self, AuthSubject, RouteRegistry, normalize_path};

/// Raw presented bearer token, kept for the pinned client-token check.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Decode a presented bearer token into an [`AuthSubject`] extension.
/// Verification failures clear the subject and continue as anonymous.
pub async fn identity(
    Extension(globals): Extension<GlobalArgs>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(bearer) = extract_bearer(req.headers()) {
        match credentials::verify_token(&bearer, globals.jwt_secret.expose_secret()) {
            Ok(claims) => {
                req.extensions_mut().insert(AuthSubject::from(claims));
                req.extensions_mut().insert(BearerToken(bearer));
            }
            Err(err) => {
                // Guarded routes will reject on the missing subject.
                debug!("bearer token rejected: {err}");
            }
        }
    }

    next.run(req).await
}

/// Evaluate the permission guard for every request.
pub async fn guard(
    Extension(registry): Extension<Arc<RouteRegistry>>,
    Extension(pool): Extension<PgPool>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // The matched route pattern already has parameter values substituted
    // with their placeholders; unmatched requests fall back to the raw path.
    let pattern = req.extensions().get::<MatchedPath>().map_or_else(
        || normalize_path(req.uri().path()).to_string(),
        |matched| matched.as_str().to_string(),
    );
    let method = req.method().clone();
    let subject = req.extensions().get::<AuthSubject>().cloned();
    let bearer = req.extensions().get::<BearerToken>().cloned();

    match guard::authorize_request(
        &registry,
        &pool,
        &method,
        &pattern,
        subject.as_ref(),
        bearer.as_ref().map(|token| token.0.as_str()),
    )
    .await
    {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_strips_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn extract_bearer_rejects_other_schemes_and_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);

        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
