//! HTTP boundary: router construction, middleware wiring and error
//! rendering.
//!
//! Route registration records each route's permission expression in the
//! route registry as a side effect, before the first request can reach the
//! guard. The bootstrap runs to completion before the listener is bound.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::MethodRouter,
    routing::{delete, get, post, put},
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;

use crate::bootstrap;
use crate::cli::globals::GlobalArgs;
use crate::error::EngineError;
use crate::guard::{Expr, RouteRegistry};

pub(crate) mod handlers;
mod middleware;

pub use middleware::BearerToken;

/// Build the API router, recording every route's permission expression in
/// the registry.
#[must_use]
pub fn router(registry: &mut RouteRegistry) -> Router {
    let builder = RouteBuilder::new(registry)
        .route(Method::GET, "/health", Expr::Public, get(handlers::health::health))
        .route(Method::POST, "/token", Expr::Public, post(handlers::tokens::issue))
        .route(Method::GET, "/me", Expr::Public, get(handlers::me::me))
        // Users
        .route(
            Method::POST,
            "/user",
            Expr::required("OAUTH2_user:create"),
            post(handlers::users::create),
        )
        .route(
            Method::GET,
            "/user",
            Expr::required("OAUTH2_user:select"),
            get(handlers::users::list),
        )
        .route(
            Method::GET,
            "/user/:id",
            Expr::required("OAUTH2_user:select"),
            get(handlers::users::get_one),
        )
        .route(
            Method::GET,
            "/user/:id/permissions",
            Expr::required("OAUTH2_user:select"),
            get(handlers::users::permissions),
        )
        .route(
            Method::PUT,
            "/user/:id/password",
            Expr::required("OAUTH2_user:update"),
            put(handlers::users::set_password),
        )
        .route(
            Method::PUT,
            "/user/:id/roles",
            Expr::required("OAUTH2_user:update"),
            put(handlers::users::set_roles),
        )
        .route(
            Method::DELETE,
            "/user/:id",
            Expr::required("OAUTH2_user:delete"),
            delete(handlers::users::remove),
        )
        // Clients
        .route(
            Method::POST,
            "/client",
            Expr::required("OAUTH2_client:create"),
            post(handlers::clients::create),
        )
        .route(
            Method::GET,
            "/client",
            Expr::required("OAUTH2_client:select"),
            get(handlers::clients::list),
        )
        .route(
            Method::POST,
            "/client/:id/token",
            Expr::required("OAUTH2_client:update"),
            post(handlers::clients::mint_long_lived),
        )
        .route(
            Method::DELETE,
            "/client/:id/token",
            Expr::required("OAUTH2_client:update"),
            delete(handlers::clients::clear_long_lived),
        )
        .route(
            Method::PUT,
            "/client/:id/revoke",
            Expr::required("OAUTH2_client:update"),
            put(handlers::clients::revoke),
        )
        .route(
            Method::PUT,
            "/client/:id/restore",
            Expr::required("OAUTH2_client:update"),
            put(handlers::clients::restore),
        )
        .route(
            Method::DELETE,
            "/client/:id",
            Expr::required("OAUTH2_client:delete"),
            delete(handlers::clients::remove),
        )
        // Roles
        .route(
            Method::POST,
            "/role",
            Expr::required("OAUTH2_role:create"),
            post(handlers::roles::create),
        )
        .route(
            Method::GET,
            "/role",
            Expr::required("OAUTH2_role:select"),
            get(handlers::roles::list),
        )
        .route(
            Method::GET,
            "/role/permissions",
            Expr::required("OAUTH2_role:select"),
            get(handlers::roles::permissions_tree),
        )
        .route(
            Method::PUT,
            "/role/:id",
            Expr::required("OAUTH2_role:update"),
            put(handlers::roles::update),
        )
        .route(
            Method::PUT,
            "/role/:id/permissions",
            Expr::required("OAUTH2_role:update"),
            put(handlers::roles::set_permissions),
        )
        .route(
            Method::DELETE,
            "/role/:id",
            Expr::required("OAUTH2_role:delete"),
            delete(handlers::roles::remove),
        )
        // Resources
        .route(
            Method::POST,
            "/resource",
            Expr::required("OAUTH2_resource:create"),
            post(handlers::resources::create),
        )
        .route(
            Method::GET,
            "/resource",
            Expr::required("OAUTH2_resource:select"),
            get(handlers::resources::list),
        )
        .route(
            Method::DELETE,
            "/resource/:id",
            Expr::required("OAUTH2_resource:delete"),
            delete(handlers::resources::remove),
        )
        // Applications
        .route(
            Method::POST,
            "/application",
            Expr::required("OAUTH2_application:create"),
            post(handlers::applications::create),
        )
        .route(
            Method::GET,
            "/application",
            Expr::required("OAUTH2_application:select"),
            get(handlers::applications::list),
        );

    builder.finish()
}

/// Start the server: connect, bootstrap, then listen.
///
/// # Errors
/// Returns an error if the pool cannot connect, the bootstrap fails, or the
/// listener cannot bind. Bootstrap failures are fatal by design.
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // The schema must be consistent before any guarded route serves traffic.
    let outcome = bootstrap::run(&pool, &globals.bootstrap_config())
        .await
        .context("Schema bootstrap failed")?;
    info!(
        rebuilt = outcome.rebuilt,
        seeded = outcome.seeded,
        "schema bootstrap complete"
    );

    let mut registry = RouteRegistry::new();
    let router = router(&mut registry);
    let registry = Arc::new(registry);

    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(globals.clone()))
            .layer(Extension(pool.clone()))
            .layer(Extension(registry.clone()))
            .layer(axum::middleware::from_fn(middleware::identity))
            .layer(axum::middleware::from_fn(middleware::guard)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

struct RouteBuilder<'a> {
    router: Router,
    registry: &'a mut RouteRegistry,
}

impl<'a> RouteBuilder<'a> {
    fn new(registry: &'a mut RouteRegistry) -> Self {
        Self {
            router: Router::new(),
            registry,
        }
    }

    /// Register the permission expression and the handler together, so a
    /// route can never reach the guard without a recorded expression.
    fn route(
        mut self,
        method: Method,
        path: &'static str,
        expr: Expr,
        service: MethodRouter,
    ) -> Self {
        self.registry.register(method, path, expr);
        self.router = self.router.route(path, service);
        self
    }

    fn finish(self) -> Router {
        self.router
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Programming errors are surfaced to the caller without detail
            // beyond the stable code.
            Self::Configuration(_) | Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Low-level store detail goes to the operator log, never the client.
        let message = match &self {
            Self::Store(err) => {
                error!("store failure: {err}");
                "store failure".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({ "code": self.code(), "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_registers_expressions_for_every_route() {
        let mut registry = RouteRegistry::new();
        let _router = router(&mut registry);

        assert!(!registry.is_empty());
        assert_eq!(
            registry.lookup(&Method::GET, "/health"),
            Some(&Expr::Public)
        );
        assert_eq!(registry.lookup(&Method::POST, "/token"), Some(&Expr::Public));
        assert_eq!(
            registry.lookup(&Method::POST, "/role"),
            Some(&Expr::required("OAUTH2_role:create"))
        );
        assert_eq!(
            registry.lookup(&Method::GET, "/user/:id/permissions"),
            Some(&Expr::required("OAUTH2_user:select"))
        );
        assert_eq!(registry.lookup(&Method::DELETE, "/role"), None);
    }

    #[test]
    fn error_rendering_maps_status_codes() {
        let cases = [
            (EngineError::configuration("x"), StatusCode::FORBIDDEN),
            (EngineError::authentication("x"), StatusCode::UNAUTHORIZED),
            (EngineError::authorization("x"), StatusCode::FORBIDDEN),
            (EngineError::not_found("x"), StatusCode::NOT_FOUND),
            (
                EngineError::Store(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
