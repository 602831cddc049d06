use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that work with or without a session. Session-aware ones build their own
/// request-scoped `SessionStore` through the `SessionContext` extractor.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/login?redirect=...
        .route("/api/auth/login", post(handlers::login))
        // POST /api/auth/logout
        // Clears the session even when the upstream sign-out fails.
        .route("/api/auth/logout", post(handlers::logout))
        // GET /api/auth/session
        .route("/api/auth/session", get(handlers::get_session))
        // GET /api/navigate?path=/admin/users
        // The access guard's decision for a page route, for the SPA router.
        .route("/api/navigate", get(handlers::navigate))
}
