//! OAuth 2.0 endpoints: dynamic client registration (RFC 7591), the
//! authorization code flow with PKCE (RFC 6749, RFC 7636) and the token
//! endpoint.
//!
//! `/auth/authorize` and `/auth/callback` run behind the session
//! middleware, which ties the upstream login round trip to one browser.

pub mod handlers;
pub mod models;

use crate::api::session::session_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use models::MethodNotAllowed;

async fn only_get() -> MethodNotAllowed {
    MethodNotAllowed("GET")
}

async fn only_post() -> MethodNotAllowed {
    MethodNotAllowed("POST")
}

/// Creates OAuth 2.0 routes
pub fn router() -> Router<AppState> {
    let browser_flow = Router::new()
        .route(
            "/auth/authorize",
            get(handlers::authorize).fallback(only_get),
        )
        .route("/auth/callback", get(handlers::callback).fallback(only_get))
        .route_layer(middleware::from_fn(session_middleware));

    Router::new()
        .route(
            "/auth/register",
            post(handlers::register).fallback(only_post),
        )
        .route("/auth/token", post(handlers::token).fallback(only_post))
        .merge(browser_flow)
}
