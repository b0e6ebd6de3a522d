pub(crate) mod health;
pub(crate) mod metadata;
pub(crate) mod oauth;
mod proxy;
mod resource_gate;
mod session;

use crate::context::request_context_middleware;
use crate::state::AppState;
use axum::{middleware, Router};

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(metadata::router())
        .merge(oauth::router())
        .merge(proxy::router(state))
        // layer rather than route_layer so unmatched requests are logged too
        .layer(middleware::from_fn(request_context_middleware))
}
