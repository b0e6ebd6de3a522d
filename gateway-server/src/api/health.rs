use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl Health {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            detail: None,
            status_code: StatusCode::OK,
        }
    }

    fn unavailable(detail: String) -> Self {
        Self {
            status: "unavailable".to_string(),
            detail: Some(detail),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/healthz",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is alive", body = Health)
    )
)]
async fn healthz() -> Health {
    Health::ok()
}

/// Readiness check, pings the key-value store
#[utoipa::path(
    get,
    path = "/readyz",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = Health),
        (status = 503, description = "Store is unreachable", body = Health)
    )
)]
async fn readyz(State(state): State<AppState>) -> Health {
    match state.health_check().await {
        Ok(()) => Health::ok(),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            Health::unavailable(e)
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
