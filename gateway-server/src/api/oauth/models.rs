//! Request and response shapes owned by the HTTP layer

use crate::errors::{ErrorBody, ErrorCode};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

/// Query of the upstream provider's redirect back to the gateway
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
}

/// `405` answer for OAuth endpoints called with the wrong method
#[derive(Debug, Clone, Copy)]
pub struct MethodNotAllowed(pub &'static str);

impl IntoResponse for MethodNotAllowed {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorCode::InvalidRequest,
            error_description: format!("Only {} is supported for this endpoint.", self.0),
        };
        (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response()
    }
}
