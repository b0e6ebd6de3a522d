use crate::context::RequestContext;
use crate::errors::AuthError;
use crate::headers::set_bearer_challenge;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::{debug, error};

/// Identity resolved from the bearer token, available to proxied handlers
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub uid: String,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn unauthorized(state: &AppState) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    set_bearer_challenge(&mut response, &state.resource_metadata_url());
    response
}

/// Admits requests whose bearer token resolves to a user
pub(super) async fn resource_gate(
    State(state): State<AppState>,
    ctx: RequestContext,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        debug!("[{}] Missing bearer token", ctx.request_id);
        return unauthorized(&state);
    };

    match state.tokens.verify_access_token(token).await {
        Ok(Some(uid)) => {
            debug!("[{}] Bearer token accepted for uid {}", ctx.request_id, uid);
            request.extensions_mut().insert(AuthenticatedUser { uid });
            next.run(request).await
        }
        Ok(None) => {
            debug!("[{}] Unknown or expired bearer token", ctx.request_id);
            unauthorized(&state)
        }
        Err(e) => {
            error!("[{}] Failed to verify access token: {}", ctx.request_id, e);
            AuthError::server_error("Failed to verify access token").into_response()
        }
    }
}
