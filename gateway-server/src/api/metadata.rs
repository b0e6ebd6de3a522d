//! Discovery documents for OAuth clients (RFC 8414) and protected
//! resources (RFC 9728).

use crate::auth::{SupportedValues, SUPPORTED_VALUES};
use crate::openapi::METADATA_TAG;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub issuer: String,
    pub authorization_servers: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-protected-resource",
    tag = METADATA_TAG,
    responses(
        (status = 200, description = "Protected resource metadata", body = ProtectedResourceMetadata)
    )
)]
async fn protected_resource(State(state): State<AppState>) -> Json<ProtectedResourceMetadata> {
    let base_url = state.settings.base_url.clone();
    Json(ProtectedResourceMetadata {
        resource: base_url.clone(),
        issuer: base_url.clone(),
        authorization_servers: vec![base_url],
        token_endpoint_auth_methods_supported: SupportedValues::to_vec(
            SUPPORTED_VALUES.token_endpoint_auth_methods,
        ),
    })
}

#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = METADATA_TAG,
    responses(
        (status = 200, description = "Authorization server metadata", body = AuthorizationServerMetadata)
    )
)]
async fn authorization_server(
    State(state): State<AppState>,
) -> Json<AuthorizationServerMetadata> {
    let base_url = &state.settings.base_url;
    let supported = &SUPPORTED_VALUES;
    Json(AuthorizationServerMetadata {
        issuer: base_url.clone(),
        authorization_endpoint: format!("{base_url}/auth/authorize"),
        token_endpoint: format!("{base_url}/auth/token"),
        registration_endpoint: format!("{base_url}/auth/register"),
        response_types_supported: SupportedValues::to_vec(supported.response_types),
        grant_types_supported: SupportedValues::to_vec(supported.grant_types),
        token_endpoint_auth_methods_supported: SupportedValues::to_vec(
            supported.token_endpoint_auth_methods,
        ),
        code_challenge_methods_supported: SupportedValues::to_vec(supported.code_challenge_methods),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/.well-known/oauth-protected-resource",
            get(protected_resource),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            get(authorization_server),
        )
}
