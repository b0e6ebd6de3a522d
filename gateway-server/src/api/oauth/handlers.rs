//! OAuth 2.0 endpoint handlers

use crate::api::oauth::models::CallbackParams;
use crate::api::session::Session;
use crate::auth::supported::{AUTHORIZATION_CODE, REFRESH_TOKEN};
use crate::auth::{AuthorizationCodeParams, AuthorizationParams, Client, ClientMetadata};
use crate::auth::{TokenRequest, TokenResponse};
use crate::context::RequestContext;
use crate::errors::{found, AuthError, ErrorBody};
use crate::headers::presets;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use log::{error, info, warn};

/// Dynamic client registration (RFC 7591)
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = OAUTH_TAG,
    request_body(content = ClientMetadata, content_type = "application/json"),
    responses(
        (status = 200, description = "Client registered", body = Client),
        (status = 400, description = "Invalid client metadata", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    payload: Result<Json<ClientMetadata>, JsonRejection>,
) -> Response {
    let metadata = match payload {
        Ok(Json(metadata)) => metadata,
        Err(JsonRejection::MissingJsonContentType(_)) => {
            warn!("[{}] Registration without JSON content type", ctx.request_id);
            return AuthError::invalid_request("Content-Type must be application/json")
                .into_response();
        }
        Err(rejection) => {
            warn!(
                "[{}] Failed to decode registration body: {}",
                ctx.request_id, rejection
            );
            return AuthError::invalid_client_metadata("Failed to decode request body")
                .into_response();
        }
    };

    let result = async {
        let validated = state.registry.register_validate(&ctx, metadata)?;
        let client = state.registry.register(&ctx, validated);
        state
            .registry
            .save_client(&ctx, &client.client_id, &client)
            .await?;
        Ok::<_, AuthError>(client)
    }
    .await;

    match result {
        Ok(client) => {
            let mut response = Json(client).into_response();
            presets::credentials().apply(&mut response);
            response
        }
        Err(e) => e.into_response(),
    }
}

/// Authorization endpoint (RFC 6749 4.1.1).
///
/// The first visit only establishes the session cookie and redirects to
/// itself; the second validates the request and sends the browser to the
/// upstream login.
#[utoipa::path(
    get,
    path = "/auth/authorize",
    tag = OAUTH_TAG,
    params(AuthorizationParams),
    responses(
        (status = 302, description = "Redirect to the upstream login, to self, or an error redirect to the client"),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Store or upstream failure", body = ErrorBody)
    )
)]
pub async fn authorize(
    State(state): State<AppState>,
    ctx: RequestContext,
    Extension(session): Extension<Session>,
    uri: Uri,
    query: Result<Query<AuthorizationParams>, QueryRejection>,
) -> Response {
    if session.fresh {
        // wait for the browser to echo the cookie
        return found(&uri.to_string());
    }
    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return AuthError::invalid_request(rejection.body_text()).into_response();
        }
    };

    match start_authorization(&state, &ctx, &session, &params).await {
        Ok(login_url) => found(&login_url),
        Err(e) => e.into_response(),
    }
}

async fn start_authorization(
    state: &AppState,
    ctx: &RequestContext,
    session: &Session,
    params: &AuthorizationParams,
) -> Result<String, AuthError> {
    let client = state.registry.get_client(ctx, &params.client_id).await?;
    state.flow.validate_client(ctx, params, &client)?;
    state.flow.validate_params(ctx, params)?;
    state
        .flow
        .store_authorization(ctx, &session.id, params)
        .await?;

    state
        .relay
        .get_auth_code_url(ctx, &session.id)
        .await
        .map_err(|e| {
            error!("[{}] Failed to start upstream login: {}", ctx.request_id, e);
            AuthError::server_error("Failed to start upstream login")
        })
}

/// Redirect target of the upstream provider
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = OAUTH_TAG,
    params(CallbackParams),
    responses(
        (status = 302, description = "Redirect to the client with an authorization code"),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Upstream login failed", body = ErrorBody)
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    ctx: RequestContext,
    Extension(session): Extension<Session>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    if session.fresh {
        warn!("[{}] Callback without a session cookie", ctx.request_id);
        return AuthError::invalid_request("session cookie is missing").into_response();
    }
    let Query(params) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return AuthError::invalid_request(rejection.body_text()).into_response();
        }
    };

    match complete_authorization(&state, &ctx, &session, &params).await {
        Ok(location) => found(&location),
        Err(e) => e.into_response(),
    }
}

async fn complete_authorization(
    state: &AppState,
    ctx: &RequestContext,
    session: &Session,
    params: &CallbackParams,
) -> Result<String, AuthError> {
    let claims = match state
        .relay
        .callback(ctx, &session.id, &params.state, &params.code)
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            error!("[{}] Upstream login failed: {}", ctx.request_id, e);
            state.flow.discard_authorization(ctx, &session.id).await;
            return Err(AuthError::server_error("Upstream login failed"));
        }
    };

    let authorization = state.flow.take_authorization(ctx, &session.id).await?;
    let code = state
        .flow
        .generate_authorization_code(
            ctx,
            &AuthorizationCodeParams {
                uid: claims.sub,
                client_id: authorization.client_id.clone(),
                redirect_uri: authorization.redirect_uri.clone(),
                code_challenge: authorization.code_challenge.clone(),
            },
        )
        .await?;
    state.flow.completion_redirect(&authorization, &code)
}

/// Token endpoint (RFC 6749 3.2)
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = OAUTH_TAG,
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub async fn token(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(FormRejection::InvalidFormContentType(_)) => {
            warn!("[{}] Token request without form content type", ctx.request_id);
            return AuthError::invalid_request(
                "Content-Type must be application/x-www-form-urlencoded",
            )
            .into_response();
        }
        Err(rejection) => {
            return AuthError::invalid_request(rejection.body_text()).into_response();
        }
    };
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());

    let result = match request.grant_type.as_str() {
        AUTHORIZATION_CODE => {
            state
                .tokens
                .exchange_authorization_code(&ctx, &request, authorization)
                .await
        }
        REFRESH_TOKEN => state.tokens.refresh(&ctx, &request).await,
        other => {
            info!("[{}] Unsupported grant_type '{}'", ctx.request_id, other);
            Err(AuthError::invalid_request("unsupported grant_type"))
        }
    };

    let mut response = match result {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => e.into_response(),
    };
    presets::credentials().apply(&mut response);
    response
}
