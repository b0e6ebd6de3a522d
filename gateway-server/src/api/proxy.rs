use crate::api::resource_gate::{resource_gate, AuthenticatedUser};
use crate::config::ProxyConfig;
use crate::context::RequestContext;
use crate::state::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use log::{debug, error};
use std::error::Error as StdError;
use std::sync::Arc;

/// Largest request body forwarded to a resource
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Routes every configured proxy behind the bearer token gate
pub(super) fn router(state: &AppState) -> Router<AppState> {
    let mut router = Router::new();
    if state.settings.proxies().is_empty() {
        return router;
    }
    for proxy in state.settings.proxies() {
        let prefix = proxy.prefix().to_string();
        let target = Arc::new(proxy.clone());
        let handler = move |State(state): State<AppState>, ctx: RequestContext, request: Request| {
            let target = Arc::clone(&target);
            async move { forward(state, ctx, &target, request).await }
        };
        router = router
            .route(&prefix, any(handler.clone()))
            .route(&format!("{prefix}/"), any(handler.clone()))
            .route(&format!("{prefix}/{{*path}}"), any(handler));
    }
    router.route_layer(middleware::from_fn_with_state(state.clone(), resource_gate))
}

/// Target URL for `request`: the route prefix is stripped, the query kept
fn target_url(proxy: &ProxyConfig, request: &Request) -> String {
    let path = request.uri().path();
    let rest = path.strip_prefix(proxy.prefix()).unwrap_or(path);
    match request.uri().query() {
        Some(query) => format!("{}{}?{}", proxy.target_url, rest, query),
        None => format!("{}{}", proxy.target_url, rest),
    }
}

async fn forward(
    state: AppState,
    ctx: RequestContext,
    proxy: &ProxyConfig,
    request: Request,
) -> Response {
    let url = target_url(proxy, &request);
    let uid = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.uid.clone())
        .unwrap_or_default();
    debug!(
        "[{}] Forwarding {} {} for uid {}",
        ctx.request_id,
        request.method(),
        url,
        uid
    );

    let mut builder = state
        .proxy_client
        .request(request.method().clone(), &url);
    for (name, value) in request.headers() {
        if name == header::HOST || name == header::AUTHORIZATION {
            continue;
        }
        builder = builder.header(name, value);
    }

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[{}] Failed to read request body: {}", ctx.request_id, e);
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };
    if !body.is_empty() {
        builder = builder.body(body);
    }

    match builder.send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let headers = upstream.headers().clone();
            let bytes = match upstream.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("[{}] Failed to read resource response: {}", ctx.request_id, e);
                    return (StatusCode::BAD_GATEWAY, "Failed to read response body")
                        .into_response();
                }
            };

            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            for (name, value) in headers.iter() {
                // the body is re-framed by hyper
                if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
                    continue;
                }
                response.headers_mut().append(name, value.clone());
            }
            response
        }
        Err(e) => {
            error!(
                "[{}] Failed to reach resource {}: {} ({:?})",
                ctx.request_id,
                url,
                e,
                e.source()
            );
            let message = if e.is_timeout() {
                "Request to resource timed out"
            } else {
                "Failed to reach resource"
            };
            (StatusCode::BAD_GATEWAY, message).into_response()
        }
    }
}
