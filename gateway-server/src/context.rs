use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use http::HeaderValue;
use log::info;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request scoped values passed explicitly into engine operations
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    pub fn new<S: Into<String>>(request_id: S) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Context with a freshly generated request id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(RequestContext::generate))
    }
}

fn client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Attaches a [`RequestContext`] to every request and logs its completion.
///
/// The request id is taken from `X-Request-Id` when the caller supplies one
/// and echoed back on the response.
pub async fn request_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let ctx = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(RequestContext::new)
        .unwrap_or_else(RequestContext::generate);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let ip = client_ip(&request);
    let user_agent = request
        .headers()
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        "[{}] Request completed: {} {} status={} duration={:?} ip={} user_agent={}",
        ctx.request_id,
        method,
        path,
        response.status().as_u16(),
        started.elapsed(),
        ip,
        user_agent
    );
    response
}
