use axum::http::HeaderValue;
use axum::response::Response;
use http::header::{CACHE_CONTROL, PRAGMA, WWW_AUTHENTICATE};
use log::warn;

/// Cache-Control directives
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    pub no_store: bool,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set no-store directive
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    /// Convert to HeaderValue
    pub fn to_header_value(&self) -> HeaderValue {
        let mut parts = Vec::new();

        if self.no_store {
            parts.push("no-store");
        }

        HeaderValue::from_str(&parts.join(", ")).unwrap_or(HeaderValue::from_static(""))
    }
}

/// Helper struct for setting cache-related headers
#[derive(Debug, Clone, Default)]
pub struct CacheHeaders {
    cache_control: CacheControl,
    pragma_no_cache: bool,
}

impl CacheHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache control directives
    pub fn cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    /// Also send the HTTP/1.0 `Pragma: no-cache` header
    pub fn pragma_no_cache(mut self) -> Self {
        self.pragma_no_cache = true;
        self
    }

    /// Apply headers to a response
    pub fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, self.cache_control.to_header_value());
        if self.pragma_no_cache {
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
    }
}

/// Common cache control presets
pub mod presets {
    use super::*;

    /// Responses carrying credentials must never be cached (RFC 6749 5.1)
    pub fn credentials() -> CacheHeaders {
        CacheHeaders::new()
            .cache_control(CacheControl::new().no_store())
            .pragma_no_cache()
    }
}

/// Sets `WWW-Authenticate: Bearer resource_metadata="<url>"` (RFC 9728)
pub fn set_bearer_challenge(response: &mut Response, resource_metadata_url: &str) {
    match HeaderValue::from_str(&format!(
        "Bearer resource_metadata=\"{resource_metadata_url}\""
    )) {
        Ok(value) => {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        Err(e) => warn!("failed to set WWW-Authenticate header: {e}"),
    }
}
