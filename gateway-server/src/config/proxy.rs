use serde::Deserialize;

/// A resource served behind the bearer token gate
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Path prefix matched on inbound requests, e.g. `/api/`
    pub pattern: String,
    /// Base URL requests are forwarded to, e.g. `http://localhost:9000`
    pub target_url: String,
}

impl ProxyConfig {
    /// The pattern without its trailing slash, used as the route prefix
    pub fn prefix(&self) -> &str {
        self.pattern.trim_end_matches('/')
    }

    /// Checks the pattern and target shapes the router relies on
    pub fn validate(&self) -> Result<(), String> {
        if !self.pattern.starts_with('/') || !self.pattern.ends_with('/') {
            return Err(format!(
                "proxy pattern '{}' must start and end with '/'",
                self.pattern
            ));
        }
        if self.prefix().is_empty() {
            return Err("proxy pattern '/' would shadow every route".to_string());
        }
        if !self.target_url.starts_with("http") {
            return Err(format!(
                "proxy target '{}' must be an http(s) URL",
                self.target_url
            ));
        }
        if self.target_url.ends_with('/') {
            return Err(format!(
                "proxy target '{}' must not end with '/'",
                self.target_url
            ));
        }
        Ok(())
    }
}
