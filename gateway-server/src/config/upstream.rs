//! Upstream OpenID Connect provider configuration

use confique::Config;

/// Upstream identity provider configuration
#[derive(Debug, Config, Clone, Default)]
pub struct UpstreamConfig {
    /// Issuer URL of the upstream provider, without a trailing slash
    #[config(env = "GATEWAY_UPSTREAM_ISSUER_URL")]
    pub issuer_url: String,

    /// Client id registered at the upstream provider
    #[config(env = "GATEWAY_UPSTREAM_CLIENT_ID")]
    pub client_id: String,

    /// Client secret registered at the upstream provider
    #[config(env = "GATEWAY_UPSTREAM_CLIENT_SECRET")]
    pub client_secret: String,

    /// Redirect URI the upstream provider sends the browser back to
    #[config(env = "GATEWAY_UPSTREAM_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Space separated scopes requested upstream (default: "openid profile email")
    #[config(env = "GATEWAY_UPSTREAM_SCOPES", default = "openid profile email")]
    pub scopes: String,

    /// Timeout for calls to the upstream provider in seconds (default: 10)
    #[config(env = "GATEWAY_UPSTREAM_TIMEOUT", default = 10)]
    pub timeout: u64,
}

impl UpstreamConfig {
    /// Get scopes as a vector
    pub fn get_scopes(&self) -> Vec<String> {
        self.scopes
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_scopes() {
        let config = UpstreamConfig {
            scopes: "openid  profile\temail".to_string(),
            ..Default::default()
        };
        assert_eq!(config.get_scopes(), vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_get_scopes_empty() {
        let config = UpstreamConfig::default();
        assert!(config.get_scopes().is_empty());
    }
}
