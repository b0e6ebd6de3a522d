pub(crate) use crate::config::proxy::ProxyConfig;
pub(crate) use crate::config::store::{StoreBackend, StoreConfig};
pub(crate) use crate::config::upstream::UpstreamConfig;
use confique::Config;
use thiserror::Error;

pub mod proxy;
pub mod store;
pub mod upstream;

/// Default location of the optional configuration file
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] confique::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for the gateway server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// Public base URL of this server, used as issuer and in metadata
    /// (default: http://localhost:8080)
    #[config(env = "GATEWAY_BASE_URL", default = "http://localhost:8080")]
    pub base_url: String,

    /// The port the server will listen to (default: 8080)
    #[config(env = "GATEWAY_PORT", default = 8080)]
    pub port: u16,

    /// Key-value store configuration
    #[config(nested)]
    pub store: StoreConfig,

    /// Upstream identity provider configuration
    #[config(nested)]
    pub upstream: UpstreamConfig,

    /// Resources served behind the bearer token gate (config file only)
    pub proxies: Option<Vec<ProxyConfig>>,
}

impl Settings {
    /// Loads settings from environment variables, then the optional config file.
    ///
    /// Environment variables take precedence. The file path defaults to
    /// `config.toml` and can be changed with `GATEWAY_CONFIG_FILE`; a missing
    /// file is not an error.
    pub fn new() -> Result<Self, ConfigError> {
        let path = std::env::var("GATEWAY_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Self::builder().env().file(path).load()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The configured proxies, empty when none are set
    pub fn proxies(&self) -> &[ProxyConfig] {
        self.proxies.as_deref().unwrap_or_default()
    }

    /// Checks the URL shapes the rest of the server relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() || self.base_url.ends_with('/') {
            return Err(ConfigError::Invalid(
                "base_url must be set and must not end with '/'".to_string(),
            ));
        }
        if self.upstream.issuer_url.is_empty() || self.upstream.issuer_url.ends_with('/') {
            return Err(ConfigError::Invalid(
                "upstream.issuer_url must be set and must not end with '/'".to_string(),
            ));
        }
        if self.upstream.redirect_uri.is_empty() || self.upstream.redirect_uri.ends_with('/') {
            return Err(ConfigError::Invalid(
                "upstream.redirect_uri must be set and must not end with '/'".to_string(),
            ));
        }
        if self.upstream.client_id.is_empty() {
            return Err(ConfigError::Invalid(
                "upstream.client_id must be set".to_string(),
            ));
        }
        for proxy in self.proxies() {
            proxy.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        upstream_mock: &wiremock::MockServer,
        resource_mock: &wiremock::MockServer,
    ) -> Self {
        Self {
            base_url: "http://gateway.test".to_string(),
            port: 0, // Let the OS choose a port
            store: StoreConfig {
                backend: StoreBackend::InMemory,
                redis_url: String::new(),
                memory_capacity: 16,
            },
            upstream: UpstreamConfig {
                issuer_url: upstream_mock.uri(),
                client_id: "gateway".to_string(),
                client_secret: "gateway-secret".to_string(),
                redirect_uri: "http://gateway.test/auth/callback".to_string(),
                scopes: "openid profile email".to_string(),
                timeout: 5,
            },
            proxies: Some(vec![ProxyConfig {
                pattern: "/api/".to_string(),
                target_url: resource_mock.uri(),
            }]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_settings() -> Settings {
        Settings {
            base_url: "http://localhost:8080".to_string(),
            port: 8080,
            store: StoreConfig::default(),
            upstream: UpstreamConfig {
                issuer_url: "https://idp.example".to_string(),
                client_id: "gateway".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:8080/auth/callback".to_string(),
                scopes: "openid".to_string(),
                timeout: 10,
            },
            proxies: None,
        }
    }

    #[test]
    fn test_validate_accepts_valid_settings() {
        assert!(valid_settings().validate().is_ok());
        assert!(valid_settings().proxies().is_empty());
    }

    #[test]
    fn test_validate_rejects_trailing_slashes() {
        let mut settings = valid_settings();
        settings.base_url = "http://localhost:8080/".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        let mut settings = valid_settings();
        settings.upstream.issuer_url = "https://idp.example/".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        let mut settings = valid_settings();
        settings.upstream.redirect_uri = "http://localhost:8080/auth/callback/".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_checks_proxies() {
        let mut settings = valid_settings();
        settings.proxies = Some(vec![ProxyConfig {
            pattern: "/api".to_string(),
            target_url: "http://localhost:9000".to_string(),
        }]);
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_env_and_file() {
        let path = std::env::temp_dir().join(format!(
            "gateway-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        let mut file = std::fs::File::create(&path).expect("Failed to create config file");
        writeln!(
            file,
            r#"
port = 9999

[upstream]
client_secret = "from-file"

[[proxies]]
pattern = "/api/"
target_url = "http://localhost:9000"
"#
        )
        .expect("Failed to write config file");

        std::env::set_var("GATEWAY_CONFIG_FILE", &path);
        std::env::set_var("GATEWAY_PORT", "7000");
        std::env::set_var("GATEWAY_STORE_BACKEND", "in-memory");
        std::env::set_var("GATEWAY_UPSTREAM_ISSUER_URL", "https://idp.example");
        std::env::set_var("GATEWAY_UPSTREAM_CLIENT_ID", "gateway");
        std::env::set_var("GATEWAY_UPSTREAM_REDIRECT_URI", "http://localhost:7000/auth/callback");

        let settings = Settings::new();

        for name in [
            "GATEWAY_CONFIG_FILE",
            "GATEWAY_PORT",
            "GATEWAY_STORE_BACKEND",
            "GATEWAY_UPSTREAM_ISSUER_URL",
            "GATEWAY_UPSTREAM_CLIENT_ID",
            "GATEWAY_UPSTREAM_REDIRECT_URI",
        ] {
            std::env::remove_var(name);
        }
        let _ = std::fs::remove_file(&path);

        let settings = settings.expect("Failed to load settings");
        // env wins over the file
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.store.backend, StoreBackend::InMemory);
        assert_eq!(settings.store.memory_capacity, 64);
        assert_eq!(settings.base_url, "http://localhost:8080");
        assert_eq!(settings.upstream.client_secret, "from-file");
        assert_eq!(settings.upstream.scopes, "openid profile email");
        assert_eq!(settings.upstream.timeout, 10);
        assert_eq!(settings.proxies().len(), 1);
        assert_eq!(settings.proxies()[0].pattern, "/api/");
    }
}
