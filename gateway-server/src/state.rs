use crate::auth::{AuthorizationFlow, ClientRegistry, TokenIssuer, SUPPORTED_VALUES};
use crate::config::Settings;
use crate::relay::{OidcClient, UpstreamRelay};
use crate::store::namespace::{
    ACCESS_TOKEN_TTL, AUTHORIZATION_CODE_TTL, CLIENT_TTL, PENDING_AUTHORIZATION_TTL,
    REFRESH_TOKEN_TTL,
};
use crate::store::{Kvs, KvsBackend, Store};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Store,
    pub registry: ClientRegistry,
    pub flow: AuthorizationFlow,
    pub tokens: TokenIssuer,
    pub relay: UpstreamRelay,
    /// Client used to forward requests to proxied resources
    pub proxy_client: Client,
}

impl AppState {
    /// Client for proxied resources. Redirects are passed back to the caller
    /// instead of being followed.
    pub fn create_proxy_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .redirect(Policy::none())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
    }

    /// Client for the upstream identity provider
    pub fn create_upstream_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .build()
    }

    pub fn new(
        settings: Settings,
        store: Store,
        oidc: Arc<dyn OidcClient>,
    ) -> Result<Self, reqwest::Error> {
        let proxy_client = Self::create_proxy_client(settings.upstream.timeout)?;

        let codes = Kvs::new(store.clone(), "code", AUTHORIZATION_CODE_TTL);
        let registry = ClientRegistry::new(
            Kvs::new(store.clone(), "client", CLIENT_TTL),
            &SUPPORTED_VALUES,
        );
        let flow = AuthorizationFlow::new(
            Kvs::new(store.clone(), "authorization", PENDING_AUTHORIZATION_TTL),
            codes.clone(),
            &SUPPORTED_VALUES,
        );
        let tokens = TokenIssuer::new(
            registry.clone(),
            codes,
            Kvs::new(store.clone(), "access_token", ACCESS_TOKEN_TTL),
            Kvs::new(store.clone(), "refresh_token", REFRESH_TOKEN_TTL),
        );
        let relay = UpstreamRelay::new(store.clone(), oidc);

        Ok(Self {
            settings: Arc::new(settings),
            store,
            registry,
            flow,
            tokens,
            relay,
            proxy_client,
        })
    }

    /// Readiness of the backing store
    pub async fn health_check(&self) -> Result<(), String> {
        self.store.health_check().await
    }

    /// URL of the protected resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        format!(
            "{}/.well-known/oauth-protected-resource",
            self.settings.base_url
        )
    }
}
