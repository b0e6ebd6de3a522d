//! OpenID Connect client for the upstream identity provider.
//!
//! Discovery happens once at startup. ID tokens are verified against the
//! provider JWKS, which is cached and refreshed once when a token names an
//! unknown `kid`.

use super::RelayError;
use crate::config::UpstreamConfig;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

/// Clock skew tolerated when checking `exp`
const LEEWAY_SECS: u64 = 60;

/// Claims read from a verified ID token
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// The upstream provider operations the relay depends on
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Login URL for the authorization code flow with PKCE
    fn authorization_url(&self, state: &str, nonce: &str, code_challenge: &str) -> String;

    /// Redeems an authorization code and returns the raw ID token
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, RelayError>;

    /// Checks signature, issuer, audience and expiry of an ID token
    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, RelayError>;
}

/// Subset of the provider metadata (OpenID Connect Discovery 1.0)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

pub struct HttpOidcClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    metadata: ProviderMetadata,
    authorization_endpoint: Url,
    jwks: RwLock<Option<JwkSet>>,
}

impl HttpOidcClient {
    /// Fetches `<issuer>/.well-known/openid-configuration` and builds a client
    pub async fn discover(
        config: &UpstreamConfig,
        http: reqwest::Client,
    ) -> Result<Self, RelayError> {
        let discovery_url = format!("{}/.well-known/openid-configuration", config.issuer_url);
        let response = http
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| RelayError::Discovery(format!("{discovery_url}: {e}")))?;
        if !response.status().is_success() {
            return Err(RelayError::Discovery(format!(
                "{discovery_url} returned {}",
                response.status()
            )));
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| RelayError::Discovery(format!("invalid provider metadata: {e}")))?;

        if metadata.issuer != config.issuer_url {
            return Err(RelayError::Discovery(format!(
                "issuer mismatch: expected {}, provider reports {}",
                config.issuer_url, metadata.issuer
            )));
        }
        let authorization_endpoint = Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| RelayError::Discovery(format!("invalid authorization_endpoint: {e}")))?;

        info!("Discovered upstream provider {}", metadata.issuer);
        Ok(Self {
            http,
            config: config.clone(),
            metadata,
            authorization_endpoint,
            jwks: RwLock::new(None),
        })
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, RelayError> {
        debug!("Fetching JWKS from {}", self.metadata.jwks_uri);
        let jwks: JwkSet = self
            .http
            .get(&self.metadata.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        *self.jwks.write().await = Some(jwks.clone());
        Ok(jwks)
    }

    /// Finds the key for `kid`, refetching the JWKS once if it is unknown
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, RelayError> {
        let cached = self.jwks.read().await.clone();
        let jwks = match cached {
            Some(jwks) if jwks.find(kid).is_some() => jwks,
            _ => self.fetch_jwks().await?,
        };
        let jwk = jwks
            .find(kid)
            .ok_or_else(|| RelayError::Verification(format!("unknown key id {kid}")))?;
        DecodingKey::from_jwk(jwk).map_err(|e| RelayError::Verification(e.to_string()))
    }
}

#[async_trait]
impl OidcClient for HttpOidcClient {
    fn authorization_url(&self, state: &str, nonce: &str, code_challenge: &str) -> String {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.get_scopes().join(" "))
            .append_pair("state", state)
            .append_pair("nonce", nonce)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url.into()
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<String, RelayError> {
        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Exchange(format!("{status}: {body}")));
        }

        let tokens: UpstreamTokenResponse = response.json().await?;
        tokens
            .id_token
            .filter(|token| !token.is_empty())
            .ok_or(RelayError::MissingIdToken)
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, RelayError> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| RelayError::Verification(e.to_string()))?;
        match header.alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::ES256
            | Algorithm::ES384 => {}
            other => {
                return Err(RelayError::Verification(format!(
                    "unsupported algorithm {other:?}"
                )))
            }
        }
        let kid = header
            .kid
            .ok_or_else(|| RelayError::Verification("missing kid".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = LEEWAY_SECS;
        validation.set_issuer(&[&self.metadata.issuer]);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| RelayError::Verification(e.to_string()))?;
        Ok(data.claims)
    }
}
