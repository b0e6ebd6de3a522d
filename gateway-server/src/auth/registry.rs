use crate::auth::pkce::random_string;
use crate::auth::supported::{
    SupportedValues, AUTHORIZATION_CODE, CLIENT_SECRET_POST, RESPONSE_TYPE_CODE,
};
use crate::context::RequestContext;
use crate::errors::AuthError;
use crate::store::namespace::CLIENT_TTL;
use crate::store::Kvs;
use log::{error, info};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// How long a secret stays valid when the client asks for it to expire
const CLIENT_SECRET_LIFETIME_SECS: i64 = 90 * 24 * 60 * 60;

/// Client metadata accepted by dynamic registration (RFC 7591)
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct ClientMetadata {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    /// Any non-zero value requests an expiring secret
    #[serde(default)]
    pub client_secret_expires_at: Option<i64>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub logo_uri: Option<String>,
}

/// Metadata after validation, with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMetadata {
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub expiring_secret: bool,
    pub client_name: Option<String>,
    pub jwks_uri: Option<String>,
    pub logo_uri: Option<String>,
}

/// A registered client record
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub client_id_issued_at: i64,
    /// Unix seconds, 0 means the secret never expires
    pub client_secret_expires_at: i64,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}

impl Client {
    pub fn secret_expired(&self, now: i64) -> bool {
        self.client_secret_expires_at != 0 && self.client_secret_expires_at <= now
    }
}

/// Stores and loads dynamically registered clients
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Kvs,
    supported: &'static SupportedValues,
}

impl ClientRegistry {
    pub fn new(clients: Kvs, supported: &'static SupportedValues) -> Self {
        Self { clients, supported }
    }

    /// Validates registration metadata and fills in defaults
    pub fn register_validate(
        &self,
        ctx: &RequestContext,
        metadata: ClientMetadata,
    ) -> Result<ValidatedMetadata, AuthError> {
        if metadata.redirect_uris.is_empty() {
            return Err(AuthError::invalid_client_metadata(
                "redirect_uris is required",
            ));
        }
        for uri in &metadata.redirect_uris {
            if Url::parse(uri).is_err() {
                info!("[{}] Rejected redirect_uri {}", ctx.request_id, uri);
                return Err(AuthError::invalid_client_metadata(format!(
                    "redirect_uri '{uri}' is not an absolute URL"
                )));
            }
        }

        let token_endpoint_auth_method = match metadata.token_endpoint_auth_method {
            Some(method) if !method.is_empty() => method,
            _ => CLIENT_SECRET_POST.to_string(),
        };
        if !self.supported.supports_auth_method(&token_endpoint_auth_method) {
            return Err(AuthError::invalid_client_metadata(
                "unsupported token_endpoint_auth_method",
            ));
        }

        let grant_types = if metadata.grant_types.is_empty() {
            vec![AUTHORIZATION_CODE.to_string()]
        } else {
            metadata.grant_types
        };
        if !grant_types
            .iter()
            .all(|grant_type| self.supported.supports_grant_type(grant_type))
        {
            return Err(AuthError::invalid_client_metadata("unsupported grant_type"));
        }

        let response_types = if metadata.response_types.is_empty() {
            vec![RESPONSE_TYPE_CODE.to_string()]
        } else {
            metadata.response_types
        };
        if !response_types
            .iter()
            .all(|response_type| self.supported.supports_response_type(response_type))
        {
            return Err(AuthError::invalid_client_metadata(
                "unsupported response_type",
            ));
        }

        Ok(ValidatedMetadata {
            redirect_uris: metadata.redirect_uris,
            token_endpoint_auth_method,
            grant_types,
            response_types,
            expiring_secret: metadata.client_secret_expires_at.unwrap_or(0) != 0,
            client_name: metadata.client_name,
            jwks_uri: metadata.jwks_uri,
            logo_uri: metadata.logo_uri,
        })
    }

    /// Builds a new client record with fresh credentials
    pub fn register(&self, ctx: &RequestContext, metadata: ValidatedMetadata) -> Client {
        let now = chrono::Utc::now().timestamp();
        let client = Client {
            client_id: random_string(32),
            client_secret: random_string(32),
            client_id_issued_at: now,
            client_secret_expires_at: if metadata.expiring_secret {
                now + CLIENT_SECRET_LIFETIME_SECS
            } else {
                0
            },
            redirect_uris: metadata.redirect_uris,
            grant_types: metadata.grant_types,
            response_types: metadata.response_types,
            token_endpoint_auth_method: metadata.token_endpoint_auth_method,
            client_name: metadata.client_name,
            jwks_uri: metadata.jwks_uri,
            logo_uri: metadata.logo_uri,
        };
        info!(
            "[{}] Registered client {} (auth method: {})",
            ctx.request_id, client.client_id, client.token_endpoint_auth_method
        );
        client
    }

    /// Persists a client record, resetting its TTL
    pub async fn save_client(
        &self,
        ctx: &RequestContext,
        client_id: &str,
        client: &Client,
    ) -> Result<(), AuthError> {
        self.clients.set(client_id, client).await.map_err(|e| {
            error!("[{}] Failed to save client {}: {}", ctx.request_id, client_id, e);
            AuthError::server_error("Failed to save client")
        })?;
        info!(
            "[{}] Saved client {} for {} days",
            ctx.request_id,
            client_id,
            CLIENT_TTL.as_secs() / 86_400
        );
        Ok(())
    }

    pub async fn get_client(
        &self,
        ctx: &RequestContext,
        client_id: &str,
    ) -> Result<Client, AuthError> {
        if client_id.is_empty() {
            return Err(AuthError::invalid_request("client_id is required"));
        }
        match self.clients.get::<Client>(client_id).await {
            Ok(Some(client)) => Ok(client),
            Ok(None) => {
                info!("[{}] Unknown client {}", ctx.request_id, client_id);
                Err(AuthError::invalid_request("client_id is invalid"))
            }
            Err(e) => {
                error!("[{}] Failed to get client {}: {}", ctx.request_id, client_id, e);
                Err(AuthError::server_error("Failed to get client"))
            }
        }
    }
}
