use crate::auth::authorization::AuthorizationCodeParams;
use crate::auth::pkce::{is_valid_code_challenge_or_verifier, random_string, s256};
use crate::auth::registry::{Client, ClientRegistry};
use crate::auth::supported::{
    AUTHORIZATION_CODE, AUTH_METHOD_NONE, CLIENT_SECRET_BASIC, CLIENT_SECRET_POST, REFRESH_TOKEN,
};
use crate::context::RequestContext;
use crate::errors::AuthError;
use crate::store::{Kvs, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Form body of a token request, both grants share it
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub code_verifier: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token_type: String,
    pub expires_in: u64,
    pub access_token: String,
    pub refresh_token: String,
}

/// Client credentials carried in an `Authorization: Basic` header
#[derive(Debug, Clone, PartialEq)]
pub struct BasicCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl BasicCredentials {
    /// Decodes `Basic base64(id:secret)`; the secret may itself contain ':'
    pub fn parse(header: &str) -> Option<Self> {
        let payload = header.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(payload.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (client_id, client_secret) = decoded.split_once(':')?;
        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }
}

/// A validated `authorization_code` grant
#[derive(Debug, Clone, PartialEq)]
pub struct CodeGrant {
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub code_verifier: String,
    pub basic: Option<BasicCredentials>,
}

/// A validated `refresh_token` grant
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshGrant {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Executes token grants and resolves opaque tokens back to users
#[derive(Clone)]
pub struct TokenIssuer {
    registry: ClientRegistry,
    codes: Kvs,
    access_tokens: Kvs,
    refresh_tokens: Kvs,
}

impl TokenIssuer {
    pub fn new(
        registry: ClientRegistry,
        codes: Kvs,
        access_tokens: Kvs,
        refresh_tokens: Kvs,
    ) -> Self {
        Self {
            registry,
            codes,
            access_tokens,
            refresh_tokens,
        }
    }

    /// Lifetime of access tokens in seconds, reported as `expires_in`
    pub fn access_token_lifetime(&self) -> u64 {
        self.access_tokens.ttl().as_secs()
    }

    /// Runs the `authorization_code` grant end to end
    pub async fn exchange_authorization_code(
        &self,
        ctx: &RequestContext,
        request: &TokenRequest,
        authorization: Option<&str>,
    ) -> Result<TokenResponse, AuthError> {
        let grant = self.validate_code_grant(ctx, request, authorization)?;
        let client = self.registry.get_client(ctx, &grant.client_id).await?;
        self.validate_client(ctx, &grant, &client)?;
        self.authenticate_client(ctx, &grant, &client)?;
        let uid = self
            .verify_authorization_code(
                ctx,
                &grant.code,
                &grant.client_id,
                &grant.redirect_uri,
                &grant.code_verifier,
            )
            .await?;

        let access_token = self.generate_access_token(ctx, &uid).await?;
        let refresh_token = self.generate_refresh_token(ctx, &uid).await?;
        Ok(self.response(access_token, refresh_token))
    }

    /// Runs the `refresh_token` grant, returning the same refresh token
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        request: &TokenRequest,
    ) -> Result<TokenResponse, AuthError> {
        let grant = self.validate_refresh_grant(ctx, request)?;
        let client = self.registry.get_client(ctx, &grant.client_id).await?;
        self.validate_refresh_client(ctx, &grant, &client)?;
        let uid = self.verify_refresh_token(ctx, &grant.refresh_token).await?;
        let access_token = self.generate_access_token(ctx, &uid).await?;
        Ok(self.response(access_token, grant.refresh_token))
    }

    fn response(&self, access_token: String, refresh_token: String) -> TokenResponse {
        TokenResponse {
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_lifetime(),
            access_token,
            refresh_token,
        }
    }

    /// Parameter checks for the `authorization_code` grant.
    ///
    /// With an `Authorization` header the client id comes from the header
    /// and the form must not carry client credentials.
    pub fn validate_code_grant(
        &self,
        ctx: &RequestContext,
        request: &TokenRequest,
        authorization: Option<&str>,
    ) -> Result<CodeGrant, AuthError> {
        if request.grant_type != AUTHORIZATION_CODE {
            return Err(AuthError::invalid_request(
                "grant_type must be authorization_code",
            ));
        }

        let authorization = authorization.filter(|header| !header.is_empty());
        let basic = match authorization {
            Some(header) => {
                if !request.client_id.is_empty() || !request.client_secret.is_empty() {
                    return Err(AuthError::invalid_request(
                        "When Authorization header is present, client_id and client_secret form parameters must not be sent",
                    ));
                }
                let Some(credentials) = BasicCredentials::parse(header) else {
                    warn!("[{}] Malformed Authorization header", ctx.request_id);
                    return Err(AuthError::invalid_request(
                        "Authorization header must carry Basic client credentials",
                    ));
                };
                Some(credentials)
            }
            None => None,
        };

        let client_id = basic
            .as_ref()
            .map(|credentials| credentials.client_id.clone())
            .unwrap_or_else(|| request.client_id.clone());

        if request.code.is_empty()
            || request.redirect_uri.is_empty()
            || client_id.is_empty()
            || request.code_verifier.is_empty()
        {
            return Err(AuthError::invalid_request(
                "code, redirect_uri, client_id, and code_verifier are required",
            ));
        }
        if !is_valid_code_challenge_or_verifier(&request.code_verifier) {
            return Err(AuthError::invalid_request(
                "code_verifier must be 43-128 chars and only [A-Z/a-z/0-9/-/./_/~] allowed",
            ));
        }

        Ok(CodeGrant {
            code: request.code.clone(),
            redirect_uri: request.redirect_uri.clone(),
            client_id,
            client_secret: request.client_secret.clone(),
            code_verifier: request.code_verifier.clone(),
            basic,
        })
    }

    pub fn validate_client(
        &self,
        ctx: &RequestContext,
        grant: &CodeGrant,
        client: &Client,
    ) -> Result<(), AuthError> {
        if !client.redirect_uris.contains(&grant.redirect_uri) {
            warn!(
                "[{}] redirect_uri {} is not registered for client {}",
                ctx.request_id, grant.redirect_uri, client.client_id
            );
            return Err(AuthError::invalid_request("redirect_uri is invalid"));
        }
        if !client
            .grant_types
            .iter()
            .any(|grant_type| grant_type == AUTHORIZATION_CODE)
        {
            return Err(AuthError::invalid_request(
                "grant_type is not allowed for this client",
            ));
        }
        Ok(())
    }

    /// Authenticates the client with its registered token endpoint method
    pub fn authenticate_client(
        &self,
        ctx: &RequestContext,
        grant: &CodeGrant,
        client: &Client,
    ) -> Result<(), AuthError> {
        let passed = match client.token_endpoint_auth_method.as_str() {
            CLIENT_SECRET_POST => {
                !grant.client_secret.is_empty() && grant.client_secret == client.client_secret
            }
            CLIENT_SECRET_BASIC => grant.basic.as_ref().is_some_and(|credentials| {
                credentials.client_id == grant.client_id
                    && credentials.client_secret == client.client_secret
            }),
            AUTH_METHOD_NONE => return Ok(()),
            other => {
                warn!(
                    "[{}] Client {} has unsupported auth method {}",
                    ctx.request_id, client.client_id, other
                );
                return Err(AuthError::invalid_request(
                    "unsupported token_endpoint_auth_method",
                ));
            }
        };

        if !passed {
            warn!(
                "[{}] Client authentication failed for {}",
                ctx.request_id, client.client_id
            );
            return Err(AuthError::invalid_request(
                "invalid client_id and client_secret",
            ));
        }
        Self::check_secret_expiry(client)
    }

    fn check_secret_expiry(client: &Client) -> Result<(), AuthError> {
        if client.secret_expired(chrono::Utc::now().timestamp()) {
            return Err(AuthError::invalid_request("client_secret has expired"));
        }
        Ok(())
    }

    /// Consumes an authorization code and returns the user it was issued for.
    ///
    /// The code is deleted before any comparison, so a failed attempt also
    /// burns it.
    pub async fn verify_authorization_code(
        &self,
        ctx: &RequestContext,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<String, AuthError> {
        let stored = match self.codes.get_del::<AuthorizationCodeParams>(code).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                warn!(
                    "[{}] Authorization code is unknown, expired or already used",
                    ctx.request_id
                );
                return Err(AuthError::invalid_request(
                    "authorization code is invalid or expired",
                ));
            }
            Err(e) => {
                error!(
                    "[{}] Failed to get authorization code: {}",
                    ctx.request_id, e
                );
                return Err(AuthError::server_error("Failed to get authorization code"));
            }
        };

        if stored.client_id != client_id || stored.redirect_uri != redirect_uri {
            return Err(AuthError::invalid_request("Invalid client or redirect URI"));
        }
        if s256(code_verifier) != stored.code_challenge {
            return Err(AuthError::invalid_request("Invalid code challenge"));
        }

        Ok(stored.uid)
    }

    pub async fn generate_access_token(
        &self,
        ctx: &RequestContext,
        uid: &str,
    ) -> Result<String, AuthError> {
        let token = random_string(32);
        self.access_tokens.set(&token, &uid).await.map_err(|e| {
            error!("[{}] Failed to store access token: {}", ctx.request_id, e);
            AuthError::server_error("Failed to generate access token")
        })?;
        info!("[{}] Generated access token for uid {}", ctx.request_id, uid);
        Ok(token)
    }

    pub async fn generate_refresh_token(
        &self,
        ctx: &RequestContext,
        uid: &str,
    ) -> Result<String, AuthError> {
        let token = random_string(32);
        self.refresh_tokens.set(&token, &uid).await.map_err(|e| {
            error!("[{}] Failed to store refresh token: {}", ctx.request_id, e);
            AuthError::server_error("Failed to generate refresh token")
        })?;
        info!("[{}] Generated refresh token for uid {}", ctx.request_id, uid);
        Ok(token)
    }

    /// Resolves an access token to its uid, `None` when unknown or expired
    pub async fn verify_access_token(&self, token: &str) -> Result<Option<String>, StoreError> {
        if token.is_empty() {
            return Ok(None);
        }
        self.access_tokens.get::<String>(token).await
    }

    pub fn validate_refresh_grant(
        &self,
        _ctx: &RequestContext,
        request: &TokenRequest,
    ) -> Result<RefreshGrant, AuthError> {
        if request.grant_type != REFRESH_TOKEN {
            return Err(AuthError::invalid_request(
                "grant_type must be refresh_token",
            ));
        }
        if request.refresh_token.is_empty() {
            return Err(AuthError::invalid_request("refresh_token is required"));
        }
        if request.client_id.is_empty() || request.client_secret.is_empty() {
            return Err(AuthError::invalid_request(
                "client_id and client_secret are required",
            ));
        }
        Ok(RefreshGrant {
            refresh_token: request.refresh_token.clone(),
            client_id: request.client_id.clone(),
            client_secret: request.client_secret.clone(),
        })
    }

    /// Plain secret comparison, independent of the registered auth method
    pub fn validate_refresh_client(
        &self,
        ctx: &RequestContext,
        grant: &RefreshGrant,
        client: &Client,
    ) -> Result<(), AuthError> {
        if grant.client_id != client.client_id {
            return Err(AuthError::invalid_request("client_id is invalid"));
        }
        if grant.client_secret != client.client_secret {
            warn!(
                "[{}] Refresh with wrong secret for client {}",
                ctx.request_id, client.client_id
            );
            return Err(AuthError::invalid_request("client_secret is invalid"));
        }
        Self::check_secret_expiry(client)
    }

    pub async fn verify_refresh_token(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> Result<String, AuthError> {
        match self.refresh_tokens.get::<String>(token).await {
            Ok(Some(uid)) => Ok(uid),
            Ok(None) => {
                warn!("[{}] Unknown or expired refresh token", ctx.request_id);
                Err(AuthError::invalid_request(
                    "refresh_token is invalid or expired",
                ))
            }
            Err(e) => {
                error!("[{}] Failed to verify refresh token: {}", ctx.request_id, e);
                Err(AuthError::server_error("Failed to verify refresh token"))
            }
        }
    }
}
