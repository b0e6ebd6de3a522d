use crate::auth::pkce::{is_valid_code_challenge_or_verifier, random_string};
use crate::auth::registry::Client;
use crate::auth::supported::SupportedValues;
use crate::context::RequestContext;
use crate::errors::{AuthError, ErrorCode};
use crate::store::Kvs;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::IntoParams;

/// Query parameters of an authorization request, kept until the upstream
/// login completes
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationParams {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub code_challenge_method: String,
}

/// What an authorization code is bound to
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthorizationCodeParams {
    pub uid: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
}

/// Validates authorization requests and mints authorization codes
#[derive(Clone)]
pub struct AuthorizationFlow {
    pending: Kvs,
    codes: Kvs,
    supported: &'static SupportedValues,
}

impl AuthorizationFlow {
    pub fn new(pending: Kvs, codes: Kvs, supported: &'static SupportedValues) -> Self {
        Self {
            pending,
            codes,
            supported,
        }
    }

    /// Checks the request against the client's registration.
    ///
    /// An unknown redirect URI is reported as JSON since it cannot be
    /// trusted; everything after that redirects back to the client.
    pub fn validate_client(
        &self,
        ctx: &RequestContext,
        params: &AuthorizationParams,
        client: &Client,
    ) -> Result<(), AuthError> {
        if !client.redirect_uris.contains(&params.redirect_uri) {
            warn!(
                "[{}] redirect_uri {} is not registered for client {}",
                ctx.request_id, params.redirect_uri, client.client_id
            );
            return Err(AuthError::invalid_request("redirect_uri is invalid"));
        }

        if !client.response_types.contains(&params.response_type) {
            return Err(AuthError::redirect(
                &params.redirect_uri,
                ErrorCode::InvalidRequest,
                "unsupported response_type",
                Some(&params.state),
            ));
        }

        Ok(())
    }

    /// Checks the PKCE parameters, reporting failures to the redirect URI
    pub fn validate_params(
        &self,
        ctx: &RequestContext,
        params: &AuthorizationParams,
    ) -> Result<(), AuthError> {
        let redirect_error = |description: String| {
            info!(
                "[{}] Rejected authorization request: {}",
                ctx.request_id, description
            );
            Err(AuthError::redirect(
                &params.redirect_uri,
                ErrorCode::InvalidRequest,
                description,
                Some(&params.state),
            ))
        };

        if params.state.is_empty() && params.code_challenge.is_empty() {
            return redirect_error("state or code_challenge is required".to_string());
        }

        if !self
            .supported
            .supports_code_challenge_method(&params.code_challenge_method)
        {
            return redirect_error(format!(
                "code_challenge_method must be {}",
                self.supported.code_challenge_methods.join(", ")
            ));
        }

        if !is_valid_code_challenge_or_verifier(&params.code_challenge) {
            return redirect_error(
                "code_challenge must be 43-128 chars and only [A-Z/a-z/0-9/-/./_/~] allowed"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Keeps the validated request under the session id until the callback
    pub async fn store_authorization(
        &self,
        ctx: &RequestContext,
        sid: &str,
        params: &AuthorizationParams,
    ) -> Result<(), AuthError> {
        self.pending.set(sid, params).await.map_err(|e| {
            error!("[{}] Failed to store authorization: {}", ctx.request_id, e);
            AuthError::server_error("Failed to store authorization")
        })
    }

    /// Consumes the pending request of a session; a second call finds nothing
    pub async fn take_authorization(
        &self,
        ctx: &RequestContext,
        sid: &str,
    ) -> Result<AuthorizationParams, AuthError> {
        match self.pending.get_del::<AuthorizationParams>(sid).await {
            Ok(Some(params)) => Ok(params),
            Ok(None) => {
                warn!("[{}] No pending authorization for session", ctx.request_id);
                Err(AuthError::invalid_request(
                    "no pending authorization for this session",
                ))
            }
            Err(e) => {
                error!("[{}] Failed to get authorization: {}", ctx.request_id, e);
                Err(AuthError::server_error("Failed to get authorization"))
            }
        }
    }

    /// Drops the pending request of a session whose upstream login failed
    pub async fn discard_authorization(&self, ctx: &RequestContext, sid: &str) {
        if let Err(e) = self.pending.delete(sid).await {
            warn!("[{}] Failed to discard authorization: {}", ctx.request_id, e);
        }
    }

    /// Mints a single-use code bound to the user, client and PKCE challenge
    pub async fn generate_authorization_code(
        &self,
        ctx: &RequestContext,
        params: &AuthorizationCodeParams,
    ) -> Result<String, AuthError> {
        let code = random_string(32);
        self.codes.set(&code, params).await.map_err(|e| {
            error!(
                "[{}] Failed to store authorization code: {}",
                ctx.request_id, e
            );
            AuthError::server_error("Failed to store authorization code")
        })?;
        info!(
            "[{}] Issued authorization code for client {}",
            ctx.request_id, params.client_id
        );
        Ok(code)
    }

    /// The client redirect carrying `code` and, when present, `state`
    pub fn completion_redirect(
        &self,
        params: &AuthorizationParams,
        code: &str,
    ) -> Result<String, AuthError> {
        let mut url = Url::parse(&params.redirect_uri)
            .map_err(|_| AuthError::server_error("Stored redirect_uri is invalid"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", code);
            if !params.state.is_empty() {
                query.append_pair("state", &params.state);
            }
        }
        Ok(url.into())
    }
}
