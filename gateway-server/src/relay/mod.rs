//! Delegation of user authentication to the upstream OpenID provider.
//!
//! The gateway plays the relying party: it sends the browser to the
//! provider with a fresh state, nonce and PKCE verifier, then on callback
//! checks all three before trusting the ID token subject.

pub mod oidc;

use crate::auth::pkce::{random_string, s256};
use crate::context::RequestContext;
use crate::store::namespace::UPSTREAM_CORRELATOR_TTL;
use crate::store::{Kvs, Store, StoreError};
use log::{info, warn};
pub use oidc::{HttpOidcClient, IdTokenClaims, OidcClient};
use std::sync::Arc;
use thiserror::Error;

const STATE_BYTES: usize = 16;
const NONCE_BYTES: usize = 16;
const VERIFIER_BYTES: usize = 96;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream discovery failed: {0}")]
    Discovery(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("No upstream {0} recorded for this session")]
    MissingCorrelator(&'static str),
    #[error("Upstream state does not match")]
    StateMismatch,
    #[error("Upstream code exchange failed: {0}")]
    Exchange(String),
    #[error("Upstream token response has no id_token")]
    MissingIdToken,
    #[error("ID token verification failed: {0}")]
    Verification(String),
    #[error("ID token nonce does not match")]
    NonceMismatch,
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-session correlation with the upstream login
#[derive(Clone)]
pub struct UpstreamRelay {
    states: Kvs,
    nonces: Kvs,
    verifiers: Kvs,
    oidc: Arc<dyn OidcClient>,
}

impl UpstreamRelay {
    pub fn new(store: Store, oidc: Arc<dyn OidcClient>) -> Self {
        Self {
            states: Kvs::new(store.clone(), "upstream_state", UPSTREAM_CORRELATOR_TTL),
            nonces: Kvs::new(store.clone(), "upstream_nonce", UPSTREAM_CORRELATOR_TTL),
            verifiers: Kvs::new(store, "upstream_verifier", UPSTREAM_CORRELATOR_TTL),
            oidc,
        }
    }

    /// Records fresh correlators for the session and returns the login URL.
    ///
    /// A second call for the same session replaces the earlier correlators.
    pub async fn get_auth_code_url(
        &self,
        ctx: &RequestContext,
        sid: &str,
    ) -> Result<String, RelayError> {
        let state = random_string(STATE_BYTES);
        let nonce = random_string(NONCE_BYTES);
        let verifier = random_string(VERIFIER_BYTES);

        self.states.set(sid, &state).await?;
        self.nonces.set(sid, &nonce).await?;
        self.verifiers.set(sid, &verifier).await?;

        info!("[{}] Redirecting session to upstream login", ctx.request_id);
        Ok(self.oidc.authorization_url(&state, &nonce, &s256(&verifier)))
    }

    /// Completes the upstream login and returns the verified identity.
    ///
    /// Correlators are consumed before any check so a failed callback
    /// cannot be retried with the same values.
    pub async fn callback(
        &self,
        ctx: &RequestContext,
        sid: &str,
        state: &str,
        code: &str,
    ) -> Result<IdTokenClaims, RelayError> {
        let expected_state = self.states.get_del::<String>(sid).await;
        let verifier = self.verifiers.get_del::<String>(sid).await;
        let expected_nonce = self.nonces.get_del::<String>(sid).await;
        let (expected_state, verifier, expected_nonce) =
            (expected_state?, verifier?, expected_nonce?);

        let expected_state = expected_state.ok_or(RelayError::MissingCorrelator("state"))?;
        if expected_state != state {
            warn!("[{}] Upstream callback state mismatch", ctx.request_id);
            return Err(RelayError::StateMismatch);
        }
        let verifier = verifier.ok_or(RelayError::MissingCorrelator("code_verifier"))?;
        let expected_nonce = expected_nonce.ok_or(RelayError::MissingCorrelator("nonce"))?;

        let id_token = self.oidc.exchange_code(code, &verifier).await?;
        let claims = self.oidc.verify_id_token(&id_token).await?;
        if claims.nonce.as_deref() != Some(expected_nonce.as_str()) {
            warn!("[{}] ID token nonce mismatch", ctx.request_id);
            return Err(RelayError::NonceMismatch);
        }

        info!(
            "[{}] Upstream login completed for subject {}",
            ctx.request_id, claims.sub
        );
        Ok(claims)
    }
}
