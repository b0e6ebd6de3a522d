//! OAuth 2.0 authorization server core: client registration, the
//! authorization code flow with PKCE, and token issuance.
//!
//! All state lives in the key-value store under per-purpose namespaces, so
//! any number of server instances can share one Redis.

pub mod authorization;
pub mod pkce;
pub mod registry;
pub mod supported;
pub mod token;

pub use authorization::{AuthorizationCodeParams, AuthorizationFlow, AuthorizationParams};
pub use registry::{Client, ClientMetadata, ClientRegistry};
pub use supported::{SupportedValues, SUPPORTED_VALUES};
pub use token::{TokenIssuer, TokenRequest, TokenResponse};
