use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const METADATA_TAG: &str = "Discovery API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0 API";

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::healthz,
        crate::api::health::readyz,
        crate::api::metadata::protected_resource,
        crate::api::metadata::authorization_server,
        crate::api::oauth::handlers::register,
        crate::api::oauth::handlers::authorize,
        crate::api::oauth::handlers::callback,
        crate::api::oauth::handlers::token,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = METADATA_TAG, description = "OAuth server and protected resource metadata"),
        (name = OAUTH_TAG, description = "Client registration, authorization and token endpoints"),
    ),
    info(
        title = "OAuth Gateway API",
        description = "OAuth 2.0 authorization server in front of an OpenID Connect provider",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
