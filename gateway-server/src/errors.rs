use crate::store::StoreError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use log::warn;
use serde::Serialize;
use serde_json::json;
use url::Url;

/// OAuth error codes returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidClientMetadata,
    InvalidRequest,
    UnauthorizedClient,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidClientMetadata => "invalid_client_metadata",
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::ServerError => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClientMetadata | Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::UnauthorizedClient => StatusCode::UNAUTHORIZED,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body, `{"error": ..., "error_description": ...}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub error_description: String,
}

/// Protocol error, rendered either as a JSON body or as a redirect back to
/// the client.
///
/// The redirect shape is only used once the redirect URI has been checked
/// against the client's registration.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    Json {
        error: ErrorCode,
        error_description: String,
    },
    Redirect {
        redirect_uri: String,
        error: ErrorCode,
        error_description: String,
        state: Option<String>,
    },
}

impl AuthError {
    pub fn json<S: ToString>(error: ErrorCode, description: S) -> Self {
        Self::Json {
            error,
            error_description: description.to_string(),
        }
    }

    pub fn invalid_request<S: ToString>(description: S) -> Self {
        Self::json(ErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client_metadata<S: ToString>(description: S) -> Self {
        Self::json(ErrorCode::InvalidClientMetadata, description)
    }

    pub fn server_error<S: ToString>(description: S) -> Self {
        Self::json(ErrorCode::ServerError, description)
    }

    /// Redirect error to an already trusted redirect URI
    pub fn redirect<S: ToString>(
        redirect_uri: &str,
        error: ErrorCode,
        description: S,
        state: Option<&str>,
    ) -> Self {
        Self::Redirect {
            redirect_uri: redirect_uri.to_string(),
            error,
            error_description: description.to_string(),
            // an empty state is treated as absent
            state: state.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Json { error, .. } | Self::Redirect { error, .. } => *error,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Json {
                error_description, ..
            }
            | Self::Redirect {
                error_description, ..
            } => error_description,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code().as_str(), self.description())
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::server_error(err)
    }
}

/// `302 Found` to `location`
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(e) => {
            warn!("Refusing to redirect to an invalid location: {}", e);
            AuthError::server_error("Invalid redirect location").into_response()
        }
    }
}

fn json_response(error: ErrorCode, error_description: String) -> Response {
    let body = json!({
        "error": error,
        "error_description": error_description,
    });
    (error.status_code(), Json(body)).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Json {
                error,
                error_description,
            } => json_response(error, error_description),
            Self::Redirect {
                redirect_uri,
                error,
                error_description,
                state,
            } => {
                let Ok(mut url) = Url::parse(&redirect_uri) else {
                    warn!("Cannot redirect error to unparsable URI '{}'", redirect_uri);
                    return json_response(ErrorCode::InvalidRequest, error_description);
                };
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("error", error.as_str());
                    query.append_pair("error_description", &error_description);
                    if let Some(state) = &state {
                        query.append_pair("state", state);
                    }
                }
                found(url.as_str())
            }
        }
    }
}
