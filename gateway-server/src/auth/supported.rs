//! Protocol values this server accepts, fixed at compile time.

pub const CLIENT_SECRET_BASIC: &str = "client_secret_basic";
pub const CLIENT_SECRET_POST: &str = "client_secret_post";
pub const AUTH_METHOD_NONE: &str = "none";
pub const AUTHORIZATION_CODE: &str = "authorization_code";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const RESPONSE_TYPE_CODE: &str = "code";
pub const S256: &str = "S256";

/// Sets of supported protocol values shared by the registration,
/// authorization and token validators
#[derive(Debug)]
pub struct SupportedValues {
    pub token_endpoint_auth_methods: &'static [&'static str],
    pub grant_types: &'static [&'static str],
    pub response_types: &'static [&'static str],
    pub code_challenge_methods: &'static [&'static str],
}

pub static SUPPORTED_VALUES: SupportedValues = SupportedValues {
    token_endpoint_auth_methods: &[CLIENT_SECRET_BASIC, CLIENT_SECRET_POST, AUTH_METHOD_NONE],
    grant_types: &[AUTHORIZATION_CODE, REFRESH_TOKEN],
    response_types: &[RESPONSE_TYPE_CODE],
    code_challenge_methods: &[S256],
};

impl SupportedValues {
    pub fn supports_auth_method(&self, method: &str) -> bool {
        self.token_endpoint_auth_methods.contains(&method)
    }

    pub fn supports_grant_type(&self, grant_type: &str) -> bool {
        self.grant_types.contains(&grant_type)
    }

    pub fn supports_response_type(&self, response_type: &str) -> bool {
        self.response_types.contains(&response_type)
    }

    pub fn supports_code_challenge_method(&self, method: &str) -> bool {
        self.code_challenge_methods.contains(&method)
    }

    pub fn to_vec(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }
}
