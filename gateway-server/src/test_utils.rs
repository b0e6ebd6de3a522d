use crate::config::{ProxyConfig, Settings, UpstreamConfig};
use crate::context::RequestContext;
use crate::create_app;
use crate::relay::HttpOidcClient;
use crate::state::AppState;
use crate::store::{memory::InMemoryStore, Store};
use axum::body::{Body, Bytes};
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const SIGNING_KEY: &[u8] = include_bytes!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/testdata/upstream_signing_key.pem"
));
const JWKS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/testdata/upstream_jwks.json"
));
const KEY_ID: &str = "test-key";

/// Test fixture for driving the whole application against mocked
/// collaborators.
///
/// The fixture starts a mock upstream identity provider (discovery document
/// and JWKS already mounted) and a mock resource served under `/api/`, and
/// builds the application on an in-memory store.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     let client = fixture
///         .register_client(json!({ "redirect_uris": ["https://app.example/cb"] }))
///         .await;
///
///     let response = fixture.get("/healthz").await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Application state shared with the router
    pub state: AppState,
    /// Configuration settings
    pub settings: Settings,
    /// Mock upstream OpenID provider
    pub upstream: MockUpstream,
    /// Mock server behind the `/api/` proxy
    pub resource_mock: MockServer,
}

impl TestFixture {
    /// Creates a fixture with the default `/api/` proxy pointing at
    /// `resource_mock`.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Creates a fixture whose only proxy is `proxy`
    pub async fn with_proxy(proxy: ProxyConfig) -> Self {
        Self::build(Some(proxy)).await
    }

    async fn build(proxy: Option<ProxyConfig>) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let upstream = MockUpstream::start().await;
        upstream.mount_jwks().await;
        let resource_mock = MockServer::start().await;

        let mut settings = Settings::for_test_with_mocks(&upstream.server, &resource_mock);
        if let Some(proxy) = proxy {
            settings.proxies = Some(vec![proxy]);
        }

        let oidc = HttpOidcClient::discover(&settings.upstream, reqwest::Client::new())
            .await
            .expect("Failed to discover mock provider");
        let store = Store::InMemory(
            InMemoryStore::new(settings.store.memory_capacity).expect("Failed to create store"),
        );
        let state = AppState::new(settings.clone(), store, Arc::new(oidc))
            .expect("Failed to create application state");
        let app = create_app(state.clone()).await;

        Self {
            app,
            state,
            settings,
            upstream,
            resource_mock,
        }
    }

    /// Initializes the test logger; repeated calls are ignored.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder for `method` and `uri`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let request = fixture
    ///     .request_builder(Method::POST, "/api/echo")
    ///     .header("Authorization", format!("Bearer {token}"))
    ///     .body(Body::from("payload"))
    ///     .expect("Failed to build request");
    ///
    /// let response = fixture.send(request).await;
    /// ```
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder().method(method).uri(uri.as_ref())
    }

    /// Sends a GET request to the specified URI.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    /// Sends a GET request with extra headers, e.g. a session cookie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .get_with_headers("/auth/authorize?...", &[("cookie", "sid=abc")])
    ///     .await;
    /// response.assert_status(StatusCode::FOUND);
    /// ```
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::GET, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");
        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .header("Content-Type", "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with an `application/x-www-form-urlencoded` body.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .post_form(
    ///         "/auth/token",
    ///         &[("grant_type", "refresh_token"), ("refresh_token", &token)],
    ///         &[],
    ///     )
    ///     .await;
    /// ```
    pub async fn post_form(
        &self,
        uri: impl AsRef<str>,
        form: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let mut builder = self
            .request_builder(Method::POST, uri)
            .header("Content-Type", "application/x-www-form-urlencoded");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and collects the whole response.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Registers a client and returns the client record
    pub async fn register_client(&self, metadata: Value) -> Value {
        let response = self.post("/auth/register", &metadata).await;
        response.assert_ok();
        response.json()
    }

    /// Mints an access token for `uid` directly in the store
    pub async fn access_token(&self, uid: &str) -> String {
        self.state
            .tokens
            .generate_access_token(&RequestContext::generate(), uid)
            .await
            .expect("Failed to generate access token")
    }

    /// Runs a browser login for `authorize_uri` and returns the final
    /// `Location`, the client redirect carrying the code or an error.
    ///
    /// The upstream provider authenticates the user as `sub`, echoing the
    /// nonce the gateway sent.
    pub async fn login(&self, authorize_uri: &str, sub: &str) -> String {
        let first = self.get(authorize_uri).await;
        first.assert_status(StatusCode::FOUND);
        let sid = first.cookie("sid").expect("Session cookie was not set");
        let cookie = format!("sid={sid}");

        let second = self
            .get_with_headers(first.location(), &[("cookie", &cookie)])
            .await;
        second.assert_status(StatusCode::FOUND);
        let login_url = second.location();
        let state = query_param(&login_url, "state").expect("Login URL has no state");
        let nonce = query_param(&login_url, "nonce").expect("Login URL has no nonce");

        let id_token =
            self.upstream
                .sign_id_token(sub, &self.settings.upstream.client_id, Some(&nonce));
        self.upstream.mount_token_response(&id_token).await;

        let callback = self
            .get_with_headers(
                format!("/auth/callback?state={state}&code=upstream-code"),
                &[("cookie", &cookie)],
            )
            .await;
        callback.assert_status(StatusCode::FOUND);
        callback.location()
    }
}

/// Response from a test request with convenient assertions.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Bytes,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match, printing the body.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Asserts that header `name` has exactly `expected` as its value
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        assert_eq!(
            self.header(name),
            Some(expected),
            "Unexpected value for header {name}"
        );
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Location` header of a redirect
    ///
    /// # Panics
    ///
    /// Panics if the response has no `Location` header.
    pub fn location(&self) -> String {
        self.header("location")
            .expect("Response has no Location header")
            .to_string()
    }

    /// Value of cookie `name` set by this response
    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.strip_prefix(&prefix))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Body parsed as JSON, an empty object when it is not JSON
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|_| json!({}))
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize response JSON")
    }
}

/// Mock upstream OpenID provider with a fixed RSA signing key.
pub struct MockUpstream {
    pub server: MockServer,
}

impl MockUpstream {
    /// Starts the server with the discovery document mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/keys"),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Gateway configuration for this provider
    pub fn config(&self) -> UpstreamConfig {
        UpstreamConfig {
            issuer_url: self.server.uri(),
            client_id: "gateway".to_string(),
            client_secret: "gateway-secret".to_string(),
            redirect_uri: "http://gateway.test/auth/callback".to_string(),
            scopes: "openid profile email".to_string(),
            timeout: 5,
        }
    }

    pub async fn mount_jwks(&self) {
        let jwks: Value = serde_json::from_str(JWKS).expect("Invalid test JWKS");
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&self.server)
            .await;
    }

    /// Answers the next code exchange with `id_token`
    pub async fn mount_token_response(&self, id_token: &str) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "upstream-access-token",
                "token_type": "Bearer",
                "expires_in": 300,
                "id_token": id_token
            })))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Signs arbitrary claims with the provider key
    pub fn sign_claims(&self, claims: Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KEY_ID.to_string());
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY).expect("Invalid test signing key");
        jsonwebtoken::encode(&header, &claims, &key).expect("Failed to sign test token")
    }

    /// A valid ID token for `sub` issued to `audience`
    pub fn sign_id_token(&self, sub: &str, audience: &str, nonce: Option<&str>) -> String {
        let now = chrono::Utc::now().timestamp();
        let mut claims = json!({
            "iss": self.server.uri(),
            "aud": audience,
            "sub": sub,
            "iat": now,
            "exp": now + 300,
            "name": "Test User",
            "email": format!("{sub}@example.com"),
            "preferred_username": sub,
        });
        if let Some(nonce) = nonce {
            claims["nonce"] = json!(nonce);
        }
        self.sign_claims(claims)
    }
}

/// First value of query parameter `name` in an absolute or relative URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url)
        .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(url)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
