use crate::config::GateConfig;
use crate::create_app;
use crate::identity::static_verifier::StaticVerifier;
use crate::identity::{CredentialVerifier, VerificationError, VerifiedUser};
use crate::oauth::pkce::ChallengeMethod;
use crate::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::header::LOCATION;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

/// PKCE verifier shared by tests that do not care about its value
pub const TEST_VERIFIER: &str = "abc123def456ghi789jkl012mno345pqr678stu901vwxyz";

/// A fresh verifier and its S256 challenge
pub fn pkce_pair() -> (String, String) {
    let verifier = crate::oauth::random_token(32);
    let challenge = ChallengeMethod::S256.challenge(&verifier);
    (verifier, challenge)
}

/// Test fixture for driving the whole application in-process.
///
/// The fixture runs over in-memory stores and the static users of
/// `GateConfig::for_testing`: `creator@example.com` (the creator) and
/// `guest@example.com`. Requests go through the complete router, including
/// the authentication middleware.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let token = fixture.creator_token().await;
///
///     let response = fixture
///         .post_json_with_token("/mcp", &token, &json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
///         .await;
///
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the application was built from
    pub config: GateConfig,
    /// Shared state behind the router
    pub state: AppState,
}

/// A flow driven through `/authorize` (and possibly sign-in and consent)
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    pub client_id: String,
    pub redirect_uri: String,
    pub verifier: String,
    /// Key of the pending authorization
    pub session: String,
    pub state: String,
    /// Set once the flow was approved
    pub code: Option<String>,
}

impl TestFixture {
    /// Creates a fixture over `GateConfig::for_testing`
    pub async fn new() -> Self {
        Self::with_config(GateConfig::for_testing()).await
    }

    /// Creates a fixture over the given configuration
    pub async fn with_config(config: GateConfig) -> Self {
        Self::setup_logger(LevelFilter::Debug);
        let state = AppState::for_testing(&config);
        Self::build(config, state).await
    }

    /// Creates a fixture whose identity service also accepts the given
    /// `(session token, user id)` pairs on the credential-transfer bridge
    pub async fn with_session_tokens(tokens: &[(&str, &str)]) -> Self {
        Self::setup_logger(LevelFilter::Debug);
        let config = GateConfig::for_testing();
        let users = config
            .identity
            .get_static_users()
            .expect("Failed to parse test users");
        let verifier = SessionTokenVerifier {
            passwords: StaticVerifier::new(users),
            tokens: tokens
                .iter()
                .map(|(token, user_id)| (token.to_string(), user_id.to_string()))
                .collect(),
        };
        let state = AppState::with_verifier(&config, Arc::new(verifier));
        Self::build(config, state).await
    }

    async fn build(config: GateConfig, state: AppState) -> Self {
        let app = create_app(state.clone()).await;
        Self { app, config, state }
    }

    /// Initializes the test logger with the given level.
    ///
    /// Called by every constructor; only the first call in a test binary wins.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a bare request builder; callers add headers and a body
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder().method(method).uri(uri.as_ref())
    }

    /// Sends a GET request without credentials
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body
    pub async fn post_json<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.post_json_with_headers(uri, body, &[]).await
    }

    /// Sends a POST request with a JSON body and a bearer token
    pub async fn post_json_with_token<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        token: &str,
        body: &T,
    ) -> TestResponse {
        let authorization = format!("Bearer {}", token);
        self.post_json_with_headers(uri, body, &[("Authorization", authorization.as_str())])
            .await
    }

    /// Sends a POST request with a JSON body and custom headers
    pub async fn post_json_with_headers<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let mut builder = self
            .request_builder(Method::POST, uri)
            .header("Content-Type", "application/json");

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with an `application/x-www-form-urlencoded` body
    pub async fn post_form(&self, uri: impl AsRef<str>, fields: &[(&str, &str)]) -> TestResponse {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .request_builder(Method::POST, uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and collects the whole response.
    ///
    /// Lower-level than `get()` and `post_json()`; use it when a test needs
    /// full control over the request.
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

        let text = String::from_utf8_lossy(&body).into_owned();
        // HTML pages and empty bodies have no JSON
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            text,
            json,
        }
    }

    /// Signs an access token for `subject_id` without going through the flow
    pub fn issue_token(&self, subject_id: &str) -> String {
        self.state
            .tokens
            .issue(subject_id, "test-client", &self.config.oauth.scope)
            .expect("Failed to issue test token")
            .access_token
    }

    /// Registers a public client and returns its id
    pub async fn register_client(&self, redirect_uri: &str) -> String {
        let resp = self
            .post_json(
                "/register",
                &serde_json::json!({
                    "redirect_uris": [redirect_uri],
                    "client_name": "Test Client"
                }),
            )
            .await;
        resp.assert_status(StatusCode::CREATED);
        resp.json["client_id"]
            .as_str()
            .expect("Registration response has no client_id")
            .to_string()
    }

    /// Builds an `/authorize` URI with an S256 challenge
    pub fn authorize_uri(
        &self,
        client_id: &str,
        redirect_uri: &str,
        challenge: &str,
        state: &str,
    ) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .finish();
        format!("/authorize?{}", query)
    }

    /// Registers a client and starts a flow, stopping at the sign-in page
    pub async fn start_authorization(&self, redirect_uri: &str, state: &str) -> AuthorizationFlow {
        let client_id = self.register_client(redirect_uri).await;
        let (verifier, challenge) = pkce_pair();

        let resp = self
            .get(self.authorize_uri(&client_id, redirect_uri, &challenge, state))
            .await;
        resp.assert_status(StatusCode::FOUND);
        let session = resp
            .location()
            .strip_prefix("/login?session=")
            .expect("Authorization did not redirect to the sign-in page")
            .to_string();

        AuthorizationFlow {
            client_id,
            redirect_uri: redirect_uri.to_string(),
            verifier,
            session,
            state: state.to_string(),
            code: None,
        }
    }

    /// Submits the sign-in form of a pending flow
    pub async fn login(&self, session: &str, email: &str, password: &str) -> TestResponse {
        self.post_form(
            "/login",
            &[("session", session), ("email", email), ("password", password)],
        )
        .await
    }

    /// Runs a flow up to the authorization code: the creator signs in and approves
    pub async fn authorize_as_creator(&self, redirect_uri: &str, state: &str) -> AuthorizationFlow {
        let mut flow = self.start_authorization(redirect_uri, state).await;

        self.login(&flow.session, "creator@example.com", "creator-pw")
            .await
            .assert_status(StatusCode::FOUND);
        let resp = self
            .post_form(
                "/consent",
                &[("session", flow.session.as_str()), ("action", "approve")],
            )
            .await;
        resp.assert_status(StatusCode::FOUND);

        let location = url::Url::parse(resp.location()).expect("Consent redirect is not a URL");
        let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
        assert_eq!(params.get("state"), Some(&flow.state));
        flow.code = params.get("code").cloned();
        assert!(flow.code.is_some(), "Consent redirect carries no code");
        flow
    }

    /// Exchanges the flow's code at `/token` with the given verifier
    pub async fn exchange_code(&self, flow: &AuthorizationFlow, verifier: &str) -> TestResponse {
        let code = flow.code.as_deref().unwrap_or_default();
        self.post_form(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", flow.redirect_uri.as_str()),
                ("client_id", flow.client_id.as_str()),
                ("code_verifier", verifier),
            ],
        )
        .await
    }

    /// Obtains a creator access token through the complete flow
    pub async fn creator_token(&self) -> String {
        let flow = self
            .authorize_as_creator("https://client.example/cb", "token-state")
            .await;
        let resp = self.exchange_code(&flow, &flow.verifier).await;
        resp.assert_ok();
        resp.json["access_token"]
            .as_str()
            .expect("Token response has no access_token")
            .to_string()
    }
}

/// Identity service stand-in that also knows a fixed set of session tokens
struct SessionTokenVerifier {
    passwords: StaticVerifier,
    tokens: HashMap<String, String>,
}

#[async_trait]
impl CredentialVerifier for SessionTokenVerifier {
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<VerifiedUser, VerificationError> {
        self.passwords.verify_password(email, password).await
    }

    async fn verify_session_token(&self, token: &str) -> Result<VerifiedUser, VerificationError> {
        self.tokens
            .get(token)
            .map(|user_id| VerifiedUser {
                user_id: user_id.clone(),
                email: None,
            })
            .ok_or(VerificationError::InvalidCredentials)
    }
}

/// Response from a test request with convenient access to status, headers and body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body as text
    pub text: String,
    /// Body as JSON, `Value::Null` when the body is empty or not JSON
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {} with body: {}",
            expected, self.status, self.text
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// The `Location` header of a redirect
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or not valid UTF-8.
    pub fn location(&self) -> &str {
        self.headers
            .get(LOCATION)
            .expect("Response has no Location header")
            .to_str()
            .expect("Location header is not valid UTF-8")
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if the JSON cannot be deserialized to the specified type.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).unwrap_or_else(|e| {
            panic!(
                "Failed to deserialize response: {}\nResponse body: {}",
                e, self.text
            )
        })
    }
}
