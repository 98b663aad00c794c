use crate::oauth::exchange::ExchangeError;
use crate::oauth::registry::RegistrationError;
use crate::oauth::session::AuthorizeError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use log::error;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}

/// OAuth 2.0 error response (RFC 6749 section 5.2)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OAuthError {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl OAuthError {
    fn new(error: &str, description: &str, status: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
            status,
        }
    }

    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Create an invalid_request error
    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description, StatusCode::BAD_REQUEST)
    }

    /// Create an invalid_client error
    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", description, StatusCode::UNAUTHORIZED)
    }

    /// Create an invalid_grant error
    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description, StatusCode::BAD_REQUEST)
    }

    /// Create an unsupported_grant_type error
    pub fn unsupported_grant_type() -> Self {
        Self::new(
            "unsupported_grant_type",
            "Only the authorization_code grant type is supported",
            StatusCode::BAD_REQUEST,
        )
    }

    /// Create an unsupported_response_type error
    pub fn unsupported_response_type() -> Self {
        Self::new(
            "unsupported_response_type",
            "Only 'code' response type is supported",
            StatusCode::BAD_REQUEST,
        )
    }

    /// Create an invalid_scope error
    pub fn invalid_scope(description: &str) -> Self {
        Self::new("invalid_scope", description, StatusCode::BAD_REQUEST)
    }

    /// Create a registration error (RFC 7591 section 3.2.2)
    pub fn invalid_client_metadata(error: &str, description: &str) -> Self {
        Self::new(error, description, StatusCode::BAD_REQUEST)
    }

    /// Create a server_error
    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", description, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create a temporarily_unavailable error
    pub fn temporarily_unavailable(description: &str) -> Self {
        Self::new(
            "temporarily_unavailable",
            description,
            StatusCode::SERVICE_UNAVAILABLE,
        )
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status(), Json(&self)).into_response();
        crate::headers::CachePolicy::NoStore.apply(&mut response);
        response
    }
}

impl From<AuthorizeError> for OAuthError {
    fn from(err: AuthorizeError) -> Self {
        match err {
            AuthorizeError::InvalidRequest(description) => Self::invalid_request(&description),
            AuthorizeError::UnsupportedResponseType => Self::unsupported_response_type(),
            AuthorizeError::InvalidScope(_) => Self::invalid_scope(&err.to_string()),
            AuthorizeError::SessionNotFound | AuthorizeError::NotAuthenticated => {
                Self::invalid_request(&err.to_string())
            }
            AuthorizeError::Store(e) => {
                error!("Store error during authorization: {}", e);
                Self::temporarily_unavailable("Authorization storage is unavailable")
            }
        }
    }
}

impl From<ExchangeError> for OAuthError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::UnsupportedGrantType => Self::unsupported_grant_type(),
            ExchangeError::InvalidRequest(description) => Self::invalid_request(&description),
            ExchangeError::InvalidClient => Self::invalid_client("Client authentication failed"),
            ExchangeError::InvalidGrant(description) => Self::invalid_grant(description),
            ExchangeError::Store(e) => {
                error!("Store error during code exchange: {}", e);
                Self::temporarily_unavailable("Authorization storage is unavailable")
            }
            ExchangeError::Token(e) => {
                error!("Failed to issue access token: {}", e);
                Self::server_error("Failed to issue access token")
            }
        }
    }
}

impl From<RegistrationError> for OAuthError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::MissingRedirectUris | RegistrationError::InvalidRedirectUri(_) => {
                Self::invalid_client_metadata("invalid_redirect_uri", &err.to_string())
            }
            RegistrationError::TooManyClients(limit) => {
                error!("Client registration refused: limit of {} clients reached", limit);
                Self::temporarily_unavailable("Client registration limit reached")
            }
            RegistrationError::Store(e) => {
                error!("Store error during registration: {}", e);
                Self::temporarily_unavailable("Client storage is unavailable")
            }
            _ => Self::invalid_client_metadata("invalid_client_metadata", &err.to_string()),
        }
    }
}
