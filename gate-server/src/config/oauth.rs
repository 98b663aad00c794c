//! OAuth 2.1 authorization server configuration

use confique::Config;
use std::path::PathBuf;

/// OAuth 2.1 authorization server configuration
#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// Public base URL of this server, used as issuer and resource identifier
    /// (default: http://localhost:8000)
    #[config(env = "GATE_OAUTH_SERVER_URL", default = "http://localhost:8000")]
    pub server_url: String,

    /// Access token TTL in seconds (default: 3600 = 1 hour)
    #[config(env = "GATE_OAUTH_TOKEN_TTL", default = 3600)]
    pub token_ttl: u64,

    /// Authorization code TTL in seconds (default: 60)
    #[config(env = "GATE_OAUTH_CODE_TTL", default = 60)]
    pub code_ttl: u64,

    /// Lifetime of a pending authorization (login/consent in progress) in seconds
    /// (default: 600)
    #[config(env = "GATE_OAUTH_PENDING_TTL", default = 600)]
    pub pending_ttl: u64,

    /// Scope granted when the client does not ask for one (default: "mcp:tools")
    #[config(env = "GATE_OAUTH_SCOPE", default = "mcp:tools")]
    pub scope: String,

    /// Scopes advertised and accepted, comma-separated (default: "mcp:tools,mcp:read")
    #[config(env = "GATE_OAUTH_SUPPORTED_SCOPES", default = "mcp:tools,mcp:read")]
    pub supported_scopes: String,

    /// Accept the `plain` PKCE method in addition to `S256` (default: false)
    #[config(env = "GATE_OAUTH_ALLOW_PLAIN_PKCE", default = false)]
    pub allow_plain_pkce: bool,

    /// Maximum number of clients that may register dynamically (default: 10000)
    #[config(env = "GATE_OAUTH_MAX_CLIENTS", default = 10000)]
    pub max_clients: usize,

    /// Realm announced in `WWW-Authenticate` challenges (default: "mcp")
    #[config(env = "GATE_OAUTH_REALM", default = "mcp")]
    pub realm: String,

    /// HS256 signing secret for access tokens. Takes precedence over `jwt_secret_file`.
    #[config(env = "GATE_OAUTH_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// File holding the signing secret; created on first start when missing
    /// (default: ~/.creator-gate/jwt_secret)
    #[config(env = "GATE_OAUTH_JWT_SECRET_FILE")]
    pub jwt_secret_file: Option<PathBuf>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            token_ttl: 3600,
            code_ttl: 60,
            pending_ttl: 600,
            scope: "mcp:tools".to_string(),
            supported_scopes: "mcp:tools,mcp:read".to_string(),
            allow_plain_pkce: false,
            max_clients: 10_000,
            realm: "mcp".to_string(),
            jwt_secret: None,
            jwt_secret_file: None,
        }
    }
}

impl OAuthConfig {
    /// Issuer identifier, the server URL without a trailing slash
    pub fn issuer(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Returns the absolute URL of an endpoint served by this server
    pub fn get_url<S: Into<String>>(&self, path: S) -> String {
        let path = path.into();
        if path.starts_with('/') {
            format!("{}{}", self.issuer(), path)
        } else {
            format!("{}/{}", self.issuer(), path)
        }
    }

    /// URL of the protected-resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        self.get_url("/.well-known/oauth-protected-resource")
    }

    /// Get supported scopes as a vector
    pub fn get_supported_scopes(&self) -> Vec<String> {
        self.supported_scopes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Where the signing secret lives when it is not given inline
    pub fn secret_file_path(&self) -> Option<PathBuf> {
        self.jwt_secret_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".creator-gate").join("jwt_secret")))
    }
}
