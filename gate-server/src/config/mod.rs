pub(crate) use crate::config::creator::CreatorConfig;
pub(crate) use crate::config::identity::{IdentityBackend, IdentityConfig};
pub(crate) use crate::config::oauth::OAuthConfig;
pub(crate) use crate::config::store::{StoreConfig, StoreKind};
use confique::Config;

pub mod creator;
pub mod identity;
pub mod oauth;
pub mod store;

/// Default configuration file, read when present
const DEFAULT_CONFIG_FILE: &str = "gate.toml";

/// Main configuration structure for the gate server
#[derive(Debug, Config, Clone)]
pub struct GateConfig {
    /// The port the server will listen to (default: 8000)
    #[config(env = "GATE_PORT", default = 8000)]
    pub port: u16,

    /// Debug mode, logs at debug level (default: false)
    #[config(env = "GATE_DEBUG", default = false)]
    pub debug: bool,

    /// Authorization server configuration
    #[config(nested)]
    pub oauth: OAuthConfig,

    /// Creator-only access configuration
    #[config(nested)]
    pub creator: CreatorConfig,

    /// Credential verification configuration
    #[config(nested)]
    pub identity: IdentityConfig,

    /// Storage configuration
    #[config(nested)]
    pub store: StoreConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            debug: false,
            oauth: OAuthConfig::default(),
            creator: CreatorConfig::default(),
            identity: IdentityConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl GateConfig {
    /// Loads the configuration from environment variables, then from the file named by
    /// `GATE_CONFIG_FILE` (or `gate.toml` when it exists). Environment wins over the file.
    pub fn new() -> Result<Self, String> {
        let file = std::env::var("GATE_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = GateConfig::builder()
            .env()
            .file(file)
            .load()
            .map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that the derive cannot express
    pub fn validate(&self) -> Result<(), String> {
        url::Url::parse(&self.oauth.server_url)
            .map_err(|e| format!("Invalid oauth.server_url '{}': {}", self.oauth.server_url, e))?;

        if self.oauth.token_ttl == 0 {
            return Err("oauth.token_ttl must be greater than zero".to_string());
        }

        if self.store.backend == StoreKind::Redis && self.store.redis.url.is_empty() {
            return Err("store.redis.url is required for the redis store".to_string());
        }

        if self.identity.backend == IdentityBackend::Http && self.identity.url.is_empty() {
            return Err("identity.url is required for the http identity backend".to_string());
        }

        self.identity.get_static_users()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            debug: true,
            oauth: OAuthConfig {
                server_url: "https://gate.example".to_string(),
                jwt_secret: Some("test-signing-secret".to_string()),
                ..Default::default()
            },
            creator: CreatorConfig {
                enforce: true,
                user_id: Some("creator-id".to_string()),
                config_file: None,
            },
            identity: IdentityConfig {
                users: "creator@example.com:creator-pw:creator-id,guest@example.com:guest-pw:guest-id"
                    .to_string(),
                ..Default::default()
            },
            store: StoreConfig::default(),
        }
    }
}
