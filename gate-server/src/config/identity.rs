use confique::Config;
use serde::Deserialize;

/// Which credential verifier to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityBackend {
    /// Users listed in the configuration
    #[default]
    Static,
    /// A remote identity service speaking the GoTrue password grant
    Http,
}

/// Credential verification configuration
#[derive(Debug, Config, Clone)]
pub struct IdentityConfig {
    /// Verifier backend: "static" (default) or "http"
    #[config(env = "GATE_IDENTITY_BACKEND", default = "static")]
    pub backend: IdentityBackend,

    /// Base URL of the identity service (http backend)
    #[config(env = "GATE_IDENTITY_URL", default = "")]
    pub url: String,

    /// API key sent to the identity service (http backend)
    #[config(env = "GATE_IDENTITY_API_KEY", default = "")]
    pub api_key: String,

    /// Timeout for a verification call in seconds (default: 10)
    #[config(env = "GATE_IDENTITY_TIMEOUT", default = 10)]
    pub timeout: u64,

    /// Static users as comma-separated `email:password:user_id` triples
    #[config(env = "GATE_IDENTITY_USERS", default = "")]
    pub users: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            backend: IdentityBackend::Static,
            url: String::new(),
            api_key: String::new(),
            timeout: 10,
            users: String::new(),
        }
    }
}

/// A user accepted by the static verifier
#[derive(Debug, Clone, PartialEq)]
pub struct StaticUser {
    pub email: String,
    pub password: String,
    pub user_id: String,
}

impl IdentityConfig {
    /// Parse the static user list
    pub fn get_static_users(&self) -> Result<Vec<StaticUser>, String> {
        self.users
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut parts = entry.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(email), Some(password), Some(user_id))
                        if !email.is_empty() && !user_id.is_empty() =>
                    {
                        Ok(StaticUser {
                            email: email.to_string(),
                            password: password.to_string(),
                            user_id: user_id.to_string(),
                        })
                    }
                    _ => Err(format!(
                        "Invalid static user entry, expected email:password:user_id (got {} fields)",
                        entry.split(':').count()
                    )),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_static_users() {
        let config = IdentityConfig {
            users: "alice@example.com:pw1:user-a, bob@example.com:pw2:user-b".to_string(),
            ..Default::default()
        };
        let users = config.get_static_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "alice@example.com");
        assert_eq!(users[1].user_id, "user-b");
    }

    #[test]
    fn test_get_static_users_empty() {
        let config = IdentityConfig::default();
        assert!(config.get_static_users().unwrap().is_empty());
    }

    #[test]
    fn test_get_static_users_malformed() {
        let config = IdentityConfig {
            users: "alice@example.com:pw1".to_string(),
            ..Default::default()
        };
        let err = config.get_static_users().unwrap_err();
        assert!(!err.contains("pw1"), "error must not echo secrets: {err}");
    }
}
