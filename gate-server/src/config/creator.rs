use confique::Config;
use std::path::PathBuf;

/// Who may use this server
#[derive(Debug, Config, Clone)]
pub struct CreatorConfig {
    /// Only the creator may call protected endpoints (default: true)
    #[config(env = "GATE_CREATOR_ENFORCE", default = true)]
    pub enforce: bool,

    /// Fixed creator user id. Takes precedence over `config_file`.
    #[config(env = "GATE_CREATOR_USER_ID")]
    pub user_id: Option<String>,

    /// JSON file written by the setup tool, holding `{"user_id": "..."}`
    #[config(env = "GATE_CREATOR_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            user_id: None,
            config_file: None,
        }
    }
}
