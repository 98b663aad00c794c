use crate::{
    api::mcp::SseSessions,
    config::GateConfig,
    identity::{
        create_verifier,
        views::{HandlebarsLoginView, LoginView},
        CreatorIdentity, CredentialVerifier,
    },
    oauth::{
        codes::AuthorizationCodes,
        exchange::CodeExchangeService,
        pending::PendingAuthorizations,
        registry::ClientRegistry,
        session::{AuthorizationSessionManager, SessionSettings},
        signing_key::load_signing_secret,
        tokens::TokenService,
    },
    store::{create_stores, StoreBackend, Stores},
    tools::ToolRegistry,
};
use log::warn;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs, built once at startup and cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub stores: Stores,
    pub clients: ClientRegistry,
    pub sessions: AuthorizationSessionManager,
    pub exchange: CodeExchangeService,
    pub tokens: TokenService,
    pub creator: CreatorIdentity,
    pub views: Arc<dyn LoginView>,
    pub tools: Arc<ToolRegistry>,
    pub sse: SseSessions,
}

impl AppState {
    pub async fn new(config: &GateConfig) -> Result<Self, String> {
        let stores = create_stores(config)
            .await
            .map_err(|e| format!("Failed to create stores: {}", e))?;
        let verifier = create_verifier(config)?;
        let secret = load_signing_secret(&config.oauth)
            .map_err(|e| format!("Failed to load signing key: {}", e))?;
        let views = HandlebarsLoginView::new()
            .map_err(|e| format!("Failed to load page templates: {}", e))?;

        Ok(Self::assemble(
            config,
            stores,
            verifier,
            &secret,
            Arc::new(views),
        ))
    }

    fn assemble(
        config: &GateConfig,
        stores: Stores,
        verifier: Arc<dyn CredentialVerifier>,
        secret: &str,
        views: Arc<dyn LoginView>,
    ) -> Self {
        let oauth = &config.oauth;
        let clients =
            ClientRegistry::new(stores.clients.clone()).with_max_clients(oauth.max_clients);
        let pending = PendingAuthorizations::new(
            stores.pending.clone(),
            Duration::from_secs(oauth.pending_ttl),
        );
        let codes = AuthorizationCodes::new(stores.codes.clone(), Duration::from_secs(oauth.code_ttl));
        let tokens = TokenService::new(
            secret,
            oauth.issuer(),
            Duration::from_secs(oauth.token_ttl),
            stores.revoked.clone(),
        );
        let creator = CreatorIdentity::from_config(&config.creator);
        if creator.is_enforced() && config.creator.user_id.is_none() && config.creator.config_file.is_none() {
            warn!("Creator-only mode is on but no creator is configured; every request will be refused");
        }

        let sessions = AuthorizationSessionManager::new(
            clients.clone(),
            pending,
            codes.clone(),
            verifier,
            creator.clone(),
            SessionSettings {
                verify_timeout: Duration::from_secs(config.identity.timeout),
                default_scope: oauth.scope.clone(),
                supported_scopes: oauth.get_supported_scopes(),
                allow_plain_pkce: oauth.allow_plain_pkce,
            },
        );
        let exchange = CodeExchangeService::new(clients.clone(), codes, tokens.clone());

        Self {
            config: Arc::new(config.clone()),
            stores,
            clients,
            sessions,
            exchange,
            tokens,
            creator,
            views,
            tools: Arc::new(ToolRegistry::default()),
            sse: SseSessions::default(),
        }
    }

    /// Probe every store, in a fixed order
    pub async fn store_health(&self) -> Vec<(&'static str, Result<(), String>)> {
        let mut report = Vec::new();
        for (name, store) in self.stores.named() {
            report.push((name, store.health_check().await));
        }
        report
    }
}

#[cfg(test)]
impl AppState {
    /// State over in-memory stores with the static users of `GateConfig::for_testing`
    pub fn for_testing(config: &GateConfig) -> Self {
        let verifier = create_verifier(config).expect("Failed to create test verifier");
        Self::with_verifier(config, verifier)
    }

    /// State over in-memory stores with a caller-supplied verifier
    pub fn with_verifier(config: &GateConfig, verifier: Arc<dyn CredentialVerifier>) -> Self {
        let views = HandlebarsLoginView::new().expect("Failed to load test templates");
        let secret = config
            .oauth
            .jwt_secret
            .clone()
            .unwrap_or_else(|| "test-signing-secret".to_string());
        Self::assemble(config, Stores::in_memory(), verifier, &secret, Arc::new(views))
    }
}
