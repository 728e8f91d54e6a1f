//! Shared application state
//!
//! Built once at startup and handed to every handler as
//! `State<Arc<AppState>>`. Holds the vault, the client factory, the
//! session store and the multipart coordinator; handlers own no state of
//! their own.

use crate::sessions::SessionStore;
use s3browser_common::config::AppConfig;
use s3browser_s3::ClientFactory;
use s3browser_s3::upload::UploadService;
use s3browser_vault::Vault;
use std::sync::Arc;

/// Process-wide state shared across requests.
pub struct AppState {
    pub config: AppConfig,
    pub vault: Arc<Vault>,
    pub factory: ClientFactory,
    pub sessions: SessionStore,
    pub uploads: UploadService,
    /// Raw bytes of the configured login password.
    pub login_password: Vec<u8>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble the state from an opened vault and configuration.
    #[must_use]
    pub fn new(config: AppConfig, vault: Arc<Vault>, login_password: Vec<u8>) -> Self {
        let factory = ClientFactory::new(Arc::clone(&vault));
        let sessions = SessionStore::new(config.session_ttl);
        Self {
            config,
            vault,
            factory,
            sessions,
            uploads: UploadService::new(),
            login_password,
        }
    }
}
