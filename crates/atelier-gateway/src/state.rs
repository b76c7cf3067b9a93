use std::sync::Arc;
use std::time::Duration;

use atelier_auth::TokenSigner;
use atelier_common::{Error, Result};
use atelier_config::AppConfig;
use atelier_db::{ChatStore, Database, Lineage, ProjectStore, SimilaritySearch, UserStore};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

/// Shared application state accessible from all request handlers. The
/// stores share one injected pool; there is no other cross-request state.
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub users: UserStore,
    pub projects: ProjectStore,
    pub chats: ChatStore,
    pub lineage: Lineage,
    pub search: SimilaritySearch,
    pub signer: TokenSigner,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Result<Self> {
        let secret = match &config.auth.token_secret {
            Some(secret) => secret.clone().into_bytes(),
            None => {
                warn!(
                    "auth.token_secret not configured; using an ephemeral secret, \
                     tokens will not survive a restart"
                );
                let rng = SystemRandom::new();
                let mut bytes = [0u8; 32];
                rng.fill(&mut bytes)
                    .map_err(|_| Error::Gateway("failed to generate token secret".into()))?;
                bytes.to_vec()
            }
        };

        Ok(Self {
            users: UserStore::new(db.clone()),
            projects: ProjectStore::new(db.clone()),
            chats: ChatStore::new(db.clone()),
            lineage: Lineage::new(db.clone()),
            search: SimilaritySearch::new(db.clone()),
            signer: TokenSigner::new(&secret),
            config,
            db,
        })
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.config.auth.token_ttl_secs)
    }
}

pub type SharedState = Arc<AppState>;
