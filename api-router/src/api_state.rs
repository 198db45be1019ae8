use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::ContentStore},
    utils::config::AppConfig,
};
use tracing::info;

/// Shared handles for request handlers: database, settings and file store.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub store: ContentStore,
}

impl ApiState {
    /// Connects to the configured database, builds its indexes and opens the
    /// content store under `data_dir`.
    pub async fn new(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.ensure_initialized().await?;

        let store = ContentStore::new(config).await?;
        info!(root = %store.root().display(), "content store ready");

        Ok(Self::from_parts(db, config.clone(), store))
    }

    pub fn from_parts(db: Arc<SurrealDbClient>, config: AppConfig, store: ContentStore) -> Self {
        Self { db, config, store }
    }
}
