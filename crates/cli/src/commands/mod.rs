//! CLI command implementations.

pub mod cache;
pub mod catalog;

use std::sync::Arc;

use dawajen_storefront::cache::{SystemClock, TieredCache, open_or_disabled};
use dawajen_storefront::config::{CacheConfig, ConfigError, TableStoreConfig};
use dawajen_storefront::remote::{RemoteError, TableStoreClient};
use dawajen_storefront::store::ProductStore;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors shared by the CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Table-store error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] dawajen_storefront::store::StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] dawajen_storefront::cache::TierError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// A product store over the configured table-store and cache directory.
pub struct Context {
    pub store: Arc<ProductStore>,
    pub cache: Arc<TieredCache>,
    pub cache_config: CacheConfig,
}

impl Context {
    /// Load configuration from the environment and build the store.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is missing or invalid.
    pub async fn from_env() -> Result<Self, CommandError> {
        dotenvy::dotenv().ok();

        let table_store = TableStoreConfig::from_env()?;
        let cache_config = CacheConfig::from_env()?;
        let client = TableStoreClient::new(&table_store)?;

        let shutdown = CancellationToken::new();
        let persistent = open_or_disabled(cache_config.dir.as_deref()).await;
        let cache = Arc::new(TieredCache::new(
            cache_config.settings,
            persistent,
            Arc::new(SystemClock),
            shutdown.clone(),
        ));
        let store = Arc::new(ProductStore::new(
            Arc::new(client),
            Arc::clone(&cache),
            shutdown,
        ));

        Ok(Self {
            store,
            cache,
            cache_config,
        })
    }
}
