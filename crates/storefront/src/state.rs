//! Application state shared across handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::{SystemClock, TieredCache, open_or_disabled};
use crate::checkout::Checkout;
use crate::config::StorefrontConfig;
use crate::notify::{OrderNotifier, TelegramNotifier};
use crate::remote::{RemoteError, TableStoreClient};
use crate::store::ProductStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the table-store client, the product store and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    client: TableStoreClient,
    store: Arc<ProductStore>,
    checkout: Checkout,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build the state from configuration.
    ///
    /// Opens the persistent cache tier when a cache directory is set; an
    /// unusable directory degrades to memory-only caching.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub async fn new(
        config: StorefrontConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, RemoteError> {
        let client = TableStoreClient::new(&config.table_store)?;
        let persistent = open_or_disabled(config.cache.dir.as_deref()).await;
        let cache = Arc::new(TieredCache::new(
            config.cache.settings,
            persistent,
            Arc::new(SystemClock),
            shutdown.clone(),
        ));
        let notifier: Arc<dyn OrderNotifier> =
            Arc::new(TelegramNotifier::new(config.telegram.as_ref()));
        Ok(Self::from_parts(config, client, cache, notifier, shutdown))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        client: TableStoreClient,
        cache: Arc<TieredCache>,
        notifier: Arc<dyn OrderNotifier>,
        shutdown: CancellationToken,
    ) -> Self {
        let store = Arc::new(ProductStore::new(
            Arc::new(client.clone()),
            cache,
            shutdown.clone(),
        ));
        let checkout = Checkout::new(Arc::clone(&store), Arc::new(client.clone()), notifier);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                client,
                store,
                checkout,
                shutdown,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the table-store client.
    #[must_use]
    pub fn client(&self) -> &TableStoreClient {
        &self.inner.client
    }

    /// Get a reference to the product store.
    #[must_use]
    pub fn store(&self) -> &Arc<ProductStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn checkout(&self) -> &Checkout {
        &self.inner.checkout
    }

    /// Token cancelled on shutdown.
    #[must_use]
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}
