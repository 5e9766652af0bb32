//! Product store: the glue between the tiered cache and the table-store.
//!
//! # Fetch ordering
//!
//! Cache misses are serialised behind an async fetch lock, so concurrent
//! readers share one remote fetch instead of racing. Each fetch gets a
//! generation number and a cancellation token. [`ProductStore::refetch`] and
//! confirmed mutations bump the generation and cancel the in-flight token
//! before doing their own work; a fetch that finishes under an older
//! generation is discarded without touching the cache.
//!
//! # Mutations
//!
//! Admin writes go to the backend first. Only a confirmed row is written
//! into the cached product list; a failed write leaves the cache as it was.

#[cfg(test)]
pub(crate) mod fake;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dawajen_core::{NewProduct, Product, ProductId, ProductPatch, RowError, Session};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{
    CacheKey, CacheStats, CacheValue, PRIORITY_POPULARITY, PRIORITY_PRODUCT_DETAIL,
    PRIORITY_PRODUCT_LIST, Tier, TieredCache,
};
use crate::catalog::Popularity;
use crate::remote::{ProductSource, RemoteError};

/// Superseded fetches a read sits through before settling for a cached
/// snapshot, if it has one.
const SUPERSEDED_RETRIES: usize = 3;

/// Errors from the product store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table-store call failed.
    #[error(transparent)]
    Remote(RemoteError),

    /// The fetch was cancelled or superseded. Not a failure.
    #[error("fetch cancelled")]
    Cancelled,

    /// Admin input failed validation.
    #[error("invalid product: {0}")]
    Invalid(#[from] RowError),

    /// No visible product with this id.
    #[error("product {0} not found")]
    NotFound(ProductId),
}

impl From<RemoteError> for StoreError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Cancelled => Self::Cancelled,
            other => Self::Remote(other),
        }
    }
}

impl StoreError {
    /// Whether the underlying failure was a connectivity problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_connection_error())
    }
}

/// Where a product list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Memory,
    Persistent,
    Remote,
    /// An expired memory entry, served because the fetch was cancelled.
    Stale,
}

impl From<Tier> for ServedFrom {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Memory => Self::Memory,
            Tier::Persistent => Self::Persistent,
        }
    }
}

/// Progress of the most recent product read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    #[default]
    Idle,
    CheckingCache,
    Fetching,
    Ready,
    Failed,
}

/// Loading/error flags for the view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStatus {
    pub loading: bool,
    pub phase: FetchPhase,
    /// Message of the last failed fetch, cleared by the next success.
    pub error: Option<String>,
    pub connection_error: bool,
    pub served_from: Option<ServedFrom>,
}

/// A product list and its provenance.
#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub products: Vec<Product>,
    pub served_from: ServedFrom,
    /// Capture time of the cache entry; `None` when fresh from the remote.
    pub stored_at: Option<DateTime<Utc>>,
}

/// Outcome of reading the product list from the cache.
enum CachedList {
    Fresh(ProductSnapshot),
    /// Captured longer ago than the memory TTL; refresh before serving.
    Seed(ProductSnapshot),
    Miss,
}

#[derive(Default)]
struct StoreState {
    status: FetchStatus,
    generation: u64,
    inflight: Option<CancellationToken>,
}

/// Cached, cancellable access to the product catalog.
pub struct ProductStore {
    source: Arc<dyn ProductSource>,
    cache: Arc<TieredCache>,
    state: Mutex<StoreState>,
    fetch_lock: tokio::sync::Mutex<()>,
    fetches: AtomicU64,
    shutdown: CancellationToken,
}

impl ProductStore {
    #[must_use]
    pub fn new(
        source: Arc<dyn ProductSource>,
        cache: Arc<TieredCache>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            cache,
            state: Mutex::new(StoreState::default()),
            fetch_lock: tokio::sync::Mutex::new(()),
            fetches: AtomicU64::new(0),
            shutdown,
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current loading/error flags.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        self.state().status.clone()
    }

    /// Current fetch generation. Increases on every fetch, refetch and
    /// confirmed mutation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Number of remote product-list fetches started.
    #[must_use]
    pub fn remote_fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Every non-deleted product, from cache when warm.
    ///
    /// A list captured longer ago than the memory TTL (a persistent-tier seed
    /// after a restart) is served only if the remote fetch fails. A read
    /// whose fetch is superseded retries against the newer result; after
    /// [`SUPERSEDED_RETRIES`] it settles for the seed or the last memory
    /// snapshot, and with neither it keeps retrying. A read cancelled by
    /// shutdown falls back to the same snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Remote`] if the fetch fails with no seed, or
    /// [`StoreError::Cancelled`] if shut down with nothing to fall back on.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<ProductSnapshot, StoreError> {
        let mut seed = None;
        let mut superseded = 0;
        loop {
            match self.cached_products().await {
                CachedList::Fresh(hit) => return Ok(hit),
                CachedList::Seed(hit) => {
                    seed.get_or_insert(hit);
                }
                CachedList::Miss => {}
            }

            let _guard = self.fetch_lock.lock().await;
            match self.cached_products().await {
                CachedList::Fresh(hit) => return Ok(hit),
                CachedList::Seed(hit) => {
                    seed.get_or_insert(hit);
                }
                CachedList::Miss => {}
            }

            match self.fetch().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(StoreError::Cancelled) if self.shutdown.is_cancelled() => break,
                Err(StoreError::Cancelled) => {
                    superseded += 1;
                    debug!(superseded, "Product fetch superseded, retrying");
                    if superseded >= SUPERSEDED_RETRIES
                        && let Some(snapshot) = self.fallback(seed.take())
                    {
                        return Ok(snapshot);
                    }
                }
                Err(e) => {
                    return match seed {
                        Some(snapshot) => Ok(self.serve_seed(snapshot, &e)),
                        None => Err(e),
                    };
                }
            }
        }
        self.fallback(seed).ok_or(StoreError::Cancelled)
    }

    fn fallback(&self, seed: Option<ProductSnapshot>) -> Option<ProductSnapshot> {
        match seed {
            Some(snapshot) => {
                self.finish_ok(snapshot.served_from);
                Some(snapshot)
            }
            None => self.stale_products(),
        }
    }

    /// Serve an old cached list after its refresh failed. The failure stays
    /// visible in the status.
    fn serve_seed(&self, snapshot: ProductSnapshot, err: &StoreError) -> ProductSnapshot {
        warn!(error = %err, "Refresh failed, serving previously cached products");
        self.state().status.served_from = Some(snapshot.served_from);
        snapshot
    }

    /// Drop the cached list and fetch it again, cancelling any fetch in flight.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Remote`] if the fetch fails.
    #[instrument(skip(self))]
    pub async fn refetch(&self) -> Result<ProductSnapshot, StoreError> {
        self.supersede();
        let _guard = self.fetch_lock.lock().await;
        self.cache.invalidate(&CacheKey::Products);
        self.fetch().await
    }

    async fn cached_products(&self) -> CachedList {
        self.set_phase(FetchPhase::CheckingCache);
        let Some(lookup) = self.cache.get(&CacheKey::Products).await else {
            return CachedList::Miss;
        };
        let products = match lookup.value {
            CacheValue::Products(products) => products,
            other => {
                warn!(?other, "Unexpected value under product list key");
                self.cache.invalidate(&CacheKey::Products);
                return CachedList::Miss;
            }
        };

        let snapshot = ProductSnapshot {
            products,
            served_from: ServedFrom::from(lookup.tier),
            stored_at: Some(lookup.stored_at),
        };
        if self.cache.is_past_memory_ttl(lookup.stored_at) {
            debug!(stored_at = %lookup.stored_at, "Cached product list is old, refreshing");
            return CachedList::Seed(snapshot);
        }
        self.finish_ok(snapshot.served_from);
        CachedList::Fresh(snapshot)
    }

    fn stale_products(&self) -> Option<ProductSnapshot> {
        match self.cache.peek_stale(&CacheKey::Products) {
            Some(CacheValue::Products(products)) => {
                self.finish_ok(ServedFrom::Stale);
                Some(ProductSnapshot {
                    products,
                    served_from: ServedFrom::Stale,
                    stored_at: None,
                })
            }
            _ => {
                let mut state = self.state();
                state.status.loading = false;
                state.status.phase = FetchPhase::Idle;
                None
            }
        }
    }

    /// Cancel whatever is in flight and move to a new generation.
    fn supersede(&self) -> u64 {
        let mut state = self.state();
        Self::supersede_locked(&mut state)
    }

    fn supersede_locked(state: &mut StoreState) -> u64 {
        if let Some(token) = state.inflight.take() {
            token.cancel();
        }
        state.generation += 1;
        state.generation
    }

    /// Fetch from the remote. Callers hold the fetch lock.
    async fn fetch(&self) -> Result<ProductSnapshot, StoreError> {
        let token = self.shutdown.child_token();
        let generation = {
            let mut state = self.state();
            let generation = Self::supersede_locked(&mut state);
            state.inflight = Some(token.clone());
            state.status.loading = true;
            state.status.phase = FetchPhase::Fetching;
            generation
        };
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(generation, "Fetching products from table-store");

        let result = self.source.list_products(&token).await;

        let mut state = self.state();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "Discarding superseded product fetch"
            );
            return Err(StoreError::Cancelled);
        }
        state.inflight = None;

        match result {
            Ok(products) => {
                self.cache.set(
                    CacheKey::Products,
                    CacheValue::Products(products.clone()),
                    PRIORITY_PRODUCT_LIST,
                );
                info!(count = products.len(), "Product list cached");
                state.status = FetchStatus {
                    loading: false,
                    phase: FetchPhase::Ready,
                    error: None,
                    connection_error: false,
                    served_from: Some(ServedFrom::Remote),
                };
                Ok(ProductSnapshot {
                    products,
                    served_from: ServedFrom::Remote,
                    stored_at: None,
                })
            }
            Err(RemoteError::Cancelled) => {
                debug!(generation, "Product fetch cancelled");
                state.status.loading = false;
                state.status.phase = FetchPhase::Idle;
                Err(StoreError::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "Product fetch failed");
                state.status = FetchStatus {
                    loading: false,
                    phase: FetchPhase::Failed,
                    error: Some(e.to_string()),
                    connection_error: e.is_connection_error(),
                    served_from: None,
                };
                Err(StoreError::Remote(e))
            }
        }
    }

    fn set_phase(&self, phase: FetchPhase) {
        let mut state = self.state();
        state.status.loading = true;
        state.status.phase = phase;
    }

    fn finish_ok(&self, served_from: ServedFrom) {
        let mut state = self.state();
        state.status = FetchStatus {
            loading: false,
            phase: FetchPhase::Ready,
            error: None,
            connection_error: false,
            served_from: Some(served_from),
        };
    }

    /// A single visible product.
    ///
    /// Looks in the cached list first, then the per-product entry, then asks
    /// the table-store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown or deleted products.
    #[instrument(skip(self))]
    pub async fn product(&self, id: ProductId) -> Result<Product, StoreError> {
        if let Some(lookup) = self.cache.get(&CacheKey::Products).await
            && let CacheValue::Products(products) = lookup.value
            && let Some(product) = products.into_iter().find(|p| p.id == id)
        {
            return Ok(product);
        }

        let key = CacheKey::Product(id);
        if let Some(lookup) = self.cache.get(&key).await
            && let CacheValue::Product(product) = lookup.value
        {
            return Ok(*product);
        }

        match self.source.get_product(id).await? {
            Some(product) if !product.is_deleted => {
                self.cache.set(
                    key,
                    CacheValue::Product(Box::new(product.clone())),
                    PRIORITY_PRODUCT_DETAIL,
                );
                Ok(product)
            }
            _ => Err(StoreError::NotFound(id)),
        }
    }

    /// Favorite counts, cached below the product list in priority.
    ///
    /// Returns `None` when counts cannot be loaded; popularity sorting then
    /// falls back to newest first.
    #[instrument(skip(self))]
    pub async fn popularity(&self) -> Option<Popularity> {
        if let Some(lookup) = self.cache.get(&CacheKey::Popularity).await
            && let CacheValue::Popularity(counts) = lookup.value
        {
            return Some(counts);
        }

        match self.source.favorite_counts().await {
            Ok(counts) => {
                self.cache.set(
                    CacheKey::Popularity,
                    CacheValue::Popularity(counts.clone()),
                    PRIORITY_POPULARITY,
                );
                Some(counts)
            }
            Err(e) => {
                warn!(error = %e, "Failed to load favorite counts");
                None
            }
        }
    }

    /// Drop cached favorite counts after a favorite changes.
    pub fn invalidate_popularity(&self) {
        self.cache.invalidate(&CacheKey::Popularity);
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a product and add it to the front of the cached list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for bad input or
    /// [`StoreError::Remote`] if the backend rejects it.
    #[instrument(skip(self, session, product))]
    pub async fn create_product(
        &self,
        session: &Session,
        product: &NewProduct,
    ) -> Result<Product, StoreError> {
        product.validate()?;
        let created = self.source.insert_product(session, product).await?;
        info!(product_id = %created.id, "Product created");

        let entry = created.clone();
        self.reconcile(created.id, move |list| list.insert(0, entry))
            .await;
        Ok(created)
    }

    /// Update a product and replace it in the cached list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for bad input or
    /// [`StoreError::Remote`] if the backend rejects it.
    #[instrument(skip(self, session, patch))]
    pub async fn update_product(
        &self,
        session: &Session,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, StoreError> {
        patch.validate()?;
        let updated = self.source.update_product(session, id, patch).await?;
        info!(product_id = %id, "Product updated");

        let entry = updated.clone();
        self.reconcile(id, move |list| {
            if entry.is_deleted {
                list.retain(|p| p.id != entry.id);
            } else if let Some(slot) = list.iter_mut().find(|p| p.id == entry.id) {
                *slot = entry;
            } else {
                list.insert(0, entry);
                list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
        })
        .await;
        Ok(updated)
    }

    /// Soft-delete a product and drop it from the cached list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Remote`] if the backend rejects it.
    #[instrument(skip(self, session))]
    pub async fn delete_product(&self, session: &Session, id: ProductId) -> Result<(), StoreError> {
        self.source.soft_delete_product(session, id).await?;
        info!(product_id = %id, "Product soft-deleted");

        self.reconcile(id, move |list| list.retain(|p| p.id != id))
            .await;
        Ok(())
    }

    /// Apply a confirmed change to the cached list.
    ///
    /// Any fetch in flight started before the change is superseded so its
    /// older view cannot overwrite this one.
    async fn reconcile(&self, id: ProductId, apply: impl FnOnce(&mut Vec<Product>)) {
        self.supersede();
        self.cache.invalidate(&CacheKey::Product(id));

        let Some(lookup) = self.cache.get(&CacheKey::Products).await else {
            debug!("No cached product list to update");
            return;
        };
        let CacheValue::Products(mut products) = lookup.value else {
            return;
        };
        apply(&mut products);
        self.cache.set(
            CacheKey::Products,
            CacheValue::Products(products),
            PRIORITY_PRODUCT_LIST,
        );
    }

    /// Cancel in-flight fetches. Later reads serve stale data or nothing.
    pub fn shutdown(&self) {
        info!("Product store shutting down");
        self.shutdown.cancel();
        let mut state = self.state();
        if let Some(token) = state.inflight.take() {
            token.cancel();
        }
    }
}
