//! Product cache maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # Fetch the product list and favorite counts into the cache
//! CACHE_DIR=/var/cache/dawajen dawajen-cli cache warm
//!
//! # Delete all persistent cache files
//! CACHE_DIR=/var/cache/dawajen dawajen-cli cache clear
//! ```

use dawajen_storefront::cache::FileTier;

use super::{CommandError, Context};

/// Refetch products and popularity, then wait for the persistent writes.
///
/// # Errors
///
/// Returns error if the product fetch fails.
pub async fn warm() -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    if ctx.cache_config.dir.is_none() {
        tracing::warn!("CACHE_DIR is not set; warming only the in-process cache is pointless");
    }

    let snapshot = ctx.store.refetch().await?;
    let favorites = ctx.store.popularity().await.map_or(0, |p| p.len());
    ctx.cache.flush().await;

    let stats = ctx.cache.stats();
    tracing::info!(
        products = snapshot.products.len(),
        favorites,
        written = stats.writes.written,
        failed = stats.writes.failed,
        "Cache warmed"
    );
    Ok(())
}

/// Delete persistent cache files.
///
/// # Errors
///
/// Returns error if the cache directory cannot be read.
pub async fn clear() -> Result<(), CommandError> {
    dotenvy::dotenv().ok();
    let config = dawajen_storefront::config::CacheConfig::from_env()?;
    let Some(dir) = config.dir else {
        tracing::warn!("CACHE_DIR is not set; nothing to clear");
        return Ok(());
    };

    let tier = FileTier::open(&dir).await?;
    let removed = tier.clear().await?;
    tracing::info!(removed, dir = %dir.display(), "Persistent cache cleared");
    Ok(())
}
