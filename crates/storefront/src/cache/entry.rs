//! Cache keys, values and timestamped entries.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dawajen_core::{Product, ProductId};
use serde::{Deserialize, Serialize};

/// Priority of the full product list. Highest, so it is evicted last.
pub const PRIORITY_PRODUCT_LIST: u32 = 100;
/// Priority of favorite-count data.
pub const PRIORITY_POPULARITY: u32 = 50;
/// Priority of single-product detail entries.
pub const PRIORITY_PRODUCT_DETAIL: u32 = 10;

/// Cache key for catalog data.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheKey {
    /// Every non-deleted product, newest first.
    Products,
    /// A single product, as served to detail views.
    Product(ProductId),
    /// Favorite counts per product.
    Popularity,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Products => f.write_str("products"),
            Self::Product(id) => write!(f, "product-{id}"),
            Self::Popularity => f.write_str("popularity"),
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CacheValue {
    Products(Vec<Product>),
    Product(Box<Product>),
    Popularity(HashMap<ProductId, u32>),
}

/// A cached value with its capture time and eviction priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub stored_at: DateTime<Utc>,
    pub priority: u32,
}

impl CacheEntry {
    #[must_use]
    pub const fn new(value: CacheValue, stored_at: DateTime<Utc>, priority: u32) -> Self {
        Self {
            value,
            stored_at,
            priority,
        }
    }

    /// Age at `now`. Entries stamped in the future have zero age.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.stored_at).max(TimeDelta::zero())
    }

    /// An entry strictly older than `ttl` is expired.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > to_delta(ttl)
    }
}

pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry_at(stored_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(CacheValue::Products(vec![]), stored_at, 1)
    }

    #[test]
    fn test_expiry_is_strict() {
        let t0 = Utc::now();
        let entry = entry_at(t0);
        let ttl = Duration::from_secs(300);

        assert!(!entry.is_expired(ttl, t0 + TimeDelta::seconds(300)));
        assert!(entry.is_expired(ttl, t0 + TimeDelta::seconds(301)));
    }

    #[test]
    fn test_future_entries_are_fresh() {
        let t0 = Utc::now();
        let entry = entry_at(t0 + TimeDelta::minutes(5));
        assert_eq!(entry.age(t0), TimeDelta::zero());
    }

    #[test]
    fn test_key_file_names() {
        assert_eq!(CacheKey::Products.to_string(), "products");
        assert_eq!(CacheKey::Product(ProductId::new(12)).to_string(), "product-12");
        assert_eq!(CacheKey::Popularity.to_string(), "popularity");
    }

    #[test]
    fn test_popularity_survives_json() {
        let mut counts = HashMap::new();
        counts.insert(ProductId::new(4), 9);
        let entry = CacheEntry::new(CacheValue::Popularity(counts), Utc::now(), 5);

        let json = serde_json::to_string(&entry).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
