//! Filter predicates and sort order over the product list.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use dawajen_core::{Product, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Favorite counts per product, used by [`SortMode::Popular`].
pub type Popularity = HashMap<ProductId, u32>;

/// Product list ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    /// Creation time, newest first.
    #[default]
    Newest,
    /// Price ascending.
    PriceLow,
    /// Price descending.
    PriceHigh,
    /// Favorite count descending, ties newest first.
    Popular,
}

impl SortMode {
    /// Wire name used in query strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::PriceLow => "price-low",
            Self::PriceHigh => "price-high",
            Self::Popular => "popular",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown sort name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort mode `{0}` (expected newest, price-low, price-high or popular)")]
pub struct ParseSortModeError(String);

impl FromStr for SortMode {
    type Err = ParseSortModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "price-low" => Ok(Self::PriceLow),
            "price-high" => Ok(Self::PriceHigh),
            "popular" => Ok(Self::Popular),
            other => Err(ParseSortModeError(other.to_owned())),
        }
    }
}

fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Active catalog filters.
///
/// Category and type are matched against the grouping keys
/// ([`Product::category_key`], [`Product::type_key`]). A type is only
/// meaningful inside a category: changing the category clears it, and
/// selecting a type with no category is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    category: Option<String>,
    product_type: Option<String>,
    search: String,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    sort: SortMode,
}

impl FilterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    #[must_use]
    pub fn product_type(&self) -> Option<&str> {
        self.product_type.as_deref()
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    #[must_use]
    pub const fn price_range(&self) -> (Option<Decimal>, Option<Decimal>) {
        (self.min_price, self.max_price)
    }

    #[must_use]
    pub const fn sort(&self) -> SortMode {
        self.sort
    }

    /// Select a category (or none). Always clears the type selection.
    pub fn select_category(&mut self, category: Option<&str>) {
        self.category = category.and_then(normalize_key);
        self.product_type = None;
    }

    /// Select a type within the current category. Ignored when no category
    /// is selected. Returns whether the selection was applied.
    pub fn select_type(&mut self, product_type: Option<&str>) -> bool {
        if self.category.is_none() {
            return false;
        }
        self.product_type = product_type.and_then(normalize_key);
        true
    }

    pub fn set_search(&mut self, term: &str) {
        term.trim().clone_into(&mut self.search);
    }

    /// Set inclusive price bounds. Bounds given in the wrong order are swapped.
    pub fn set_price_range(&mut self, min: Option<Decimal>, max: Option<Decimal>) {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => {
                self.min_price = Some(hi);
                self.max_price = Some(lo);
            }
            _ => {
                self.min_price = min;
                self.max_price = max;
            }
        }
    }

    pub const fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
    }

    /// Whether `product` passes every active predicate.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let needle = self.search.to_lowercase();
        self.matches_with(product, &needle)
    }

    fn matches_with(&self, product: &Product, needle: &str) -> bool {
        if product.is_deleted {
            return false;
        }
        if let Some(category) = &self.category
            && product.category_key() != *category
        {
            return false;
        }
        if let Some(product_type) = &self.product_type
            && product.type_key() != *product_type
        {
            return false;
        }
        if !needle.is_empty()
            && !product.name.contains_lowercase(needle)
            && !product.description.contains_lowercase(needle)
        {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        true
    }

    /// Filter `products` and order the result by the current sort mode.
    ///
    /// Deterministic: the same input always yields the same output.
    #[must_use]
    pub fn apply(&self, products: &[Product], popularity: Option<&Popularity>) -> Vec<Product> {
        let needle = self.search.to_lowercase();
        let mut out: Vec<Product> = products
            .iter()
            .filter(|p| self.matches_with(p, &needle))
            .cloned()
            .collect();
        sort_products(&mut out, self.sort, popularity);
        out
    }
}

fn newest_first(a: &Product, b: &Product) -> Ordering {
    b.created_at.cmp(&a.created_at)
}

/// Stable sort of `products` by `mode`.
///
/// [`SortMode::Popular`] without popularity data falls back to newest first.
pub fn sort_products(products: &mut [Product], mode: SortMode, popularity: Option<&Popularity>) {
    match (mode, popularity) {
        (SortMode::PriceLow, _) => products.sort_by(|a, b| a.price.cmp(&b.price)),
        (SortMode::PriceHigh, _) => products.sort_by(|a, b| b.price.cmp(&a.price)),
        (SortMode::Popular, Some(counts)) => {
            let count = |p: &Product| counts.get(&p.id).copied().unwrap_or(0);
            products.sort_by(|a, b| count(b).cmp(&count(a)).then_with(|| newest_first(a, b)));
        }
        (SortMode::Newest | SortMode::Popular, _) => products.sort_by(newest_first),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::test_support::product;

    fn ids(products: &[Product]) -> Vec<i64> {
        products.iter().map(|p| p.id.as_i64()).collect()
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!("price-low".parse::<SortMode>().unwrap(), SortMode::PriceLow);
        assert_eq!(" Popular ".parse::<SortMode>().unwrap(), SortMode::Popular);
        assert!("cheapest".parse::<SortMode>().is_err());
        assert_eq!(SortMode::PriceHigh.to_string(), "price-high");
    }

    #[test]
    fn test_newest_is_default() {
        let products = vec![product(1, "A", "x", "y", 1000, 1), product(2, "B", "x", "y", 500, 2)];
        let out = FilterState::new().apply(&products, None);
        assert_eq!(ids(&out), vec![2, 1]);
    }

    #[test]
    fn test_price_sorts() {
        let products = vec![product(1, "A", "x", "y", 300, 1), product(2, "B", "x", "y", 900, 2)];
        let mut filter = FilterState::new();

        filter.set_sort(SortMode::PriceHigh);
        assert_eq!(ids(&filter.apply(&products, None)), vec![2, 1]);

        filter.set_sort(SortMode::PriceLow);
        assert_eq!(ids(&filter.apply(&products, None)), vec![1, 2]);
    }

    #[test]
    fn test_popular_uses_favorite_counts() {
        let products = vec![
            product(1, "A", "x", "y", 1, 1),
            product(2, "B", "x", "y", 1, 2),
            product(3, "C", "x", "y", 1, 3),
        ];
        let counts = Popularity::from([(ProductId::new(1), 5), (ProductId::new(2), 5)]);
        let mut filter = FilterState::new();
        filter.set_sort(SortMode::Popular);

        // 1 and 2 tie on count, newest first; 3 has none
        assert_eq!(ids(&filter.apply(&products, Some(&counts))), vec![2, 1, 3]);
        // No data behaves like newest
        assert_eq!(ids(&filter.apply(&products, None)), vec![3, 2, 1]);
    }

    #[test]
    fn test_search_matches_either_language() {
        let mut grilled = product(1, "Grilled Chicken", "x", "y", 1, 1);
        grilled.name.ar = "دجاج مشوي".into();
        let beef = product(2, "Beef", "x", "y", 1, 2);

        let mut filter = FilterState::new();
        filter.set_search("  CHICKEN ");
        assert_eq!(ids(&filter.apply(&[grilled.clone(), beef.clone()], None)), vec![1]);

        filter.set_search("مشوي");
        assert_eq!(ids(&filter.apply(&[grilled, beef], None)), vec![1]);
    }

    #[test]
    fn test_search_covers_description() {
        let mut p = product(1, "Platter", "x", "y", 1, 1);
        p.description.en = "Half chicken with rice".into();

        let mut filter = FilterState::new();
        filter.set_search("chicken");
        assert!(filter.matches(&p));
    }

    #[test]
    fn test_price_bounds_are_inclusive() {
        let products = vec![
            product(1, "A", "x", "y", 100, 1),
            product(2, "B", "x", "y", 200, 2),
            product(3, "C", "x", "y", 300, 3),
        ];
        let mut filter = FilterState::new();
        filter.set_price_range(Some(Decimal::from(100)), Some(Decimal::from(200)));
        assert_eq!(ids(&filter.apply(&products, None)), vec![2, 1]);

        // Swapped bounds are normalised
        filter.set_price_range(Some(Decimal::from(300)), Some(Decimal::from(200)));
        assert_eq!(ids(&filter.apply(&products, None)), vec![3, 2]);
    }

    #[test]
    fn test_category_change_clears_type() {
        let mut filter = FilterState::new();
        filter.select_category(Some("Fresh"));
        assert!(filter.select_type(Some("Whole")));
        assert_eq!(filter.product_type(), Some("whole"));

        filter.select_category(Some("Frozen"));
        assert_eq!(filter.category(), Some("frozen"));
        assert_eq!(filter.product_type(), None);

        filter.select_type(Some("Wings"));
        filter.select_category(None);
        assert_eq!(filter.product_type(), None);
    }

    #[test]
    fn test_type_without_category_is_ignored() {
        let mut filter = FilterState::new();
        assert!(!filter.select_type(Some("Whole")));
        assert_eq!(filter.product_type(), None);
    }

    #[test]
    fn test_category_and_type_filter() {
        let products = vec![
            product(1, "A", "Fresh", "Whole", 1, 1),
            product(2, "B", "Fresh", "Parts", 1, 2),
            product(3, "C", "Frozen", "Whole", 1, 3),
        ];
        let mut filter = FilterState::new();
        filter.select_category(Some("fresh"));
        assert_eq!(ids(&filter.apply(&products, None)), vec![2, 1]);

        filter.select_type(Some("whole"));
        assert_eq!(ids(&filter.apply(&products, None)), vec![1]);
    }

    #[test]
    fn test_deleted_products_never_match() {
        let mut p = product(1, "Chicken", "x", "y", 1, 1);
        p.is_deleted = true;
        assert!(!FilterState::new().matches(&p));
    }

    #[test]
    fn test_output_is_subset_and_idempotent() {
        let products: Vec<Product> = (1..=30)
            .map(|i| product(i, if i % 3 == 0 { "Chicken" } else { "Duck" }, "x", "y", i * 7 % 50, i))
            .collect();
        let mut filter = FilterState::new();
        filter.set_search("chicken");
        filter.set_price_range(Some(Decimal::from(5)), None);
        filter.set_sort(SortMode::PriceLow);

        let first = filter.apply(&products, None);
        let second = filter.apply(&products, None);
        assert_eq!(first, second);
        assert!(first.iter().all(|p| products.contains(p) && filter.matches(p)));
        assert!(first.windows(2).all(|w| w[0].price <= w[1].price));
    }
}
