//! Product query pipeline: grouping, filtering, sorting and pagination.
//!
//! Everything here is synchronous and works over an already fetched
//! product snapshot. Fetching and caching live in [`crate::store`].

mod filter;
mod grouping;
mod pagination;
mod view;

use rust_decimal::Decimal;
use serde::Deserialize;

pub use filter::{FilterState, ParseSortModeError, Popularity, SortMode, sort_products};
pub use grouping::{CategoryGroup, TypeGroup, group_products};
pub use pagination::{BATCH_SIZE, Pager, SENTINEL_DEBOUNCE};
pub use view::{CatalogView, ViewState};

/// Catalog query as it arrives from a URL or the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    #[serde(rename = "q")]
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<SortMode>,
    /// Number of batches to display (default one).
    pub batches: Option<usize>,
    /// Display everything.
    #[serde(default)]
    pub all: bool,
}

impl CatalogQuery {
    /// Apply the query to `view` in the order a user would: category, type,
    /// search, price, sort, then pagination.
    pub fn apply_to(&self, view: &mut CatalogView) {
        view.select_category(self.category.as_deref());
        view.select_type(self.product_type.as_deref());
        if let Some(search) = &self.search {
            view.set_search(search);
        }
        view.set_price_range(self.min_price, self.max_price);
        view.set_sort(self.sort.unwrap_or_default());
        if self.all {
            view.load_all();
        } else if let Some(batches) = self.batches {
            view.show_batches(batches);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::product;
    use super::*;

    #[test]
    fn test_query_from_url() {
        let query: CatalogQuery = serde_json::from_value(serde_json::json!({
            "category": "Fresh",
            "type": "Whole",
            "q": "chicken",
            "min_price": "10",
            "sort": "price-high",
            "batches": 2
        }))
        .unwrap_or_default();

        assert_eq!(query.product_type.as_deref(), Some("Whole"));
        assert_eq!(query.sort, Some(SortMode::PriceHigh));
        assert_eq!(query.min_price, Some(Decimal::from(10)));
    }

    #[test]
    fn test_query_applies_type_after_category() {
        let products = vec![
            product(1, "Chicken", "Fresh", "Whole", 50, 1),
            product(2, "Chicken", "Fresh", "Parts", 60, 2),
            product(3, "Chicken", "Frozen", "Whole", 70, 3),
        ];
        let query = CatalogQuery {
            category: Some("fresh".into()),
            product_type: Some("whole".into()),
            ..CatalogQuery::default()
        };

        let mut view = CatalogView::with_products(products, None);
        query.apply_to(&mut view);
        let ids: Vec<i64> = view.displayed().iter().map(|p| p.id.as_i64()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_query_all_shows_everything() {
        let products: Vec<_> = (1..=20)
            .map(|i| product(i, "Duck", "Fresh", "Whole", i, i))
            .collect();
        let query = CatalogQuery {
            all: true,
            ..CatalogQuery::default()
        };

        let mut view = CatalogView::with_products(products, None);
        query.apply_to(&mut view);
        assert_eq!(view.displayed().len(), 20);
        assert!(!view.has_more());
    }
}
