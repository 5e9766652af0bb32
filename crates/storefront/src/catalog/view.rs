//! The derived catalog view: filtered, sorted and paginated products.

use std::time::Instant;

use dawajen_core::Product;
use rust_decimal::Decimal;
use serde::Serialize;

use super::filter::{FilterState, Popularity, SortMode};
use super::grouping::{CategoryGroup, group_products};
use super::pagination::Pager;

/// What the view should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    /// No product list has arrived yet.
    Loading,
    /// The last fetch failed.
    Error {
        message: String,
        connection_error: bool,
    },
    /// Products are loaded but none pass the filters.
    Empty,
    Ready,
}

#[derive(Debug, Clone)]
struct ViewError {
    message: String,
    connection_error: bool,
}

/// Catalog view over a product snapshot.
///
/// Every filter setter recomputes the filtered list synchronously and
/// resets pagination to the first batch. Replacing the product snapshot
/// recomputes the list but keeps the requested batch count.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    products: Option<Vec<Product>>,
    popularity: Option<Popularity>,
    filter: FilterState,
    filtered: Vec<Product>,
    pager: Pager,
    error: Option<ViewError>,
}

impl CatalogView {
    /// An empty view in the `Loading` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A view over an already loaded snapshot.
    #[must_use]
    pub fn with_products(products: Vec<Product>, popularity: Option<Popularity>) -> Self {
        let mut view = Self::new();
        view.set_products(products, popularity);
        view
    }

    /// Replace the product snapshot and clear any error.
    pub fn set_products(&mut self, products: Vec<Product>, popularity: Option<Popularity>) {
        self.products = Some(products);
        self.popularity = popularity;
        self.error = None;
        self.recompute();
    }

    /// Record a failed fetch. The previous snapshot, if any, is kept.
    pub fn set_error(&mut self, message: impl Into<String>, connection_error: bool) {
        self.error = Some(ViewError {
            message: message.into(),
            connection_error,
        });
    }

    #[must_use]
    pub fn state(&self) -> ViewState {
        if let Some(error) = &self.error {
            return ViewState::Error {
                message: error.message.clone(),
                connection_error: error.connection_error,
            };
        }
        match &self.products {
            None => ViewState::Loading,
            Some(_) if self.filtered.is_empty() => ViewState::Empty,
            Some(_) => ViewState::Ready,
        }
    }

    #[must_use]
    pub const fn filter(&self) -> &FilterState {
        &self.filter
    }

    #[must_use]
    pub const fn pager(&self) -> &Pager {
        &self.pager
    }

    /// The full filtered list in display order.
    #[must_use]
    pub fn filtered(&self) -> &[Product] {
        &self.filtered
    }

    /// The displayed prefix of the filtered list.
    #[must_use]
    pub fn displayed(&self) -> &[Product] {
        let visible = self.pager.visible(self.filtered.len());
        self.filtered.get(..visible).unwrap_or(&self.filtered)
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.pager.has_more(self.filtered.len())
    }

    /// Category/type groups over the whole snapshot.
    #[must_use]
    pub fn groups(&self) -> Vec<CategoryGroup> {
        self.products
            .as_deref()
            .map(group_products)
            .unwrap_or_default()
    }

    pub fn select_category(&mut self, category: Option<&str>) {
        self.filter.select_category(category);
        self.refilter();
    }

    pub fn select_type(&mut self, product_type: Option<&str>) {
        if self.filter.select_type(product_type) {
            self.refilter();
        }
    }

    pub fn set_search(&mut self, term: &str) {
        self.filter.set_search(term);
        self.refilter();
    }

    pub fn set_price_range(&mut self, min: Option<Decimal>, max: Option<Decimal>) {
        self.filter.set_price_range(min, max);
        self.refilter();
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.filter.set_sort(sort);
        self.refilter();
    }

    /// Drop every filter, keeping the sort mode.
    pub fn clear_filters(&mut self) {
        let sort = self.filter.sort();
        self.filter = FilterState::new();
        self.filter.set_sort(sort);
        self.refilter();
    }

    pub fn load_more(&mut self) -> bool {
        self.pager.load_more(self.filtered.len())
    }

    pub fn on_sentinel_visible(&mut self, now: Instant) -> bool {
        self.pager.on_sentinel_visible(self.filtered.len(), now)
    }

    pub const fn load_all(&mut self) {
        self.pager.load_all();
    }

    /// Jump straight to `batches` batches, as when restoring a URL.
    pub fn show_batches(&mut self, batches: usize) {
        self.pager.set_batches(batches);
    }

    fn refilter(&mut self) {
        self.recompute();
        self.pager.reset();
    }

    fn recompute(&mut self) {
        self.filtered = self
            .products
            .as_deref()
            .map(|products| self.filter.apply(products, self.popularity.as_ref()))
            .unwrap_or_default();
    }
}
