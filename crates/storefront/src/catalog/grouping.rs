//! Category and type groupings for the catalog navigation.

use std::collections::HashMap;

use dawajen_core::{Bilingual, Product};
use serde::Serialize;

/// A product type inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeGroup {
    pub key: String,
    /// Label as written on the first product seen with this key.
    pub label: Bilingual,
    pub count: usize,
}

/// A category with its types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub key: String,
    pub label: Bilingual,
    pub count: usize,
    pub types: Vec<TypeGroup>,
}

/// Groups keyed by first-seen order, then stably sorted by count.
struct Counter<T> {
    index: HashMap<String, usize>,
    groups: Vec<T>,
}

impl<T> Counter<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn slot(&mut self, key: String, make: impl FnOnce(String) -> T) -> Option<&mut T> {
        let next = self.groups.len();
        let idx = *self.index.entry(key.clone()).or_insert(next);
        if idx == next {
            self.groups.push(make(key));
        }
        self.groups.get_mut(idx)
    }
}

/// Group non-deleted products by category, then by type within each category.
///
/// Categories and types are ordered by descending product count; ties keep
/// the order in which they were first seen. Products whose category key is
/// empty are left out, as are types with an empty key.
#[must_use]
pub fn group_products(products: &[Product]) -> Vec<CategoryGroup> {
    let mut categories: Counter<(CategoryGroup, Counter<TypeGroup>)> = Counter::new();

    for product in products.iter().filter(|p| !p.is_deleted) {
        let category_key = product.category_key();
        if category_key.is_empty() {
            continue;
        }
        let Some((category, types)) = categories.slot(category_key, |key| {
            (
                CategoryGroup {
                    key,
                    label: product.category.clone(),
                    count: 0,
                    types: Vec::new(),
                },
                Counter::new(),
            )
        }) else {
            continue;
        };
        category.count += 1;

        let type_key = product.type_key();
        if type_key.is_empty() {
            continue;
        }
        if let Some(group) = types.slot(type_key, |key| TypeGroup {
            key,
            label: product.product_type.clone(),
            count: 0,
        }) {
            group.count += 1;
        }
    }

    let mut out: Vec<CategoryGroup> = categories
        .groups
        .into_iter()
        .map(|(mut category, types)| {
            category.types = types.groups;
            category.types.sort_by(|a, b| b.count.cmp(&a.count));
            category
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::product;

    fn keys(groups: &[CategoryGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.key.as_str()).collect()
    }

    #[test]
    fn test_categories_sorted_by_count_ties_first_seen() {
        let products = vec![
            product(1, "a", "Frozen", "Wings", 1, 1),
            product(2, "b", "Fresh", "Whole", 1, 2),
            product(3, "c", "Marinated", "Shish", 1, 3),
            product(4, "d", "Fresh", "Parts", 1, 4),
            product(5, "e", "Marinated", "Shawarma", 1, 5),
        ];

        let groups = group_products(&products);
        assert_eq!(keys(&groups), vec!["fresh", "marinated", "frozen"]);
        assert_eq!(groups.first().map(|g| g.count), Some(2));
    }

    #[test]
    fn test_types_counted_within_category() {
        let products = vec![
            product(1, "a", "Fresh", "Parts", 1, 1),
            product(2, "b", "Fresh", "Whole", 1, 2),
            product(3, "c", "Fresh", "whole ", 1, 3),
            product(4, "d", "Frozen", "Whole", 1, 4),
        ];

        let groups = group_products(&products);
        let fresh = groups.first().unwrap_or_else(|| panic!("no groups"));
        let types: Vec<(&str, usize)> = fresh
            .types
            .iter()
            .map(|t| (t.key.as_str(), t.count))
            .collect();
        assert_eq!(types, vec![("whole", 2), ("parts", 1)]);
        assert_eq!(fresh.types.first().map(|t| t.label.en.as_str()), Some("Whole"));
    }

    #[test]
    fn test_arabic_only_category_and_deleted_products() {
        let mut arabic = product(1, "a", "", "", 1, 1);
        arabic.category.ar = "مجمد".into();
        let mut deleted = product(2, "b", "Fresh", "", 1, 2);
        deleted.is_deleted = true;
        let blank = product(3, "c", "", "", 1, 3);

        let groups = group_products(&[arabic, deleted, blank]);
        assert_eq!(keys(&groups), vec!["مجمد"]);
        assert!(groups.first().is_some_and(|g| g.types.is_empty()));
    }
}
