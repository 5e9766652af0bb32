//! Catalog browsing commands.
//!
//! # Usage
//!
//! ```bash
//! dawajen-cli products --category chicken --sort price-low
//! dawajen-cli categories
//! ```

use std::fmt::Write as _;

use dawajen_core::Product;
use dawajen_storefront::catalog::{CatalogQuery, CatalogView, CategoryGroup, SortMode};

use super::{CommandError, Context};

/// One table row: id, English name, category/type, price, stock.
fn format_row(product: &Product) -> String {
    format!(
        "{:>5}  {:<32}  {:<24}  {:>9}  {:>4}",
        product.id.as_i64(),
        product.name.display(false),
        format!("{}/{}", product.category_key(), product.type_key()),
        product.price,
        product.quantity
    )
}

fn format_groups(groups: &[CategoryGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        let _ = writeln!(
            out,
            "{} ({}) [{}]",
            group.label.en, group.label.ar, group.count
        );
        for product_type in &group.types {
            let _ = writeln!(
                out,
                "  {} ({}) [{}]",
                product_type.label.en, product_type.label.ar, product_type.count
            );
        }
    }
    out
}

/// Print the products matching `query`.
///
/// # Errors
///
/// Returns error if the product list cannot be loaded.
#[allow(clippy::print_stdout)]
pub async fn products(query: &CatalogQuery, json: bool) -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    let snapshot = ctx.store.products().await?;
    let popularity = if query.sort == Some(SortMode::Popular) {
        ctx.store.popularity().await
    } else {
        None
    };

    let mut view = CatalogView::with_products(snapshot.products, popularity);
    query.apply_to(&mut view);

    if json {
        println!("{}", serde_json::to_string_pretty(view.displayed())?);
    } else {
        for product in view.displayed() {
            println!("{}", format_row(product));
        }
        println!(
            "\n{} of {} shown{}",
            view.displayed().len(),
            view.filtered().len(),
            if view.has_more() { " (more available)" } else { "" }
        );
    }
    tracing::debug!(served_from = ?snapshot.served_from, "Catalog listed");
    ctx.cache.flush().await;
    Ok(())
}

/// Print category and type groups.
///
/// # Errors
///
/// Returns error if the product list cannot be loaded.
#[allow(clippy::print_stdout)]
pub async fn categories() -> Result<(), CommandError> {
    let ctx = Context::from_env().await?;
    let snapshot = ctx.store.products().await?;
    let view = CatalogView::with_products(snapshot.products, None);
    print!("{}", format_groups(&view.groups()));
    ctx.cache.flush().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dawajen_core::{Bilingual, ProductId};
    use dawajen_storefront::catalog::group_products;
    use rust_decimal::Decimal;

    fn product(id: i64, category: &str, product_type: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: Bilingual::new("دجاج كامل", "Whole chicken"),
            category: Bilingual::new("دجاج", category),
            product_type: Bilingual::new("طازج", product_type),
            ingredients: Bilingual::default(),
            description: Bilingual::default(),
            price: Decimal::new(2550, 2),
            quantity: 4,
            image_url: None,
            is_deleted: false,
            created_at: chrono::DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_format_row() {
        let row = format_row(&product(7, "Chicken", "Fresh"));
        assert!(row.starts_with("    7  Whole chicken"));
        assert!(row.contains("chicken/fresh"));
        assert!(row.contains("25.50"));
    }

    #[test]
    fn test_format_groups_nests_types() {
        let groups = group_products(&[
            product(1, "Chicken", "Fresh"),
            product(2, "Chicken", "Frozen"),
        ]);
        let text = format_groups(&groups);
        assert!(text.starts_with("Chicken (دجاج) [2]\n"));
        assert!(text.contains("  Fresh (طازج) [1]\n"));
    }
}
