//! Dawajen CLI - catalog browsing and cache management.
//!
//! # Usage
//!
//! ```bash
//! # Newest chicken products, first two batches
//! dawajen-cli products --category chicken --batches 2
//!
//! # Everything matching "wings", cheapest first, as JSON
//! dawajen-cli products -q wings --sort price-low --all --json
//!
//! # Category and type counts
//! dawajen-cli categories
//!
//! # Fill the persistent cache from the table-store
//! dawajen-cli cache warm
//!
//! # Delete persistent cache files
//! dawajen-cli cache clear
//! ```
//!
//! Reads the same environment variables as the storefront server
//! (`TABLE_STORE_URL`, `TABLE_STORE_ANON_KEY`, `CACHE_DIR`, ...).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use dawajen_storefront::catalog::{CatalogQuery, SortMode};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "dawajen-cli")]
#[command(author, version, about = "Dawajen CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List products through the catalog filters
    Products(ProductArgs),
    /// Show category and type groups with product counts
    Categories,
    /// Manage the product cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct ProductArgs {
    /// Category key (case-insensitive)
    #[arg(short, long)]
    category: Option<String>,

    /// Type key within the category
    #[arg(short = 't', long = "type")]
    product_type: Option<String>,

    /// Search term (name, category or type, either language)
    #[arg(short, long)]
    q: Option<String>,

    #[arg(long)]
    min_price: Option<Decimal>,

    #[arg(long)]
    max_price: Option<Decimal>,

    /// Sort order (`newest`, `price-low`, `price-high`, `popular`)
    #[arg(short, long, default_value = "newest")]
    sort: SortMode,

    /// Number of batches to show
    #[arg(short, long)]
    batches: Option<usize>,

    /// Show every matching product
    #[arg(long)]
    all: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl ProductArgs {
    fn query(&self) -> CatalogQuery {
        CatalogQuery {
            category: self.category.clone(),
            product_type: self.product_type.clone(),
            search: self.q.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            sort: Some(self.sort),
            batches: self.batches,
            all: self.all,
        }
    }
}

#[derive(Subcommand)]
enum CacheAction {
    /// Fetch products and popularity and write them to the cache
    Warm,
    /// Delete the persistent cache files
    Clear,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,dawajen_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Products(args) => {
            commands::catalog::products(&args.query(), args.json).await?;
        }
        Commands::Categories => commands::catalog::categories().await?,
        Commands::Cache { action } => match action {
            CacheAction::Warm => commands::cache::warm().await?,
            CacheAction::Clear => commands::cache::clear().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_args_build_query() {
        #[allow(clippy::unwrap_used)]
        let cli = Cli::try_parse_from([
            "dawajen-cli",
            "products",
            "-c",
            "Chicken",
            "--type",
            "fresh",
            "--sort",
            "price-high",
            "--max-price",
            "40",
            "--all",
        ])
        .unwrap();

        let Commands::Products(args) = cli.command else {
            panic!("expected products command");
        };
        let query = args.query();
        assert_eq!(query.category.as_deref(), Some("Chicken"));
        assert_eq!(query.product_type.as_deref(), Some("fresh"));
        assert_eq!(query.sort, Some(SortMode::PriceHigh));
        assert_eq!(query.max_price, Some(Decimal::from(40)));
        assert!(query.all);
    }

    #[test]
    fn test_rejects_unknown_sort() {
        assert!(Cli::try_parse_from(["dawajen-cli", "products", "--sort", "cheapest"]).is_err());
    }
}
