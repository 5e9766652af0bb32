//! Product and popularity queries.

use async_trait::async_trait;
use dawajen_core::{NewProduct, Product, ProductId, ProductPatch, ProductRow, Session};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{ProductSource, RemoteError, TableStoreClient, convert_rows};
use crate::catalog::Popularity;

#[derive(Deserialize)]
struct FavoriteProduct {
    product_id: ProductId,
}

impl TableStoreClient {
    async fn fetch_products(&self) -> Result<Vec<Product>, RemoteError> {
        let request = self.rest(Method::GET, "products", None)?.query(&[
            ("select", "*"),
            ("is_deleted", "eq.false"),
            ("order", "created_at.desc"),
        ]);
        let rows: Vec<Value> = Self::send_json(request).await?;
        let total = rows.len();
        let products = convert_rows::<ProductRow, Product, _>("products", rows);
        debug!(rows = total, products = products.len(), "Fetched products");
        Ok(products)
    }

    /// Run a product write that returns the affected rows and pick the first.
    async fn product_write(
        request: reqwest::RequestBuilder,
        id: Option<ProductId>,
    ) -> Result<Product, RemoteError> {
        let rows: Vec<Value> = Self::send_json(request.header("Prefer", "return=representation")).await?;
        let Some(row) = rows.into_iter().next() else {
            return Err(RemoteError::NotFound(
                id.map_or_else(|| "product".to_string(), |id| format!("product {id}")),
            ));
        };
        let row: ProductRow =
            serde_json::from_value(row).map_err(|e| RemoteError::Parse(e.to_string()))?;
        Product::try_from(row).map_err(|e| RemoteError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ProductSource for TableStoreClient {
    #[instrument(skip(self, cancel))]
    async fn list_products(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, RemoteError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RemoteError::Cancelled),
            result = self.fetch_products() => result,
        }
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RemoteError> {
        let request = self
            .rest(Method::GET, "products", None)?
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let rows: Vec<Value> = Self::send_json(request).await?;
        Ok(convert_rows::<ProductRow, Product, _>("products", rows)
            .into_iter()
            .next())
    }

    #[instrument(skip(self))]
    async fn favorite_counts(&self) -> Result<Popularity, RemoteError> {
        let request = self
            .rest(Method::GET, "favorites", None)?
            .query(&[("select", "product_id")]);
        let rows: Vec<FavoriteProduct> = Self::send_json(request).await?;

        let mut counts = Popularity::new();
        for row in rows {
            *counts.entry(row.product_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    #[instrument(skip(self, session, product))]
    async fn insert_product(
        &self,
        session: &Session,
        product: &NewProduct,
    ) -> Result<Product, RemoteError> {
        let request = self
            .rest(Method::POST, "products", Some(session))?
            .json(&product.to_row());
        Self::product_write(request, None).await
    }

    #[instrument(skip(self, session, patch))]
    async fn update_product(
        &self,
        session: &Session,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RemoteError> {
        let request = self
            .rest(Method::PATCH, "products", Some(session))?
            .query(&[("id", format!("eq.{id}"))])
            .json(&patch.to_row());
        Self::product_write(request, Some(id)).await
    }

    #[instrument(skip(self, session))]
    async fn soft_delete_product(
        &self,
        session: &Session,
        id: ProductId,
    ) -> Result<Product, RemoteError> {
        let request = self
            .rest(Method::PATCH, "products", Some(session))?
            .query(&[("id", format!("eq.{id}"))])
            .json(&json!({ "is_deleted": true }));
        Self::product_write(request, Some(id)).await
    }
}
