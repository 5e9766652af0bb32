//! In-memory [`ProductSource`] for store and checkout tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dawajen_core::{NewProduct, Product, ProductId, ProductPatch, Session, UserId};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::Popularity;
use crate::remote::{ProductSource, RemoteError};

/// How `list_products` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Immediate,
    /// Block until the cancellation token fires.
    HoldUntilCancelled,
}

#[derive(Default)]
struct FakeState {
    products: Vec<Product>,
    favorites: Popularity,
    list_failure: Option<(u16, String)>,
    write_failure: Option<String>,
    held: Option<oneshot::Receiver<Vec<Product>>>,
}

pub struct FakeSource {
    state: Mutex<FakeState>,
    mode: Mutex<ListMode>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    favorite_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

pub fn session() -> Session {
    Session {
        access_token: "test-token".to_string(),
        user_id: UserId::new(Uuid::nil()),
    }
}

impl FakeSource {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                products,
                ..FakeState::default()
            }),
            mode: Mutex::new(ListMode::Immediate),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            favorite_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_products(&self, products: Vec<Product>) {
        self.state().products = products;
    }

    pub fn set_favorites(&self, favorites: Popularity) {
        self.state().favorites = favorites;
    }

    pub fn set_mode(&self, mode: ListMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn fail_lists(&self, status: u16, message: &str) {
        self.state().list_failure = Some((status, message.to_string()));
    }

    pub fn fail_writes(&self, message: &str) {
        self.state().write_failure = Some(message.to_string());
    }

    /// The next `list_products` call waits for the returned sender and
    /// answers with whatever it is sent, ignoring cancellation.
    pub fn hold_next_list(&self) -> oneshot::Sender<Vec<Product>> {
        let (tx, rx) = oneshot::channel();
        self.state().held = Some(rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn favorite_calls(&self) -> usize {
        self.favorite_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn write<T>(&self, apply: impl FnOnce(&mut Vec<Product>) -> Option<T>, id: Option<ProductId>) -> Result<T, RemoteError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(message) = &state.write_failure {
            return Err(RemoteError::Api {
                status: 403,
                message: message.clone(),
            });
        }
        apply(&mut state.products)
            .ok_or_else(|| RemoteError::NotFound(format!("product {}", id.map_or(0, |id| id.as_i64()))))
    }
}

#[async_trait]
impl ProductSource for FakeSource {
    async fn list_products(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let held = self.state().held.take();
        if let Some(rx) = held {
            return rx.await.map_err(|_| RemoteError::Cancelled);
        }

        let mode = *self.mode.lock().unwrap_or_else(PoisonError::into_inner);
        if mode == ListMode::HoldUntilCancelled {
            cancel.cancelled().await;
            return Err(RemoteError::Cancelled);
        }

        let state = self.state();
        if let Some((status, message)) = &state.list_failure {
            return Err(RemoteError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        Ok(state
            .products
            .iter()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state().products.iter().find(|p| p.id == id).cloned())
    }

    async fn favorite_counts(&self) -> Result<Popularity, RemoteError> {
        self.favorite_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state().favorites.clone())
    }

    async fn insert_product(
        &self,
        _session: &Session,
        product: &NewProduct,
    ) -> Result<Product, RemoteError> {
        self.write(
            |products| {
                let next = products.iter().map(|p| p.id.as_i64()).max().unwrap_or(0) + 1;
                let created = Product {
                    id: ProductId::new(next),
                    name: product.name.clone(),
                    category: product.category.clone(),
                    product_type: product.product_type.clone(),
                    ingredients: product.ingredients.clone(),
                    description: product.description.clone(),
                    price: product.price,
                    quantity: product.quantity,
                    image_url: product.image_url.clone(),
                    is_deleted: false,
                    created_at: Utc::now(),
                };
                products.push(created.clone());
                Some(created)
            },
            None,
        )
    }

    async fn update_product(
        &self,
        _session: &Session,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RemoteError> {
        self.write(
            |products| {
                let product = products.iter_mut().find(|p| p.id == id)?;
                if let Some(name) = &patch.name {
                    product.name = name.clone();
                }
                if let Some(price) = patch.price {
                    product.price = price;
                }
                if let Some(quantity) = patch.quantity {
                    product.quantity = quantity;
                }
                Some(product.clone())
            },
            Some(id),
        )
    }

    async fn soft_delete_product(
        &self,
        _session: &Session,
        id: ProductId,
    ) -> Result<Product, RemoteError> {
        self.write(
            |products| {
                let product = products.iter_mut().find(|p| p.id == id)?;
                product.is_deleted = true;
                Some(product.clone())
            },
            Some(id),
        )
    }
}
