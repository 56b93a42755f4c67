//! Product catalog port and in-memory implementation.
//!
//! The catalog is the source of truth for price, discount and stock. Carts only
//! ever read it; price and removal changes reach carts through the
//! [`ProductChange`] notifications returned by [`ProductCatalog::subscribe`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

use crate::pricing::{Discount, special_price};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Errors raised by a product catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Invalid discount {0}: must be between 0% and 100%")]
    InvalidDiscount(Discount),

    #[error("Invalid price {0}: must not be negative")]
    InvalidPrice(Money),

    /// The backing catalog service could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// A product as seen by carts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount: Discount,
    /// `price` with `discount` applied. Kept in step by the catalog.
    pub special_price: Money,
    pub stock: u32,
}

impl Product {
    /// Creates a product, deriving its special price.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        discount: Discount,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            discount,
            special_price: special_price(price, discount),
            stock,
        }
    }

    /// Returns true if at least one unit is in stock.
    pub fn is_available(&self) -> bool {
        self.stock > 0
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.price.is_negative() {
            return Err(CatalogError::InvalidPrice(self.price));
        }
        if !self.discount.is_valid() {
            return Err(CatalogError::InvalidDiscount(self.discount));
        }
        Ok(())
    }
}

/// A catalog-side change that may affect carts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProductChange {
    /// The special price or the discount of a product changed.
    PricingChanged {
        product_id: ProductId,
        special_price: Money,
        discount: Discount,
    },

    /// The available stock of a product changed.
    StockChanged { product_id: ProductId, stock: u32 },

    /// The product was deleted from the catalog.
    Removed { product_id: ProductId },
}

impl ProductChange {
    /// Returns the product this change is about.
    pub fn product_id(&self) -> &ProductId {
        match self {
            ProductChange::PricingChanged { product_id, .. }
            | ProductChange::StockChanged { product_id, .. }
            | ProductChange::Removed { product_id } => product_id,
        }
    }

    /// Returns a short name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ProductChange::PricingChanged { .. } => "pricing_changed",
            ProductChange::StockChanged { .. } => "stock_changed",
            ProductChange::Removed { .. } => "removed",
        }
    }
}

/// A partial update of a product. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub discount: Option<Discount>,
    pub stock: Option<u32>,
}

/// Read side of the product catalog used by the cart engine.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up a product. Returns `Ok(None)` if it does not exist.
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError>;

    /// Registers for change notifications.
    ///
    /// Every receiver sees every change published after it subscribed.
    fn subscribe(&self) -> broadcast::Receiver<ProductChange>;
}

/// In-memory product catalog with change notifications.
///
/// Cloning yields a handle to the same catalog.
#[derive(Debug, Clone)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    changes: broadcast::Sender<ProductChange>,
}

impl Default for InMemoryProductCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProductCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            products: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Inserts or overwrites a product.
    ///
    /// Overwriting publishes the same notifications as [`Self::update_product`].
    pub async fn upsert(&self, product: Product) -> Result<Product, CatalogError> {
        let product = Product::new(
            product.id,
            product.name,
            product.price,
            product.discount,
            product.stock,
        );
        product.validate()?;

        let previous = self
            .products
            .write()
            .await
            .insert(product.id.clone(), product.clone());

        if let Some(previous) = previous {
            self.publish_diff(&previous, &product);
        }
        Ok(product)
    }

    /// Applies a partial update and publishes what changed.
    ///
    /// A `PricingChanged` notification goes out only when the special price or
    /// the discount actually moved, a `StockChanged` only when stock moved.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        product_id: &ProductId,
        update: ProductUpdate,
    ) -> Result<Product, CatalogError> {
        let (previous, updated) = {
            let mut products = self.products.write().await;
            let current = products
                .get_mut(product_id)
                .ok_or_else(|| CatalogError::ProductNotFound(product_id.clone()))?;

            let updated = Product::new(
                product_id.clone(),
                update.name.unwrap_or_else(|| current.name.clone()),
                update.price.unwrap_or(current.price),
                update.discount.unwrap_or(current.discount),
                update.stock.unwrap_or(current.stock),
            );
            updated.validate()?;

            (std::mem::replace(current, updated.clone()), updated)
        };

        self.publish_diff(&previous, &updated);
        Ok(updated)
    }

    /// Sets the available stock of a product.
    pub async fn set_stock(&self, product_id: &ProductId, stock: u32) -> Result<Product, CatalogError> {
        self.update_product(
            product_id,
            ProductUpdate {
                stock: Some(stock),
                ..ProductUpdate::default()
            },
        )
        .await
    }

    /// Deletes a product and publishes `Removed`.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<Product, CatalogError> {
        let removed = self
            .products
            .write()
            .await
            .remove(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.clone()))?;

        self.publish(ProductChange::Removed {
            product_id: product_id.clone(),
        });
        Ok(removed)
    }

    /// Returns every product, ordered by id.
    pub async fn list(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }

    /// Returns the number of products.
    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    /// Returns true if the catalog holds no products.
    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }

    fn publish_diff(&self, previous: &Product, current: &Product) {
        if previous.special_price != current.special_price || previous.discount != current.discount
        {
            self.publish(ProductChange::PricingChanged {
                product_id: current.id.clone(),
                special_price: current.special_price,
                discount: current.discount,
            });
        }
        if previous.stock != current.stock {
            self.publish(ProductChange::StockChanged {
                product_id: current.id.clone(),
                stock: current.stock,
            });
        }
    }

    fn publish(&self, change: ProductChange) {
        // No subscribers means nobody holds a cart view of this product.
        if self.changes.send(change).is_err() {
            tracing::debug!("product change published with no subscribers");
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProductChange> {
        self.changes.subscribe()
    }
}
