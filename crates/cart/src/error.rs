//! Cart engine error types.

use cart_store::{CartId, OwnerId, ProductId, StoreError};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::invariant::InvariantViolation;
use crate::lock::LockTimeout;

/// The kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Cart,
    Product,
    CartItem,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Cart => "Cart",
            Entity::Product => "Product",
            Entity::CartItem => "CartItem",
        };
        write!(f, "{name}")
    }
}

/// Errors reported by the cart engine. None of them is retried internally.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// The cart already holds a line for the product.
    #[error("Product {product_id} is already in cart {cart_id}")]
    AlreadyInCart {
        cart_id: CartId,
        product_id: ProductId,
    },

    /// The product has no stock at all.
    #[error("Product {0} is not available")]
    Unavailable(ProductId),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u32,
    },

    /// A quantity would be zero where a line must exist, or would go negative.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A line or cart total would leave the representable cent range.
    #[error("Amount out of range for product {product_id}")]
    AmountOverflow { product_id: ProductId },

    /// The caller does not own the cart.
    #[error("Owner {owner_id} may not access cart {cart_id}")]
    Unauthorized { owner_id: OwnerId, cart_id: CartId },

    #[error("Cart busy: {0}")]
    LockTimeout(#[from] LockTimeout),

    #[error("Cart invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl CartError {
    pub fn cart_not_found(cart_id: impl std::fmt::Display) -> Self {
        CartError::NotFound {
            entity: Entity::Cart,
            id: cart_id.to_string(),
        }
    }

    pub fn product_not_found(product_id: &ProductId) -> Self {
        CartError::NotFound {
            entity: Entity::Product,
            id: product_id.to_string(),
        }
    }

    pub fn item_not_found(cart_id: CartId, product_id: &ProductId) -> Self {
        CartError::NotFound {
            entity: Entity::CartItem,
            id: format!("{cart_id}/{product_id}"),
        }
    }

    /// Returns true for `NotFound` on the given entity.
    pub fn is_not_found(&self, expected: Entity) -> bool {
        matches!(self, CartError::NotFound { entity, .. } if *entity == expected)
    }
}

/// Convenience type alias for cart engine results.
pub type Result<T> = std::result::Result<T, CartError>;
