use thiserror::Error;

use crate::{CartId, OwnerId, ProductId, Version};

/// Errors that can occur when interacting with the cart store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A changeset was built against a stale cart version.
    #[error(
        "Concurrency conflict for cart {cart_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        cart_id: CartId,
        expected: Version,
        actual: Version,
    },

    /// The cart was not found in the store.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// The owner already has a cart.
    #[error("Owner {0} already has a cart")]
    DuplicateOwner(OwnerId),

    /// The cart already holds a line for this product.
    #[error("Cart {cart_id} already holds a line for product {product_id}")]
    DuplicateItem { cart_id: CartId, product_id: ProductId },

    /// A changeset failed validation and was not applied.
    #[error("Invalid changeset: {0}")]
    InvalidChangeset(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A persisted value could not be mapped back onto a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for cart store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
