//! Cart-to-inventory consistency core.
//!
//! This crate keeps each cart's stored total in step with its lines while
//! carts are mutated concurrently:
//! - [`pricing`] computes special prices from list price and discount
//! - [`catalog`] is the product catalog port with an in-memory implementation
//! - [`CartConsistencyEngine`] owns every cart mutation and serializes them per cart
//!
//! Catalog changes are propagated into carts by the `reconciliation` crate,
//! which drives the engine's per-cart entry points.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod invariant;
pub mod lock;
pub mod pricing;
pub mod view;

pub use cart_store::{Cart, CartId, CartItem, CartItemId, Money, OwnerId, ProductId};
pub use catalog::{
    CatalogError, InMemoryProductCatalog, Product, ProductCatalog, ProductChange, ProductUpdate,
};
pub use engine::{CartConsistencyEngine, CartRef, DEFAULT_LOCK_TIMEOUT, EngineConfig};
pub use error::{CartError, Entity, Result};
pub use invariant::InvariantViolation;
pub use lock::{KeyedGuard, KeyedLocks, LockTimeout};
pub use pricing::{Discount, special_price};
pub use view::CartView;
