use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, CartItemId, Money, OwnerId, ProductId};

/// Largest quantity a single cart line may hold (the range of a SQL `INTEGER`).
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Version number of a cart row, used for optimistic concurrency control.
///
/// A freshly created cart is at version 1; every committed changeset
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a newly saved cart.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shopping cart row.
///
/// `total_price` is maintained by the cart engine and must always equal the
/// sum of `quantity * product_price` over the cart's items. `item_ids` keeps
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner_id: OwnerId,
    pub total_price: Money,
    pub item_ids: Vec<CartItemId>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for an owner.
    pub fn new(owner_id: OwnerId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            owner_id,
            total_price: Money::zero(),
            item_ids: Vec::new(),
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// One line in a cart.
///
/// `product_price` is the special price captured at the last write, not a
/// live reference to the catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub product_price: Money,
    /// Discount at the time of the write, in basis points.
    pub discount_bp: u32,
}

impl CartItem {
    /// Creates a new cart line.
    pub fn new(
        cart_id: CartId,
        product_id: impl Into<ProductId>,
        quantity: u32,
        product_price: Money,
        discount_bp: u32,
    ) -> Self {
        Self {
            id: CartItemId::new(),
            cart_id,
            product_id: product_id.into(),
            quantity,
            product_price,
            discount_bp,
        }
    }

    /// The line's contribution to the cart total, or `None` if it does not
    /// fit in the cent range.
    pub fn line_total(&self) -> Option<Money> {
        self.product_price.checked_times(self.quantity)
    }
}
