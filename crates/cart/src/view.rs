use cart_store::{Cart, CartId, CartItem, Money, OwnerId, ProductId};
use serde::Serialize;

/// A cart together with its resolved lines, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

impl CartView {
    /// Builds a view, ordering `items` by the cart's item list.
    ///
    /// Lines the cart row does not list are dropped.
    pub fn new(cart: Cart, items: Vec<CartItem>) -> Self {
        let mut ordered = Vec::with_capacity(cart.item_ids.len());
        for id in &cart.item_ids {
            if let Some(item) = items.iter().find(|i| i.id == *id) {
                ordered.push(item.clone());
            }
        }
        Self {
            cart,
            items: ordered,
        }
    }

    pub fn id(&self) -> CartId {
        self.cart.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.cart.owner_id
    }

    pub fn total_price(&self) -> Money {
        self.cart.total_price
    }

    /// Number of distinct lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of quantities over all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Returns the line for a product, if any.
    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }
}
