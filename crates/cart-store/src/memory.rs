use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Cart, CartId, CartItem, CartItemId, MAX_LINE_QUANTITY, OwnerId, ProductId, Result,
    StoreError,
    store::{CartChangeset, CartStore, validate_changeset},
};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    items: HashMap<CartItemId, CartItem>,
}

impl State {
    fn cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        self.carts
            .get_mut(&cart_id)
            .ok_or(StoreError::CartNotFound(cart_id))
    }

    fn touch(&mut self, cart_id: CartId) {
        if let Some(cart) = self.carts.get_mut(&cart_id) {
            cart.version = cart.version.next();
            cart.updated_at = Utc::now();
        }
    }

    fn check_unique_line(
        &self,
        cart: &Cart,
        item: &CartItem,
        ignore: &HashSet<CartItemId>,
    ) -> Result<()> {
        let clash = cart
            .item_ids
            .iter()
            .filter(|id| !ignore.contains(id))
            .filter_map(|id| self.items.get(id))
            .any(|existing| existing.product_id == item.product_id && existing.id != item.id);
        if clash {
            return Err(StoreError::DuplicateItem {
                cart_id: cart.id,
                product_id: item.product_id.clone(),
            });
        }
        Ok(())
    }

    /// Validates the whole changeset against current state, then applies it.
    /// No mutation happens unless every check passes.
    fn apply(&mut self, changeset: CartChangeset) -> Result<Cart> {
        let cart = self
            .carts
            .get(&changeset.cart_id)
            .ok_or(StoreError::CartNotFound(changeset.cart_id))?;

        if cart.version != changeset.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                cart_id: cart.id,
                expected: changeset.expected_version,
                actual: cart.version,
            });
        }

        let removed: HashSet<CartItemId> = if changeset.clear_items {
            cart.item_ids.iter().copied().collect()
        } else {
            changeset.deletes.iter().copied().collect()
        };
        let mut order: Vec<CartItemId> = cart
            .item_ids
            .iter()
            .filter(|id| !removed.contains(id))
            .copied()
            .collect();

        for item in &changeset.upserts {
            self.check_unique_line(cart, item, &removed)?;
            if !order.contains(&item.id) {
                order.push(item.id);
            }
        }

        for id in &removed {
            self.items.remove(id);
        }
        for id in &changeset.deletes {
            self.items.remove(id);
        }
        for item in changeset.upserts {
            self.items.insert(item.id, item);
        }

        let cart = self.cart_mut(changeset.cart_id)?;
        cart.total_price = changeset.total_price;
        cart.item_ids = order;
        cart.version = cart.version.next();
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }
}

/// In-memory cart store implementation for testing and single-node use.
///
/// Carts and lines live behind one lock so that a changeset commit is
/// observed atomically by readers.
#[derive(Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryCartStore {
    /// Creates a new empty in-memory cart store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of carts stored.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Returns the total number of lines stored across all carts.
    pub async fn item_count(&self) -> usize {
        self.state.read().await.items.len()
    }

    /// Clears all carts and lines.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.carts.clear();
        state.items.clear();
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn get_by_owner(&self, owner_id: OwnerId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .values()
            .find(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Cart>> {
        let state = self.state.read().await;
        let mut carts: Vec<_> = state.carts.values().cloned().collect();
        carts.sort_by_key(|c| c.created_at);
        Ok(carts)
    }

    async fn save(&self, cart: Cart) -> Result<Cart> {
        let mut state = self.state.write().await;

        if state
            .carts
            .values()
            .any(|c| c.owner_id == cart.owner_id && c.id != cart.id)
        {
            return Err(StoreError::DuplicateOwner(cart.owner_id));
        }

        // Line order belongs to the store; only the row fields are taken.
        let saved = match state.carts.get_mut(&cart.id) {
            Some(existing) => {
                existing.owner_id = cart.owner_id;
                existing.total_price = cart.total_price;
                existing.version = existing.version.next();
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let mut cart = cart;
                cart.item_ids.clear();
                state.carts.insert(cart.id, cart.clone());
                cart
            }
        };
        Ok(saved)
    }

    async fn get_items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let state = self.state.read().await;
        let Some(cart) = state.carts.get(&cart_id) else {
            return Ok(Vec::new());
        };
        Ok(cart
            .item_ids
            .iter()
            .filter_map(|id| state.items.get(id))
            .cloned()
            .collect())
    }

    async fn upsert_item(&self, item: CartItem) -> Result<()> {
        if item.quantity > MAX_LINE_QUANTITY {
            return Err(StoreError::InvalidChangeset(format!(
                "Quantity {} for product {} is above the maximum of {MAX_LINE_QUANTITY}",
                item.quantity, item.product_id
            )));
        }
        let mut state = self.state.write().await;
        let cart = state
            .carts
            .get(&item.cart_id)
            .ok_or(StoreError::CartNotFound(item.cart_id))?;
        state.check_unique_line(cart, &item, &HashSet::new())?;

        let cart_id = item.cart_id;
        let item_id = item.id;
        state.items.insert(item_id, item);
        let cart = state.cart_mut(cart_id)?;
        if !cart.item_ids.contains(&item_id) {
            cart.item_ids.push(item_id);
        }
        state.touch(cart_id);
        Ok(())
    }

    async fn delete_item(&self, item_id: CartItemId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(item) = state.items.remove(&item_id) else {
            return Ok(false);
        };
        if let Some(cart) = state.carts.get_mut(&item.cart_id) {
            cart.item_ids.retain(|id| *id != item_id);
        }
        state.touch(item.cart_id);
        Ok(true)
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64> {
        let mut state = self.state.write().await;
        let ids = std::mem::take(&mut state.cart_mut(cart_id)?.item_ids);
        for id in &ids {
            state.items.remove(id);
        }
        state.touch(cart_id);
        Ok(ids.len() as u64)
    }

    async fn find_items_by_product(&self, product_id: &ProductId) -> Result<Vec<CartItem>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|i| &i.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn find_carts_by_product(&self, product_id: &ProductId) -> Result<Vec<Cart>> {
        let state = self.state.read().await;
        let cart_ids: HashSet<CartId> = state
            .items
            .values()
            .filter(|i| &i.product_id == product_id)
            .map(|i| i.cart_id)
            .collect();
        let mut carts: Vec<_> = cart_ids
            .iter()
            .filter_map(|id| state.carts.get(id))
            .cloned()
            .collect();
        carts.sort_by_key(|c| c.created_at);
        Ok(carts)
    }

    #[tracing::instrument(skip(self, changeset), fields(cart_id = %changeset.cart_id))]
    async fn commit(&self, changeset: CartChangeset) -> Result<Cart> {
        validate_changeset(&changeset).map_err(|e| StoreError::InvalidChangeset(e.message))?;

        // No await point between validation against current state and the
        // writes, so a dropped caller never sees a partial commit.
        let mut state = self.state.write().await;
        state.apply(changeset)
    }
}
