use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    Cart, CartId, CartItem, CartItemId, MAX_LINE_QUANTITY, Money, OwnerId, ProductId, Result,
    Version,
};

/// A set of changes to one cart that must be applied all together or not at all.
///
/// The store derives the new item order itself: cleared items go first,
/// deleted ids are dropped, and upserted lines that are new to the cart are
/// appended in the order given.
#[derive(Debug, Clone)]
pub struct CartChangeset {
    /// The cart being changed.
    pub cart_id: CartId,

    /// Version the changeset was computed against. The commit fails with
    /// `ConcurrencyConflict` when the stored cart has moved on.
    pub expected_version: Version,

    /// New running total of the cart.
    pub total_price: Money,

    /// Removes every existing line before applying deletes and upserts.
    pub clear_items: bool,

    /// Lines to insert or overwrite (matched by item id).
    pub upserts: Vec<CartItem>,

    /// Lines to delete.
    pub deletes: Vec<CartItemId>,
}

impl CartChangeset {
    /// Starts a changeset against the given cart state, keeping its total.
    pub fn for_cart(cart: &Cart) -> Self {
        Self {
            cart_id: cart.id,
            expected_version: cart.version,
            total_price: cart.total_price,
            clear_items: false,
            upserts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Sets the new total.
    pub fn total_price(mut self, total: Money) -> Self {
        self.total_price = total;
        self
    }

    /// Wipes all existing lines first.
    pub fn clear_items(mut self) -> Self {
        self.clear_items = true;
        self
    }

    /// Inserts or overwrites a line.
    pub fn upsert(mut self, item: CartItem) -> Self {
        self.upserts.push(item);
        self
    }

    /// Deletes a line.
    pub fn delete(mut self, item_id: CartItemId) -> Self {
        self.deletes.push(item_id);
        self
    }
}

/// Core trait for cart persistence.
///
/// All operations are keyed and single-record atomic, except
/// [`CartStore::commit`], which applies a whole [`CartChangeset`] atomically.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Retrieves a cart by id.
    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Retrieves the cart owned by a principal.
    async fn get_by_owner(&self, owner_id: OwnerId) -> Result<Option<Cart>>;

    /// Retrieves every cart.
    async fn list(&self) -> Result<Vec<Cart>>;

    /// Inserts a new cart or overwrites the row of an existing one.
    ///
    /// Fails with `DuplicateOwner` if another cart already belongs to the owner.
    async fn save(&self, cart: Cart) -> Result<Cart>;

    /// Retrieves the lines of a cart in insertion order.
    async fn get_items(&self, cart_id: CartId) -> Result<Vec<CartItem>>;

    /// Inserts or overwrites a single line.
    ///
    /// Fails with `DuplicateItem` if a different line already holds the product.
    async fn upsert_item(&self, item: CartItem) -> Result<()>;

    /// Deletes a single line. Returns false if it did not exist.
    async fn delete_item(&self, item_id: CartItemId) -> Result<bool>;

    /// Deletes every line of a cart. Returns the number of lines removed.
    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64>;

    /// Retrieves every line, across all carts, that references a product.
    async fn find_items_by_product(&self, product_id: &ProductId) -> Result<Vec<CartItem>>;

    /// Retrieves every cart holding a line for a product.
    async fn find_carts_by_product(&self, product_id: &ProductId) -> Result<Vec<Cart>>;

    /// Applies a changeset atomically and returns the committed cart.
    ///
    /// Either the new total and every line change become visible together,
    /// or nothing changes.
    async fn commit(&self, changeset: CartChangeset) -> Result<Cart>;
}

/// Extension trait providing convenience methods for cart stores.
#[async_trait]
pub trait CartStoreExt: CartStore {
    /// Finds the line holding a product in a cart.
    async fn find_item(&self, cart_id: CartId, product_id: &ProductId) -> Result<Option<CartItem>> {
        let items = self.get_items(cart_id).await?;
        Ok(items.into_iter().find(|i| &i.product_id == product_id))
    }

    /// Loads a cart together with its lines.
    async fn load_with_items(&self, cart_id: CartId) -> Result<Option<(Cart, Vec<CartItem>)>> {
        match self.get(cart_id).await? {
            Some(cart) => {
                let items = self.get_items(cart_id).await?;
                Ok(Some((cart, items)))
            }
            None => Ok(None),
        }
    }
}

// Blanket implementation for all CartStore implementations
impl<T: CartStore + ?Sized> CartStoreExt for T {}

/// Error returned when a changeset is malformed.
#[derive(Debug, Clone)]
pub struct ChangesetValidationError {
    pub message: String,
}

impl std::fmt::Display for ChangesetValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Changeset validation error: {}", self.message)
    }
}

impl std::error::Error for ChangesetValidationError {}

/// Validates a changeset before it is committed.
pub fn validate_changeset(
    changeset: &CartChangeset,
) -> std::result::Result<(), ChangesetValidationError> {
    if changeset.total_price.is_negative() {
        return Err(ChangesetValidationError {
            message: format!("Cart total cannot be negative: {}", changeset.total_price),
        });
    }

    let mut products = HashSet::new();
    for item in &changeset.upserts {
        if item.cart_id != changeset.cart_id {
            return Err(ChangesetValidationError {
                message: format!(
                    "Line {} belongs to cart {}, not {}",
                    item.id, item.cart_id, changeset.cart_id
                ),
            });
        }
        if item.quantity == 0 {
            return Err(ChangesetValidationError {
                message: format!("Line for product {} has zero quantity", item.product_id),
            });
        }
        if item.quantity > MAX_LINE_QUANTITY {
            return Err(ChangesetValidationError {
                message: format!(
                    "Line for product {} has quantity {}, above the maximum of {MAX_LINE_QUANTITY}",
                    item.product_id, item.quantity
                ),
            });
        }
        if item.line_total().is_none() {
            return Err(ChangesetValidationError {
                message: format!("Line total for product {} is out of range", item.product_id),
            });
        }
        if !products.insert(&item.product_id) {
            return Err(ChangesetValidationError {
                message: format!("Product {} appears twice in one changeset", item.product_id),
            });
        }
    }

    if changeset
        .upserts
        .iter()
        .any(|item| changeset.deletes.contains(&item.id))
    {
        return Err(ChangesetValidationError {
            message: "A line cannot be upserted and deleted in one changeset".to_string(),
        });
    }

    Ok(())
}
