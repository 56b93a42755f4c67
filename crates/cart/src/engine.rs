//! The cart consistency engine.
//!
//! Every mutation of a cart runs under that cart's lock and ends in a single
//! [`CartStore::commit`], so the lines and the running total always change
//! together. Before committing, the prospective state is checked with
//! [`invariant::check`].

use std::time::Duration;

use cart_store::{
    Cart, CartChangeset, CartId, CartItem, CartStore, CartStoreExt, MAX_LINE_QUANTITY, Money,
    OwnerId, ProductId, StoreError,
};

use crate::catalog::{Product, ProductCatalog};
use crate::error::{CartError, Result};
use crate::invariant;
use crate::lock::{KeyedGuard, KeyedLocks, LockTimeout};
use crate::pricing::Discount;
use crate::view::CartView;

/// Default upper bound on waiting for a cart lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Addresses a cart either through its owner or directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartRef {
    Owner(OwnerId),
    Id(CartId),
}

impl From<OwnerId> for CartRef {
    fn from(owner_id: OwnerId) -> Self {
        CartRef::Owner(owner_id)
    }
}

impl From<CartId> for CartRef {
    fn from(cart_id: CartId) -> Self {
        CartRef::Id(cart_id)
    }
}

impl std::fmt::Display for CartRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartRef::Owner(owner_id) => write!(f, "owner:{owner_id}"),
            CartRef::Id(cart_id) => write!(f, "cart:{cart_id}"),
        }
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an operation waits for a cart (or owner) lock before failing
    /// with [`CartError::LockTimeout`].
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// Owns every cart-mutating operation.
///
/// Operations on the same cart are serialized through a per-cart lock;
/// operations on different carts never wait on each other. Cart creation is
/// serialized per owner so that an owner ends up with exactly one cart.
///
/// Catalog reads (price and stock) are point-in-time snapshots. The stock
/// check in [`Self::add_item`] and [`Self::adjust_quantity`] is an admission
/// check only: nothing is reserved and nothing is decremented.
pub struct CartConsistencyEngine<S, C>
where
    S: CartStore,
    C: ProductCatalog,
{
    store: S,
    catalog: C,
    config: EngineConfig,
    cart_locks: KeyedLocks<CartId>,
    owner_locks: KeyedLocks<OwnerId>,
}

impl<S, C> CartConsistencyEngine<S, C>
where
    S: CartStore,
    C: ProductCatalog,
{
    /// Creates an engine with the default configuration.
    pub fn new(store: S, catalog: C) -> Self {
        Self::with_config(store, catalog, EngineConfig::default())
    }

    pub fn with_config(store: S, catalog: C, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            config,
            cart_locks: KeyedLocks::new(),
            owner_locks: KeyedLocks::new(),
        }
    }

    /// Returns a reference to the underlying cart store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a reference to the product catalog.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of carts whose lock is currently held or awaited.
    pub fn active_locks(&self) -> usize {
        self.cart_locks.active_keys()
    }

    /// Takes the lock of a cart, waiting at most the configured timeout.
    ///
    /// Engine operations take this lock themselves. Holding the guard keeps
    /// every engine operation on the cart waiting.
    pub async fn lock_cart(&self, cart_id: CartId) -> Result<KeyedGuard<CartId>> {
        self.cart_locks
            .acquire(cart_id, self.config.lock_timeout)
            .await
            .map_err(lock_timed_out)
    }

    /// Returns the owner's cart, creating an empty one if none exists.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_cart(&self, owner_id: OwnerId) -> Result<Cart> {
        if let Some(cart) = self.store.get_by_owner(owner_id).await? {
            return Ok(cart);
        }

        let _guard = self
            .owner_locks
            .acquire(owner_id, self.config.lock_timeout)
            .await
            .map_err(lock_timed_out)?;

        // Another caller may have created it while we waited
        if let Some(cart) = self.store.get_by_owner(owner_id).await? {
            return Ok(cart);
        }

        match self.store.save(Cart::new(owner_id)).await {
            Ok(cart) => {
                metrics::counter!("cart_mutations_total", "op" => "create_cart").increment(1);
                tracing::info!(cart_id = %cart.id, "cart created");
                Ok(cart)
            }
            // Created through another engine sharing the store
            Err(StoreError::DuplicateOwner(_)) => self
                .store
                .get_by_owner(owner_id)
                .await?
                .ok_or_else(|| CartError::cart_not_found(owner_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a cart with its lines.
    pub async fn get_cart(&self, cart_id: CartId) -> Result<CartView> {
        let (cart, items) = self.load(cart_id).await?;
        Ok(CartView::new(cart, items))
    }

    /// Returns the owner's cart with its lines, creating the cart if needed.
    pub async fn cart_for_owner(&self, owner_id: OwnerId) -> Result<CartView> {
        let cart = self.resolve_cart(owner_id).await?;
        self.get_cart(cart.id).await
    }

    /// Returns a cart only if `owner_id` owns it.
    pub async fn get_owned_cart(&self, owner_id: OwnerId, cart_id: CartId) -> Result<CartView> {
        let cart = self.authorize(owner_id, cart_id).await?;
        let items = self.store.get_items(cart.id).await?;
        Ok(CartView::new(cart, items))
    }

    /// Checks that `owner_id` owns the cart.
    pub async fn authorize(&self, owner_id: OwnerId, cart_id: CartId) -> Result<Cart> {
        let cart = self
            .store
            .get(cart_id)
            .await?
            .ok_or_else(|| CartError::cart_not_found(cart_id))?;

        if cart.owner_id != owner_id {
            tracing::warn!(%owner_id, %cart_id, "cart access denied");
            return Err(CartError::Unauthorized { owner_id, cart_id });
        }
        Ok(cart)
    }

    /// Returns every cart with its lines.
    pub async fn list_carts(&self) -> Result<Vec<CartView>> {
        let carts = self.store.list().await?;
        let mut views = Vec::with_capacity(carts.len());
        for cart in carts {
            let items = self.store.get_items(cart.id).await?;
            views.push(CartView::new(cart, items));
        }
        Ok(views)
    }

    /// Adds a new line for a product.
    ///
    /// Fails with `AlreadyInCart` if the cart already holds the product,
    /// `Unavailable` on zero stock and `InsufficientStock` if `quantity`
    /// exceeds the stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartView> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(format!(
                "cannot add zero units of {product_id}"
            )));
        }
        check_line_limit(product_id, quantity)?;

        let _guard = self.lock_cart(cart_id).await?;
        let (cart, mut items) = self.load(cart_id).await?;
        let product = self.product(product_id).await?;

        if items.iter().any(|i| &i.product_id == product_id) {
            return Err(CartError::AlreadyInCart {
                cart_id,
                product_id: product_id.clone(),
            });
        }
        if !product.is_available() {
            return Err(CartError::Unavailable(product_id.clone()));
        }
        if quantity > product.stock {
            return Err(CartError::InsufficientStock {
                product_id: product_id.clone(),
                requested: u64::from(quantity),
                available: product.stock,
            });
        }

        let item = snapshot_line(cart_id, &product, quantity);
        let total = add_line(cart.total_price, &item)?;
        let changeset = CartChangeset::for_cart(&cart).upsert(item.clone());
        items.push(item);

        let view = self
            .commit("add_item", &cart, total, &items, changeset)
            .await?;
        tracing::info!(total = %view.total_price(), "item added");
        Ok(view)
    }

    /// Moves the quantity of a line by `delta`.
    ///
    /// A result of zero deletes the line. Otherwise the line is re-priced at
    /// the catalog's current special price, and the total moves by the
    /// difference between the new and the old line contribution.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_quantity(
        &self,
        cart: CartRef,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<CartView> {
        let cart_id = self.cart_id_of(cart).await?;
        let _guard = self.lock_cart(cart_id).await?;
        let (cart, mut items) = self.load(cart_id).await?;

        let index = items
            .iter()
            .position(|i| &i.product_id == product_id)
            .ok_or_else(|| CartError::item_not_found(cart_id, product_id))?;
        let current = items[index].clone();

        let new_quantity = i64::from(current.quantity)
            .checked_add(delta)
            .filter(|q| *q >= 0)
            .ok_or_else(|| {
                CartError::InvalidQuantity(format!(
                    "quantity of {product_id} is {}, cannot change it by {delta}",
                    current.quantity
                ))
            })?;

        if new_quantity == 0 {
            items.remove(index);
            let total = sub_line(cart.total_price, &current)?;
            let changeset = CartChangeset::for_cart(&cart).delete(current.id);
            let view = self
                .commit("adjust_quantity", &cart, total, &items, changeset)
                .await?;
            tracing::info!(total = %view.total_price(), "line dropped to zero and removed");
            return Ok(view);
        }

        let product = self.product(product_id).await?;
        if delta > 0 && new_quantity > i64::from(product.stock) {
            return Err(CartError::InsufficientStock {
                product_id: product_id.clone(),
                requested: new_quantity.unsigned_abs(),
                available: product.stock,
            });
        }
        let quantity = u32::try_from(new_quantity)
            .ok()
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(|| {
                CartError::InvalidQuantity(format!("quantity {new_quantity} is out of range"))
            })?;

        let updated = CartItem {
            quantity,
            product_price: product.special_price,
            discount_bp: product.discount.basis_points(),
            ..current.clone()
        };
        let total = add_line(sub_line(cart.total_price, &current)?, &updated)?;
        items[index] = updated.clone();
        let changeset = CartChangeset::for_cart(&cart).upsert(updated);

        let view = self
            .commit("adjust_quantity", &cart, total, &items, changeset)
            .await?;
        tracing::info!(quantity, total = %view.total_price(), "quantity adjusted");
        Ok(view)
    }

    /// Deletes the line for a product.
    ///
    /// Removing a product that is not in the cart fails with `NotFound`, also
    /// when it was removed a moment ago.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: CartId, product_id: &ProductId) -> Result<CartView> {
        let _guard = self.lock_cart(cart_id).await?;
        let (cart, items) = self.load(cart_id).await?;

        let view = self
            .drop_line("remove_item", cart, items, product_id)
            .await?
            .ok_or_else(|| CartError::item_not_found(cart_id, product_id))?;
        tracing::info!(total = %view.total_price(), "item removed");
        Ok(view)
    }

    /// Replaces every line of the owner's cart, creating the cart if needed.
    ///
    /// All products are looked up before anything changes; one missing
    /// product aborts the whole batch. When a product is listed more than
    /// once, the last quantity wins. The total is recomputed from scratch.
    /// Stock is not checked on this path.
    #[tracing::instrument(skip(self, entries), fields(lines = entries.len()))]
    pub async fn replace_cart_contents(
        &self,
        owner_id: OwnerId,
        entries: Vec<(ProductId, u32)>,
    ) -> Result<CartView> {
        let mut wanted: Vec<(ProductId, u32)> = Vec::with_capacity(entries.len());
        for (product_id, quantity) in entries {
            if quantity == 0 {
                return Err(CartError::InvalidQuantity(format!(
                    "cannot put zero units of {product_id} in a cart"
                )));
            }
            check_line_limit(&product_id, quantity)?;
            match wanted.iter_mut().find(|(id, _)| *id == product_id) {
                Some(entry) => entry.1 = quantity,
                None => wanted.push((product_id, quantity)),
            }
        }

        let mut products = Vec::with_capacity(wanted.len());
        let mut total = Money::zero();
        for (product_id, quantity) in &wanted {
            let product = self.product(product_id).await?;
            total = product
                .special_price
                .checked_times(*quantity)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| amount_overflow(product_id))?;
            products.push((product, *quantity));
        }

        let cart_id = self.resolve_cart(owner_id).await?.id;
        let _guard = self.lock_cart(cart_id).await?;
        let cart = self
            .store
            .get(cart_id)
            .await?
            .ok_or_else(|| CartError::cart_not_found(cart_id))?;

        let items: Vec<CartItem> = products
            .iter()
            .map(|(product, quantity)| snapshot_line(cart_id, product, *quantity))
            .collect();
        let changeset = items
            .iter()
            .cloned()
            .fold(CartChangeset::for_cart(&cart).clear_items(), CartChangeset::upsert);

        let view = self
            .commit("replace_cart_contents", &cart, total, &items, changeset)
            .await?;
        tracing::info!(%cart_id, total = %view.total_price(), "cart contents replaced");
        Ok(view)
    }

    /// Re-prices the line for a product at a new special price.
    ///
    /// Returns `None` when the cart no longer holds the product.
    #[tracing::instrument(skip(self))]
    pub async fn reprice_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        special_price: Money,
        discount: Discount,
    ) -> Result<Option<CartView>> {
        let _guard = self.lock_cart(cart_id).await?;
        let (cart, mut items) = self.load(cart_id).await?;

        let Some(index) = items.iter().position(|i| &i.product_id == product_id) else {
            return Ok(None);
        };
        let current = items[index].clone();
        if current.product_price == special_price
            && current.discount_bp == discount.basis_points()
        {
            return Ok(Some(CartView::new(cart, items)));
        }

        let updated = CartItem {
            product_price: special_price,
            discount_bp: discount.basis_points(),
            ..current.clone()
        };
        let total = add_line(sub_line(cart.total_price, &current)?, &updated)?;
        items[index] = updated.clone();
        let changeset = CartChangeset::for_cart(&cart).upsert(updated);

        let view = self
            .commit("reprice_item", &cart, total, &items, changeset)
            .await?;
        tracing::debug!(total = %view.total_price(), "line re-priced");
        Ok(Some(view))
    }

    /// Deletes the line for a product that left the catalog.
    ///
    /// Returns `None` when the cart no longer holds the product.
    #[tracing::instrument(skip(self))]
    pub async fn evict_product(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
    ) -> Result<Option<CartView>> {
        let _guard = self.lock_cart(cart_id).await?;
        let (cart, items) = self.load(cart_id).await?;
        self.drop_line("evict_product", cart, items, product_id)
            .await
    }

    async fn drop_line(
        &self,
        op: &'static str,
        cart: Cart,
        mut items: Vec<CartItem>,
        product_id: &ProductId,
    ) -> Result<Option<CartView>> {
        let Some(index) = items.iter().position(|i| &i.product_id == product_id) else {
            return Ok(None);
        };
        let removed = items.remove(index);
        let total = sub_line(cart.total_price, &removed)?;
        let changeset = CartChangeset::for_cart(&cart).delete(removed.id);

        self.commit(op, &cart, total, &items, changeset)
            .await
            .map(Some)
    }

    async fn cart_id_of(&self, cart: CartRef) -> Result<CartId> {
        match cart {
            CartRef::Id(cart_id) => Ok(cart_id),
            CartRef::Owner(owner_id) => self
                .store
                .get_by_owner(owner_id)
                .await?
                .map(|cart| cart.id)
                .ok_or_else(|| CartError::cart_not_found(cart)),
        }
    }

    async fn load(&self, cart_id: CartId) -> Result<(Cart, Vec<CartItem>)> {
        self.store
            .load_with_items(cart_id)
            .await?
            .ok_or_else(|| CartError::cart_not_found(cart_id))
    }

    async fn product(&self, product_id: &ProductId) -> Result<Product> {
        self.catalog
            .get(product_id)
            .await?
            .ok_or_else(|| CartError::product_not_found(product_id))
    }

    /// Checks the prospective state and commits it in one changeset.
    async fn commit(
        &self,
        op: &'static str,
        cart: &Cart,
        total: Money,
        items: &[CartItem],
        changeset: CartChangeset,
    ) -> Result<CartView> {
        invariant::check(cart.id, total, items)?;

        let committed = self.store.commit(changeset.total_price(total)).await?;
        metrics::counter!("cart_mutations_total", "op" => op).increment(1);

        Ok(CartView::new(committed, items.to_vec()))
    }
}

fn snapshot_line(cart_id: CartId, product: &Product, quantity: u32) -> CartItem {
    CartItem::new(
        cart_id,
        product.id.clone(),
        quantity,
        product.special_price,
        product.discount.basis_points(),
    )
}

fn check_line_limit(product_id: &ProductId, quantity: u32) -> Result<()> {
    if quantity > MAX_LINE_QUANTITY {
        return Err(CartError::InvalidQuantity(format!(
            "{quantity} units of {product_id} is above the maximum of {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

/// `total` plus the contribution of `item`, failing instead of overflowing.
fn add_line(total: Money, item: &CartItem) -> Result<Money> {
    item.line_total()
        .and_then(|line| total.checked_add(line))
        .ok_or_else(|| amount_overflow(&item.product_id))
}

fn sub_line(total: Money, item: &CartItem) -> Result<Money> {
    item.line_total()
        .and_then(|line| total.checked_sub(line))
        .ok_or_else(|| amount_overflow(&item.product_id))
}

fn amount_overflow(product_id: &ProductId) -> CartError {
    tracing::warn!(%product_id, "cart amount out of range");
    CartError::AmountOverflow {
        product_id: product_id.clone(),
    }
}

fn lock_timed_out(err: LockTimeout) -> CartError {
    metrics::counter!("cart_lock_timeouts_total").increment(1);
    tracing::warn!(key = %err.key, waited_ms = err.waited.as_millis() as u64, "lock wait timed out");
    CartError::LockTimeout(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryProductCatalog;
    use cart_store::InMemoryCartStore;

    type Engine = CartConsistencyEngine<InMemoryCartStore, InMemoryProductCatalog>;

    async fn setup() -> (Engine, InMemoryProductCatalog) {
        let catalog = InMemoryProductCatalog::new();
        catalog
            .upsert(Product::new(
                "SKU-001",
                "Widget",
                Money::from_units(10),
                Discount::NONE,
                5,
            ))
            .await
            .unwrap();
        catalog
            .upsert(Product::new(
                "SKU-002",
                "Gadget",
                Money::from_units(4),
                Discount::percent(25),
                10,
            ))
            .await
            .unwrap();
        let engine = CartConsistencyEngine::new(InMemoryCartStore::new(), catalog.clone());
        (engine, catalog)
    }

    fn sku(id: &str) -> ProductId {
        ProductId::new(id)
    }

    #[tokio::test]
    async fn resolve_cart_creates_once() {
        let (engine, _) = setup().await;
        let owner = OwnerId::new();

        let first = engine.resolve_cart(owner).await.unwrap();
        let second = engine.resolve_cart(owner).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.total_price, Money::zero());
        assert_eq!(engine.store().cart_count().await, 1);
    }

    #[tokio::test]
    async fn add_item_snapshots_special_price() {
        let (engine, _) = setup().await;
        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();

        let view = engine.add_item(cart.id, &sku("SKU-002"), 2).await.unwrap();

        let line = view.item(&sku("SKU-002")).unwrap();
        assert_eq!(line.product_price, Money::from_units(3));
        assert_eq!(line.discount_bp, 2500);
        assert_eq!(view.total_price(), Money::from_units(6));
    }

    #[tokio::test]
    async fn add_item_rejects_zero_quantity_and_unknown_cart() {
        let (engine, _) = setup().await;

        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();
        assert!(matches!(
            engine.add_item(cart.id, &sku("SKU-001"), 0).await,
            Err(CartError::InvalidQuantity(_))
        ));

        let err = engine
            .add_item(CartId::new(), &sku("SKU-001"), 1)
            .await
            .unwrap_err();
        assert!(err.is_not_found(crate::error::Entity::Cart));
    }

    #[tokio::test]
    async fn adjust_quantity_refreshes_stale_snapshot() {
        let (engine, catalog) = setup().await;
        let owner = OwnerId::new();
        let cart = engine.resolve_cart(owner).await.unwrap();
        engine.add_item(cart.id, &sku("SKU-001"), 2).await.unwrap();

        // Price moves without reconciliation running
        catalog
            .update_product(
                &sku("SKU-001"),
                crate::catalog::ProductUpdate {
                    price: Some(Money::from_units(12)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = engine
            .adjust_quantity(CartRef::Owner(owner), &sku("SKU-001"), 1)
            .await
            .unwrap();

        let line = view.item(&sku("SKU-001")).unwrap();
        assert_eq!(line.quantity, 3);
        assert_eq!(line.product_price, Money::from_units(12));
        assert_eq!(view.total_price(), Money::from_units(36));
    }

    #[tokio::test]
    async fn adjust_quantity_requires_existing_cart_for_owner() {
        let (engine, _) = setup().await;
        let err = engine
            .adjust_quantity(OwnerId::new().into(), &sku("SKU-001"), 1)
            .await
            .unwrap_err();
        assert!(err.is_not_found(crate::error::Entity::Cart));
    }

    #[tokio::test]
    async fn reprice_and_evict_skip_missing_lines() {
        let (engine, _) = setup().await;
        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();

        let repriced = engine
            .reprice_item(cart.id, &sku("SKU-001"), Money::from_units(1), Discount::NONE)
            .await
            .unwrap();
        assert!(repriced.is_none());

        let evicted = engine.evict_product(cart.id, &sku("SKU-001")).await.unwrap();
        assert!(evicted.is_none());
    }

    #[tokio::test]
    async fn operations_time_out_while_cart_is_locked() {
        let catalog = InMemoryProductCatalog::new();
        let engine = CartConsistencyEngine::with_config(
            InMemoryCartStore::new(),
            catalog,
            EngineConfig::default().with_lock_timeout(Duration::from_millis(20)),
        );
        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();

        let _held = engine.lock_cart(cart.id).await.unwrap();
        let result = engine.remove_item(cart.id, &sku("SKU-001")).await;
        assert!(matches!(result, Err(CartError::LockTimeout(_))));
    }

    #[tokio::test]
    async fn add_item_rejects_line_total_out_of_range() {
        let (engine, catalog) = setup().await;
        catalog
            .upsert(Product::new(
                "SKU-BIG",
                "Yacht",
                Money::from_cents(i64::MAX / 2),
                Discount::NONE,
                10,
            ))
            .await
            .unwrap();
        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();

        let result = engine.add_item(cart.id, &sku("SKU-BIG"), 3).await;

        assert!(matches!(result, Err(CartError::AmountOverflow { .. })));
        let view = engine.get_cart(cart.id).await.unwrap();
        assert!(view.items.is_empty());
        assert_eq!(view.total_price(), Money::zero());
    }

    #[tokio::test]
    async fn add_item_rejects_quantity_above_line_limit() {
        let (engine, catalog) = setup().await;
        catalog
            .upsert(Product::new(
                "SKU-BULK",
                "Screw",
                Money::from_cents(1),
                Discount::NONE,
                u32::MAX,
            ))
            .await
            .unwrap();
        let cart = engine.resolve_cart(OwnerId::new()).await.unwrap();

        let result = engine
            .add_item(cart.id, &sku("SKU-BULK"), MAX_LINE_QUANTITY + 1)
            .await;
        assert!(matches!(result, Err(CartError::InvalidQuantity(_))));

        engine
            .add_item(cart.id, &sku("SKU-BULK"), MAX_LINE_QUANTITY)
            .await
            .unwrap();
        let result = engine
            .adjust_quantity(CartRef::Id(cart.id), &sku("SKU-BULK"), 1)
            .await;
        assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
        let view = engine.get_cart(cart.id).await.unwrap();
        assert_eq!(view.item(&sku("SKU-BULK")).unwrap().quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn cart_ref_conversions() {
        let owner = OwnerId::new();
        let cart_id = CartId::new();
        assert_eq!(CartRef::from(owner), CartRef::Owner(owner));
        assert_eq!(CartRef::from(cart_id), CartRef::Id(cart_id));
        assert!(CartRef::Owner(owner).to_string().starts_with("owner:"));
    }
}
