//! Integration tests for the cart consistency engine.

use std::sync::Arc;
use std::time::Duration;

use cart::{
    CartConsistencyEngine, CartError, CartId, CartRef, Discount, Entity, InMemoryProductCatalog,
    Money, OwnerId, Product, ProductId, invariant,
};
use cart_store::{CartStore, CartStoreExt, InMemoryCartStore};
use futures_util::future::join_all;

type TestEngine = CartConsistencyEngine<InMemoryCartStore, InMemoryProductCatalog>;

struct TestHarness {
    engine: Arc<TestEngine>,
    catalog: InMemoryProductCatalog,
    store: InMemoryCartStore,
}

impl TestHarness {
    async fn new() -> Self {
        let store = InMemoryCartStore::new();
        let catalog = InMemoryProductCatalog::new();

        for (id, name, cents, discount, stock) in [
            ("SKU-001", "Widget", 1000, 0, 10),
            ("SKU-002", "Gadget", 2500, 20, 3),
            ("SKU-003", "Doohickey", 399, 10, 100),
            ("SKU-OUT", "Sold out", 500, 0, 0),
        ] {
            catalog
                .upsert(Product::new(
                    id,
                    name,
                    Money::from_cents(cents),
                    Discount::percent(discount),
                    stock,
                ))
                .await
                .unwrap();
        }

        let engine = Arc::new(CartConsistencyEngine::new(store.clone(), catalog.clone()));
        Self {
            engine,
            catalog,
            store,
        }
    }

    async fn cart(&self) -> (OwnerId, CartId) {
        let owner = OwnerId::new();
        let cart = self.engine.resolve_cart(owner).await.unwrap();
        (owner, cart.id)
    }

    /// Asserts the stored cart satisfies the total and uniqueness invariants.
    async fn assert_consistent(&self, cart_id: CartId) {
        let (cart, items) = self.store.load_with_items(cart_id).await.unwrap().unwrap();
        invariant::check(cart_id, cart.total_price, &items).unwrap();
        assert_eq!(cart.item_ids.len(), items.len());
    }
}

fn sku(id: &str) -> ProductId {
    ProductId::new(id)
}

#[tokio::test]
async fn total_matches_lines_after_every_operation() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;

    h.engine.add_item(cart_id, &sku("SKU-001"), 2).await.unwrap();
    h.assert_consistent(cart_id).await;

    h.engine.add_item(cart_id, &sku("SKU-002"), 1).await.unwrap();
    h.assert_consistent(cart_id).await;

    h.engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-001"), 3)
        .await
        .unwrap();
    h.assert_consistent(cart_id).await;

    h.engine
        .adjust_quantity(CartRef::Owner(owner), &sku("SKU-002"), 2)
        .await
        .unwrap();
    h.assert_consistent(cart_id).await;

    h.engine.remove_item(cart_id, &sku("SKU-001")).await.unwrap();
    h.assert_consistent(cart_id).await;

    h.engine
        .replace_cart_contents(owner, vec![(sku("SKU-003"), 7), (sku("SKU-001"), 1)])
        .await
        .unwrap();
    h.assert_consistent(cart_id).await;

    h.engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-003"), -7)
        .await
        .unwrap();
    h.assert_consistent(cart_id).await;

    let view = h.engine.get_cart(cart_id).await.unwrap();
    assert_eq!(view.item_count(), 1);
    assert_eq!(view.total_price(), Money::from_cents(1000));
}

#[tokio::test]
async fn add_item_fills_line_and_total() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    let view = h.engine.add_item(cart_id, &sku("SKU-002"), 2).await.unwrap();

    // 25.00 less 20% is 20.00
    let line = view.item(&sku("SKU-002")).unwrap();
    assert_eq!(line.quantity, 2);
    assert_eq!(line.product_price, Money::from_cents(2000));
    assert_eq!(line.discount_bp, 2000);
    assert_eq!(view.total_price(), Money::from_cents(4000));
}

#[tokio::test]
async fn add_item_for_unknown_product_is_not_found() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    let err = h
        .engine
        .add_item(cart_id, &sku("SKU-NOPE"), 1)
        .await
        .unwrap_err();
    assert!(err.is_not_found(Entity::Product));
}

#[tokio::test]
async fn adding_same_product_twice_conflicts() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    h.engine.add_item(cart_id, &sku("SKU-001"), 1).await.unwrap();
    let result = h.engine.add_item(cart_id, &sku("SKU-001"), 1).await;

    assert!(matches!(result, Err(CartError::AlreadyInCart { .. })));
    h.assert_consistent(cart_id).await;
}

#[tokio::test]
async fn add_item_with_zero_stock_is_unavailable() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    let result = h.engine.add_item(cart_id, &sku("SKU-OUT"), 1).await;
    assert!(matches!(result, Err(CartError::Unavailable(id)) if id == sku("SKU-OUT")));
}

#[tokio::test]
async fn stock_boundary_on_add() {
    let h = TestHarness::new().await;
    let (_, first_cart) = h.cart().await;
    let (_, second_cart) = h.cart().await;

    // SKU-002 has 3 units in stock
    assert!(
        h.engine
            .add_item(first_cart, &sku("SKU-002"), 3)
            .await
            .is_ok()
    );

    let result = h.engine.add_item(second_cart, &sku("SKU-002"), 4).await;
    match result {
        Err(CartError::InsufficientStock {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 4);
            assert_eq!(available, 3);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
}

#[tokio::test]
async fn adjusting_to_zero_removes_line_and_contribution() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-001"), 4).await.unwrap();
    let before = h.engine.add_item(cart_id, &sku("SKU-003"), 2).await.unwrap();

    let after = h
        .engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-001"), -4)
        .await
        .unwrap();

    assert!(after.item(&sku("SKU-001")).is_none());
    assert_eq!(
        before.total_price().checked_sub(after.total_price()),
        Some(Money::from_cents(4 * 1000))
    );
    assert_eq!(h.store.item_count().await, 1);
}

#[tokio::test]
async fn adjusting_below_zero_is_invalid_quantity() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-001"), 1).await.unwrap();

    let result = h
        .engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-001"), -2)
        .await;

    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
    let view = h.engine.get_cart(cart_id).await.unwrap();
    assert_eq!(view.item(&sku("SKU-001")).unwrap().quantity, 1);
}

#[tokio::test]
async fn adjusting_past_stock_is_insufficient_stock() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-002"), 3).await.unwrap();

    let result = h
        .engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-002"), 1)
        .await;
    assert!(matches!(
        result,
        Err(CartError::InsufficientStock {
            requested: 4,
            available: 3,
            ..
        })
    ));

    // Decreasing is never limited by stock
    h.catalog.set_stock(&sku("SKU-002"), 0).await.unwrap();
    let view = h
        .engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-002"), -1)
        .await
        .unwrap();
    assert_eq!(view.item(&sku("SKU-002")).unwrap().quantity, 2);
}

#[tokio::test]
async fn adjusting_missing_line_is_not_found() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    let err = h
        .engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-001"), 1)
        .await
        .unwrap_err();
    assert!(err.is_not_found(Entity::CartItem));
}

#[tokio::test]
async fn removing_twice_fails_the_second_time() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-001"), 2).await.unwrap();

    let view = h.engine.remove_item(cart_id, &sku("SKU-001")).await.unwrap();
    assert_eq!(view.total_price(), Money::zero());

    let err = h
        .engine
        .remove_item(cart_id, &sku("SKU-001"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(Entity::CartItem));
}

#[tokio::test]
async fn reprice_moves_total_by_quantity_times_difference() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-001"), 3).await.unwrap();

    let view = h
        .engine
        .reprice_item(
            cart_id,
            &sku("SKU-001"),
            Money::from_cents(800),
            Discount::percent(20),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(view.total_price(), Money::from_cents(3000 - 600));
    let line = view.item(&sku("SKU-001")).unwrap();
    assert_eq!(line.product_price, Money::from_cents(800));
    assert_eq!(line.discount_bp, 2000);
    h.assert_consistent(cart_id).await;
}

#[tokio::test]
async fn replace_discards_previous_contents() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-003"), 5).await.unwrap();

    let view = h
        .engine
        .replace_cart_contents(owner, vec![(sku("SKU-001"), 2), (sku("SKU-002"), 1)])
        .await
        .unwrap();

    assert_eq!(view.id(), cart_id);
    assert_eq!(view.item_count(), 2);
    assert_eq!(view.item(&sku("SKU-001")).unwrap().quantity, 2);
    assert_eq!(view.item(&sku("SKU-002")).unwrap().quantity, 1);
    assert!(view.item(&sku("SKU-003")).is_none());
    assert_eq!(view.total_price(), Money::from_cents(2 * 1000 + 2000));
    assert_eq!(h.store.item_count().await, 2);
}

#[tokio::test]
async fn replace_creates_cart_and_ignores_stock() {
    let h = TestHarness::new().await;
    let owner = OwnerId::new();

    let view = h
        .engine
        .replace_cart_contents(owner, vec![(sku("SKU-OUT"), 50)])
        .await
        .unwrap();

    assert_eq!(view.owner_id(), owner);
    assert_eq!(view.total_price(), Money::from_cents(50 * 500));
}

#[tokio::test]
async fn replace_with_unknown_product_changes_nothing() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;
    let before = h.engine.add_item(cart_id, &sku("SKU-001"), 1).await.unwrap();

    let err = h
        .engine
        .replace_cart_contents(owner, vec![(sku("SKU-003"), 1), (sku("SKU-NOPE"), 1)])
        .await
        .unwrap_err();
    assert!(err.is_not_found(Entity::Product));

    let after = h.engine.get_cart(cart_id).await.unwrap();
    assert_eq!(after, before);

    // A failed batch for a new owner does not create a cart either
    let newcomer = OwnerId::new();
    assert!(
        h.engine
            .replace_cart_contents(newcomer, vec![(sku("SKU-NOPE"), 1)])
            .await
            .is_err()
    );
    assert!(h.store.get_by_owner(newcomer).await.unwrap().is_none());
}

#[tokio::test]
async fn replace_with_duplicate_products_keeps_last_quantity() {
    let h = TestHarness::new().await;
    let owner = OwnerId::new();

    let view = h
        .engine
        .replace_cart_contents(
            owner,
            vec![
                (sku("SKU-001"), 1),
                (sku("SKU-003"), 2),
                (sku("SKU-001"), 4),
            ],
        )
        .await
        .unwrap();

    assert_eq!(view.item_count(), 2);
    assert_eq!(view.item(&sku("SKU-001")).unwrap().quantity, 4);
    assert_eq!(view.total_price(), Money::from_cents(4 * 1000 + 2 * 359));
}

#[tokio::test]
async fn replace_with_zero_quantity_is_rejected() {
    let h = TestHarness::new().await;
    let result = h
        .engine
        .replace_cart_contents(OwnerId::new(), vec![(sku("SKU-001"), 0)])
        .await;
    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
}

#[tokio::test]
async fn foreign_owner_is_unauthorized() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;
    let stranger = OwnerId::new();

    assert!(h.engine.authorize(owner, cart_id).await.is_ok());
    assert!(matches!(
        h.engine.get_owned_cart(stranger, cart_id).await,
        Err(CartError::Unauthorized { .. })
    ));

    let err = h
        .engine
        .authorize(owner, CartId::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found(Entity::Cart));
}

#[tokio::test]
async fn list_carts_returns_every_cart_with_lines() {
    let h = TestHarness::new().await;
    let (_, a) = h.cart().await;
    let (_, b) = h.cart().await;
    h.engine.add_item(a, &sku("SKU-001"), 1).await.unwrap();
    h.engine.add_item(b, &sku("SKU-003"), 2).await.unwrap();
    h.engine.add_item(b, &sku("SKU-001"), 1).await.unwrap();

    let views = h.engine.list_carts().await.unwrap();
    assert_eq!(views.len(), 2);
    let lines: usize = views.iter().map(|v| v.item_count()).sum();
    assert_eq!(lines, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_of_same_product_admit_exactly_one() {
    let h = TestHarness::new().await;
    let (_, cart_id) = h.cart().await;

    let tasks = (0..16).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.add_item(cart_id, &sku("SKU-003"), 1).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CartError::AlreadyInCart { .. })))
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(conflicts, 15);

    h.assert_consistent(cart_id).await;
    assert_eq!(h.store.item_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;
    h.engine.add_item(cart_id, &sku("SKU-003"), 1).await.unwrap();

    let tasks = (0..20).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .adjust_quantity(CartRef::Owner(owner), &sku("SKU-003"), 1)
                .await
        })
    });
    for joined in join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    let view = h.engine.get_cart(cart_id).await.unwrap();
    assert_eq!(view.item(&sku("SKU-003")).unwrap().quantity, 21);
    assert_eq!(view.total_price(), Money::from_cents(21 * 359));
    h.assert_consistent(cart_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_mutations_create_one_cart() {
    let h = TestHarness::new().await;
    let owner = OwnerId::new();

    let tasks = (0..8).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.resolve_cart(owner).await.map(|cart| cart.id) })
    });
    let ids: Vec<CartId> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(h.store.cart_count().await, 1);
}

#[tokio::test]
async fn replace_with_overflowing_amount_fails_cleanly() {
    let h = TestHarness::new().await;
    h.catalog
        .upsert(Product::new(
            "SKU-BIG",
            "Mansion",
            Money::from_cents(10_000_000_000),
            Discount::NONE,
            1,
        ))
        .await
        .unwrap();
    let owner = OwnerId::new();

    let result = h
        .engine
        .replace_cart_contents(owner, vec![(sku("SKU-BIG"), 1_000_000_000)])
        .await;
    assert!(matches!(
        result,
        Err(CartError::AmountOverflow { ref product_id }) if product_id == &sku("SKU-BIG")
    ));
    assert!(h.store.get_by_owner(owner).await.unwrap().is_none());

    // The existing contents of a cart survive a rejected batch
    let (owner, cart_id) = h.cart().await;
    let before = h.engine.add_item(cart_id, &sku("SKU-001"), 2).await.unwrap();
    let result = h
        .engine
        .replace_cart_contents(
            owner,
            vec![(sku("SKU-001"), 1), (sku("SKU-BIG"), 1_000_000_000)],
        )
        .await;
    assert!(matches!(result, Err(CartError::AmountOverflow { .. })));
    assert_eq!(h.engine.get_cart(cart_id).await.unwrap(), before);
    h.assert_consistent(cart_id).await;
}

#[tokio::test]
async fn replace_with_quantity_above_line_limit_is_rejected() {
    let h = TestHarness::new().await;
    let owner = OwnerId::new();

    let result = h
        .engine
        .replace_cart_contents(owner, vec![(sku("SKU-003"), 3_000_000_000)])
        .await;

    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
    assert!(h.store.get_by_owner(owner).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_operations_leave_cart_untouched() {
    let h = TestHarness::new().await;
    let (owner, cart_id) = h.cart().await;
    let before = h.engine.add_item(cart_id, &sku("SKU-001"), 2).await.unwrap();

    let held = h.engine.lock_cart(cart_id).await.unwrap();

    // Caller gives up while the operation waits for the cart
    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        h.engine.add_item(cart_id, &sku("SKU-003"), 1),
    )
    .await;
    assert!(timed_out.is_err());

    // Task aborted while queued behind the holder
    let engine = h.engine.clone();
    let replace = tokio::spawn(async move {
        engine
            .replace_cart_contents(owner, vec![(sku("SKU-002"), 1)])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    replace.abort();
    assert!(replace.await.unwrap_err().is_cancelled());

    drop(held);
    assert_eq!(h.engine.active_locks(), 0);

    let after = h.engine.get_cart(cart_id).await.unwrap();
    assert_eq!(after, before);
    h.assert_consistent(cart_id).await;

    // The cart is usable again right away
    h.engine
        .adjust_quantity(CartRef::Id(cart_id), &sku("SKU-001"), 1)
        .await
        .unwrap();
    h.assert_consistent(cart_id).await;
}
