use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Cart, CartId, CartItem, CartItemId, Money, OwnerId, ProductId, Result, StoreError, Version,
    store::{CartChangeset, CartStore, validate_changeset},
};

const CART_COLUMNS: &str = r#"
    SELECT c.id, c.owner_id, c.total_price_cents, c.version, c.created_at, c.updated_at,
           COALESCE(
               array_agg(i.id ORDER BY i.seq) FILTER (WHERE i.id IS NOT NULL),
               '{}'::uuid[]
           ) AS item_ids
    FROM carts c
    LEFT JOIN cart_items i ON i.cart_id = c.id
"#;

const ITEM_COLUMNS: &str =
    "SELECT id, cart_id, product_id, quantity, product_price_cents, discount_bp FROM cart_items";

/// PostgreSQL-backed cart store implementation.
#[derive(Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    /// Creates a new PostgreSQL cart store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn cart_query(filter: &str) -> String {
        format!("{CART_COLUMNS} {filter} GROUP BY c.id ORDER BY c.created_at ASC")
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let item_ids: Vec<Uuid> = row.try_get("item_ids")?;

        Ok(Cart {
            id: CartId::from_uuid(row.try_get("id")?),
            owner_id: OwnerId::from_uuid(row.try_get("owner_id")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            item_ids: item_ids.into_iter().map(CartItemId::from_uuid).collect(),
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<CartItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let discount_bp: i32 = row.try_get("discount_bp")?;

        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get("id")?),
            cart_id: CartId::from_uuid(row.try_get("cart_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::Corrupt(format!("negative quantity {quantity}")))?,
            product_price: Money::from_cents(row.try_get("product_price_cents")?),
            discount_bp: u32::try_from(discount_bp)
                .map_err(|_| StoreError::Corrupt(format!("negative discount {discount_bp}")))?,
        })
    }

    fn map_write_error(e: sqlx::Error, item: Option<&CartItem>, owner: Option<OwnerId>) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e {
            match (db_err.constraint(), item, owner) {
                (Some("unique_cart_product"), Some(item), _) => {
                    return StoreError::DuplicateItem {
                        cart_id: item.cart_id,
                        product_id: item.product_id.clone(),
                    };
                }
                (Some("unique_cart_owner"), _, Some(owner)) => {
                    return StoreError::DuplicateOwner(owner);
                }
                _ => {}
            }
        }
        StoreError::Database(e)
    }

    /// Locks the cart row for the rest of the transaction and returns its version.
    async fn lock_cart(tx: &mut Transaction<'_, Postgres>, cart_id: CartId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM carts WHERE id = $1 FOR UPDATE")
                .bind(cart_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        version
            .map(Version::new)
            .ok_or(StoreError::CartNotFound(cart_id))
    }

    async fn bump_version(tx: &mut Transaction<'_, Postgres>, cart_id: CartId) -> Result<()> {
        sqlx::query("UPDATE carts SET version = version + 1, updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn write_item(tx: &mut Transaction<'_, Postgres>, item: &CartItem) -> Result<()> {
        let quantity = i32::try_from(item.quantity).map_err(|_| {
            StoreError::InvalidChangeset(format!(
                "Quantity {} for product {} does not fit the quantity column",
                item.quantity, item.product_id
            ))
        })?;
        let discount_bp = i32::try_from(item.discount_bp).map_err(|_| {
            StoreError::InvalidChangeset(format!(
                "Discount {} for product {} does not fit the discount column",
                item.discount_bp, item.product_id
            ))
        })?;
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, product_price_cents, discount_bp)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                product_price_cents = EXCLUDED.product_price_cents,
                discount_bp = EXCLUDED.discount_bp
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_str())
        .bind(quantity)
        .bind(item.product_price.cents())
        .bind(discount_bp)
        .execute(&mut **tx)
        .await
        .map_err(|e| Self::map_write_error(e, Some(item), None))?;
        Ok(())
    }

    async fn require(&self, cart_id: CartId) -> Result<Cart> {
        self.get(cart_id)
            .await?
            .ok_or(StoreError::CartNotFound(cart_id))
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&Self::cart_query("WHERE c.id = $1"))
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn get_by_owner(&self, owner_id: OwnerId) -> Result<Option<Cart>> {
        let row = sqlx::query(&Self::cart_query("WHERE c.owner_id = $1"))
            .bind(owner_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn list(&self) -> Result<Vec<Cart>> {
        let rows = sqlx::query(&Self::cart_query(""))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_cart).collect()
    }

    async fn save(&self, cart: Cart) -> Result<Cart> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, owner_id, total_price_cents, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                total_price_cents = EXCLUDED.total_price_cents,
                version = carts.version + 1,
                updated_at = NOW()
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.owner_id.as_uuid())
        .bind(cart.total_price.cents())
        .bind(cart.version.as_i64())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, None, Some(cart.owner_id)))?;

        self.require(cart.id).await
    }

    async fn get_items(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!("{ITEM_COLUMNS} WHERE cart_id = $1 ORDER BY seq ASC"))
            .bind(cart_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn upsert_item(&self, item: CartItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, item.cart_id).await?;
        Self::write_item(&mut tx, &item).await?;
        Self::bump_version(&mut tx, item.cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_item(&self, item_id: CartItemId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let cart_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM cart_items WHERE id = $1 RETURNING cart_id")
                .bind(item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(cart_id) = cart_id else {
            return Ok(false);
        };
        Self::bump_version(&mut tx, CartId::from_uuid(cart_id)).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_all_items(&self, cart_id: CartId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;
        let removed = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        Self::bump_version(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn find_items_by_product(&self, product_id: &ProductId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!("{ITEM_COLUMNS} WHERE product_id = $1 ORDER BY seq ASC"))
            .bind(product_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn find_carts_by_product(&self, product_id: &ProductId) -> Result<Vec<Cart>> {
        let rows = sqlx::query(&Self::cart_query(
            "WHERE c.id IN (SELECT cart_id FROM cart_items WHERE product_id = $1)",
        ))
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cart).collect()
    }

    #[tracing::instrument(skip(self, changeset), fields(cart_id = %changeset.cart_id))]
    async fn commit(&self, changeset: CartChangeset) -> Result<Cart> {
        validate_changeset(&changeset).map_err(|e| StoreError::InvalidChangeset(e.message))?;
        let cart_id = changeset.cart_id;

        // Dropping the transaction before commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        let actual = Self::lock_cart(&mut tx, cart_id).await?;
        if actual != changeset.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                cart_id,
                expected: changeset.expected_version,
                actual,
            });
        }

        if changeset.clear_items {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                .bind(cart_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        if !changeset.deletes.is_empty() {
            let ids: Vec<Uuid> = changeset.deletes.iter().map(|id| id.as_uuid()).collect();
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = ANY($2)")
                .bind(cart_id.as_uuid())
                .bind(ids)
                .execute(&mut *tx)
                .await?;
        }

        for item in &changeset.upserts {
            Self::write_item(&mut tx, item).await?;
        }

        sqlx::query(
            r#"
            UPDATE carts
            SET total_price_cents = $2, version = version + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(changeset.total_price.cents())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.require(cart_id).await
    }
}
