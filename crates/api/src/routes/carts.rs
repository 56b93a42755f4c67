//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cart::{CartId, CartRef, CartView, ProductId};
use cart_store::CartStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Owner;
use crate::state::AppState;

/// Path segment that decrements the quantity on `PUT .../quantity/{operation}`.
const DECREMENT_OPERATION: &str = "delete";

// -- Request types --

#[derive(Deserialize)]
pub struct CartEntryRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub owner_id: String,
    pub total_price_cents: i64,
    pub total_price: String,
    pub item_count: usize,
    pub total_quantity: u64,
    pub items: Vec<CartItemResponse>,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub item_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub product_price_cents: i64,
    pub discount_bp: u32,
    /// `null` only if the line total leaves the cent range.
    pub line_total_cents: Option<i64>,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        let items = view
            .items
            .iter()
            .map(|item| CartItemResponse {
                item_id: item.id.to_string(),
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
                product_price_cents: item.product_price.cents(),
                discount_bp: item.discount_bp,
                line_total_cents: item.line_total().map(|total| total.cents()),
            })
            .collect();

        Self {
            cart_id: view.id().to_string(),
            owner_id: view.owner_id().to_string(),
            total_price_cents: view.total_price().cents(),
            total_price: view.total_price().to_string(),
            item_count: view.item_count(),
            total_quantity: view.total_quantity(),
            items,
        }
    }
}

// -- Handlers --

/// POST /carts/products/{product_id}/quantity/{quantity}: add a product to
/// the caller's cart, creating the cart on first use.
#[tracing::instrument(skip(state))]
pub async fn add_product<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
    Path((product_id, quantity)): Path<(String, u32)>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let cart = state.engine.resolve_cart(owner_id).await?;
    let view = state
        .engine
        .add_item(cart.id, &ProductId::new(product_id), quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(view.into())))
}

/// PUT /cart/products/{product_id}/quantity/{operation}: step a line's
/// quantity by one; `delete` decrements, any other operation increments.
#[tracing::instrument(skip(state))]
pub async fn update_quantity<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
    Path((product_id, operation)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let delta = if operation.eq_ignore_ascii_case(DECREMENT_OPERATION) {
        -1
    } else {
        1
    };

    let view = state
        .engine
        .adjust_quantity(CartRef::Owner(owner_id), &ProductId::new(product_id), delta)
        .await?;

    Ok(Json(view.into()))
}

/// DELETE /carts/{cart_id}/products/{product_id}: remove a line from a cart
/// the caller owns.
#[tracing::instrument(skip(state))]
pub async fn remove_product<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
    Path((cart_id, product_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&cart_id)?;
    state.engine.authorize(owner_id, cart_id).await?;

    let view = state
        .engine
        .remove_item(cart_id, &ProductId::new(product_id))
        .await?;

    Ok(Json(view.into()))
}

/// POST /cart/create: replace the caller's cart contents with the given lines.
#[tracing::instrument(skip(state, entries), fields(lines = entries.len()))]
pub async fn replace_contents<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
    Json(entries): Json<Vec<CartEntryRequest>>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let entries = entries
        .into_iter()
        .map(|entry| (ProductId::new(entry.product_id), entry.quantity))
        .collect();

    let view = state
        .engine
        .replace_cart_contents(owner_id, entries)
        .await?;

    Ok((StatusCode::CREATED, Json(view.into())))
}

/// GET /carts/users/cart: the caller's cart.
#[tracing::instrument(skip(state))]
pub async fn owner_cart<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.engine.cart_for_owner(owner_id).await?;
    Ok(Json(view.into()))
}

/// GET /carts/{cart_id}: a cart the caller owns.
#[tracing::instrument(skip(state))]
pub async fn get<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner_id): Owner,
    Path(cart_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_cart_id(&cart_id)?;
    let view = state.engine.get_owned_cart(owner_id, cart_id).await?;
    Ok(Json(view.into()))
}

/// GET /carts: every cart.
#[tracing::instrument(skip(state))]
pub async fn list<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    let views = state.engine.list_carts().await?;
    Ok(Json(views.into_iter().map(CartResponse::from).collect()))
}

fn parse_cart_id(id: &str) -> Result<CartId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid cart ID format: {e}")))
}
