//! Product catalog endpoints.
//!
//! Writes go to the in-process catalog; carts holding a changed or removed
//! product are brought up to date by the reconciliation listener.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cart::{CatalogError, Discount, Money, Product, ProductCatalog, ProductId, ProductUpdate};
use cart_store::CartStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize, Debug, Default)]
pub struct ProductRequest {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub discount_bp: Option<u32>,
    pub stock: Option<u32>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub product_id: String,
    pub name: String,
    pub price_cents: i64,
    pub discount_bp: u32,
    pub special_price_cents: i64,
    pub stock: u32,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            product_id: product.id.to_string(),
            name: product.name,
            price_cents: product.price.cents(),
            discount_bp: product.discount.basis_points(),
            special_price_cents: product.special_price.cents(),
            stock: product.stock,
        }
    }
}

/// PUT /products/{product_id}: create a product or update the given fields.
///
/// Creating requires `price_cents`.
#[tracing::instrument(skip(state))]
pub async fn upsert<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let update = ProductUpdate {
        name: req.name,
        price: req.price_cents.map(Money::from_cents),
        discount: req.discount_bp.map(Discount::from_basis_points),
        stock: req.stock,
    };

    let product = match state.catalog.update_product(&product_id, update.clone()).await {
        Ok(product) => product,
        Err(CatalogError::ProductNotFound(_)) => {
            let price = update.price.ok_or_else(|| {
                ApiError::BadRequest(format!("price_cents is required to create {product_id}"))
            })?;
            let product = Product::new(
                product_id.clone(),
                update.name.unwrap_or_else(|| product_id.to_string()),
                price,
                update.discount.unwrap_or(Discount::NONE),
                update.stock.unwrap_or(0),
            );
            state.catalog.upsert(product).await?
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        product_id = %product.id,
        special_price = %product.special_price,
        stock = product.stock,
        "product saved"
    );
    Ok(Json(product.into()))
}

/// DELETE /products/{product_id}: remove a product from the catalog.
#[tracing::instrument(skip(state))]
pub async fn remove<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.remove(&ProductId::new(product_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/{product_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let product = state
        .catalog
        .get(&product_id)
        .await?
        .ok_or(CatalogError::ProductNotFound(product_id))?;
    Ok(Json(product.into()))
}

/// GET /products
pub async fn list<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<ProductResponse>> {
    let products = state.catalog.list().await;
    Json(products.into_iter().map(ProductResponse::from).collect())
}
