//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use cart_store::CartStore;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub products: usize,
    pub active_cart_locks: usize,
}

/// GET /health: liveness plus a glimpse of in-process state.
pub async fn check<S: CartStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        products: state.catalog.len().await,
        active_cart_locks: state.engine.active_locks(),
    })
}
