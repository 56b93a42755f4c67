//! HTTP API for the cart service.
//!
//! Exposes the cart and product catalog endpoints over the cart consistency
//! engine, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use cart_store::CartStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use state::{AppState, create_default_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CartStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/carts/products/{product_id}/quantity/{quantity}",
            post(routes::carts::add_product::<S>),
        )
        .route(
            "/cart/products/{product_id}/quantity/{operation}",
            put(routes::carts::update_quantity::<S>),
        )
        .route(
            "/carts/{cart_id}/products/{product_id}",
            delete(routes::carts::remove_product::<S>),
        )
        .route("/cart/create", post(routes::carts::replace_contents::<S>))
        .route("/carts/users/cart", get(routes::carts::owner_cart::<S>))
        .route("/carts/{cart_id}", get(routes::carts::get::<S>))
        .route("/carts", get(routes::carts::list::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route(
            "/products/{product_id}",
            get(routes::products::get::<S>)
                .put(routes::products::upsert::<S>)
                .delete(routes::products::remove::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
