//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::{CartError, CatalogError};
use cart_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The caller did not identify itself.
    Unauthenticated(String),
    /// Cart engine error.
    Cart(CartError),
    /// Product catalog error.
    Catalog(CatalogError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Catalog(err) => catalog_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, String) {
    let status = match &err {
        CartError::NotFound { .. } => StatusCode::NOT_FOUND,
        CartError::AlreadyInCart { .. } => StatusCode::CONFLICT,
        CartError::Unavailable(_)
        | CartError::InsufficientStock { .. }
        | CartError::AmountOverflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CartError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
        CartError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        CartError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        CartError::Store(
            StoreError::ConcurrencyConflict { .. }
            | StoreError::DuplicateOwner(_)
            | StoreError::DuplicateItem { .. },
        ) => StatusCode::CONFLICT,
        CartError::Catalog(catalog_err) => catalog_status(catalog_err),
        CartError::Invariant(_) | CartError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn catalog_error_to_response(err: CatalogError) -> (StatusCode, String) {
    (catalog_status(&err), err.to_string())
}

fn catalog_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidDiscount(_) | CatalogError::InvalidPrice(_) => {
            StatusCode::BAD_REQUEST
        }
        CatalogError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}
