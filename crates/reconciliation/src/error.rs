//! Reconciliation error types.

use cart_store::StoreError;
use thiserror::Error;

/// Errors that abort a whole sweep.
///
/// Failures of individual carts do not surface here; they are recorded in
/// the sweep report instead.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// The carts holding the product could not be enumerated.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconciliationError>;
