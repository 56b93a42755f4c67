//! Catalog-to-cart reconciliation.
//!
//! Listens to product catalog changes and re-applies them to every cart that
//! holds the changed product, one cart at a time.

pub mod coordinator;
pub mod error;
pub mod report;

pub use coordinator::ReconciliationCoordinator;
pub use error::{ReconciliationError, Result};
pub use report::{SweepKind, SweepReport};
