//! Shared types used across the cart workspace.

mod money;
mod types;

pub use money::Money;
pub use types::{CartId, CartItemId, OwnerId, ProductId};
