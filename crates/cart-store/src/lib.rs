pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{CartId, CartItemId, Money, OwnerId, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryCartStore;
pub use postgres::PostgresCartStore;
pub use record::{Cart, CartItem, MAX_LINE_QUANTITY, Version};
pub use store::{CartChangeset, CartStore, CartStoreExt};
