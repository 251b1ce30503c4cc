//! Boundary to the remote cart and catalog service.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::domain::aggregates::{CartSnapshot, Product};
use crate::domain::value_objects::{ItemId, ProductId};

pub mod memory;

pub use memory::{InMemoryRemote, RemoteCall};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("insufficient stock for {item_id}: {available} available")]
    InsufficientStock { item_id: ItemId, available: u32 },

    #[error("cart item {0} no longer exists")]
    ItemGone(ItemId),

    #[error("cart changed remotely: {0}")]
    Conflict(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether the remote refused the write because our view of the line is out of date.
    pub fn is_stale_state(&self) -> bool {
        matches!(self, Self::InsufficientStock { .. } | Self::ItemGone(_) | Self::Conflict(_))
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CartRemote: Send + Sync {
    async fn fetch_detailed_cart(&self) -> Result<CartSnapshot, RemoteError>;

    /// Lightweight count shown on the cart badge.
    async fn fetch_cart_count(&self) -> Result<u32, RemoteError>;

    async fn update_quantity(&self, item_id: &ItemId, quantity: u32) -> Result<(), RemoteError>;

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError>;

    async fn delete_all_items(&self) -> Result<(), RemoteError>;
}

/// Product, variant and flash-sale data feeding price resolution.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogRemote: Send + Sync {
    /// The product with its variants and flash sale entries.
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Product, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_state_classification() {
        assert!(RemoteError::InsufficientStock { item_id: ItemId::from("a"), available: 1 }.is_stale_state());
        assert!(RemoteError::ItemGone(ItemId::from("a")).is_stale_state());
        assert!(RemoteError::Conflict("version".into()).is_stale_state());
        assert!(!RemoteError::Network("timeout".into()).is_stale_state());
        assert!(!RemoteError::Rejected("bad request".into()).is_stale_state());
    }
}
