//! Storefront cart core
//!
//! Client-side pricing and cart state for a multi-shop storefront.
//!
//! ## Features
//! - Promotional price resolution (flash sale, variant sale, product discount)
//! - Cart totals over in-stock lines
//! - Optimistic, debounced cart quantity edits
//! - Detailed cart and cart count caches kept in step

use thiserror::Error;

pub mod application;
pub mod config;
pub mod domain;
pub mod remote;

pub use application::{
    CartAggregate, CartCaches, CartError, CartSession, EventBus, FailurePolicy, PriceQuoter, QuantityChange,
    QuantityReconciler, QuoteError, ReconcileError, ReconcilerConfig,
};
pub use config::{load_settings, ConfigError, Settings};
pub use domain::aggregates::{CartSnapshot, FlashSaleEntry, Product, ProductCartItem, Variant};
pub use domain::events::{CartEvent, ChangeCause, DomainEvent, Notification};
pub use domain::pricing::{resolve, PriceQuote, PriceSource};
pub use domain::totals::{compute, CartTotals};
pub use domain::value_objects::{ItemId, Money, Percent, ProductId, ShopId, VariantId};
pub use remote::{CartRemote, CatalogRemote, InMemoryRemote, RemoteError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error("invalid cart snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
