//! Async services over the remote cart: caches, aggregate, reconciler.
pub mod aggregate;
pub mod bus;
pub mod cache;
pub mod catalog;
pub mod reconciler;
pub mod session;

pub use aggregate::{CartAggregate, CartError};
pub use bus::EventBus;
pub use cache::{CacheView, CartCaches};
pub use catalog::{PriceQuoter, QuoteError, VariantQuote};
pub use reconciler::{FailurePolicy, QuantityChange, QuantityReconciler, ReconcileError, ReconcilerConfig};
pub use session::CartSession;
