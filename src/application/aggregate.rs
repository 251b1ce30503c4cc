//! Cart aggregate: remote-backed mirror of the shopper's cart.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::application::cache::CartCaches;
use crate::domain::aggregates::CartSnapshot;
use crate::domain::events::{ChangeCause, Notification};
use crate::domain::value_objects::ItemId;
use crate::remote::{CartRemote, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart item {0} not found")]
    ItemNotFound(ItemId),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub struct CartAggregate {
    remote: Arc<dyn CartRemote>,
    caches: Arc<CartCaches>,
}

impl std::fmt::Debug for CartAggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartAggregate").field("caches", &self.caches).finish_non_exhaustive()
    }
}

impl CartAggregate {
    pub fn new(remote: Arc<dyn CartRemote>, caches: Arc<CartCaches>) -> Self { Self { remote, caches } }

    pub fn caches(&self) -> &Arc<CartCaches> { &self.caches }

    /// Current snapshot, grouped by shop in remote order.
    pub async fn get(&self) -> Result<CartSnapshot, CartError> { Ok(self.caches.ensure_fresh().await?) }

    pub fn cart_count(&self) -> Option<u32> { self.caches.count() }

    #[instrument(skip(self))]
    pub async fn delete(&self, item_id: &ItemId) -> Result<(), CartError> {
        if let Some(cart) = self.caches.detailed() {
            if cart.line(item_id).is_none() {
                return Err(CartError::ItemNotFound(item_id.clone()));
            }
        }
        self.remote.delete_item(item_id).await.map_err(|err| self.report(err))?;
        info!("cart item deleted");
        self.caches.cart_changed(ChangeCause::ItemDeleted { item_id: item_id.clone() }).await;
        Ok(())
    }

    /// Empties the cart; an already-empty cart is left alone without a remote call.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<(), CartError> {
        let known = match self.caches.last_known() {
            Some(cart) => cart,
            None => self.caches.ensure_fresh().await?,
        };
        if known.is_empty() {
            return Ok(());
        }
        self.remote.delete_all_items().await.map_err(|err| self.report(err))?;
        info!(lines = known.line_count(), "cart cleared");
        self.caches.cart_changed(ChangeCause::Cleared).await;
        Ok(())
    }

    fn report(&self, err: RemoteError) -> CartError {
        warn!(%err, "cart mutation failed");
        self.caches.bus().publish(Notification::MutationFailed { message: err.to_string() });
        CartError::Remote(err)
    }
}
