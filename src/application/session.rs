//! Cart session: the aggregate and the quantity reconciler working one cart.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::application::aggregate::{CartAggregate, CartError};
use crate::application::bus::EventBus;
use crate::application::cache::CartCaches;
use crate::application::reconciler::{QuantityChange, QuantityReconciler, ReconcileError, ReconcilerConfig};
use crate::domain::aggregates::CartSnapshot;
use crate::domain::pricing::resolve_for;
use crate::domain::totals::{compute, CartTotals};
use crate::domain::value_objects::ItemId;
use crate::remote::CartRemote;

#[derive(Debug)]
pub struct CartSession {
    aggregate: CartAggregate,
    reconciler: QuantityReconciler,
}

impl CartSession {
    pub fn new(remote: Arc<dyn CartRemote>, bus: EventBus, config: ReconcilerConfig) -> Self {
        let caches = Arc::new(CartCaches::new(Arc::clone(&remote), bus));
        Self {
            aggregate: CartAggregate::new(Arc::clone(&remote), Arc::clone(&caches)),
            reconciler: QuantityReconciler::new(remote, caches, config),
        }
    }

    pub fn aggregate(&self) -> &CartAggregate { &self.aggregate }
    pub fn reconciler(&self) -> &QuantityReconciler { &self.reconciler }

    /// Fetches the cart and starts tracking its lines.
    pub async fn load(&self) -> Result<CartSnapshot, CartError> {
        let snapshot = self.aggregate.get().await?;
        self.reconciler.sync_from_snapshot(&snapshot);
        Ok(snapshot)
    }

    /// Edits a line's quantity within its stock and flash sale limits.
    pub fn change_quantity(&self, item_id: &ItemId, change: QuantityChange, now: DateTime<Utc>) -> Result<u32, ReconcileError> {
        let max_allowed = self
            .aggregate
            .caches()
            .last_known()
            .and_then(|cart| cart.line(item_id).and_then(|line| line.product.purchase_limit(&line.variant_id, now).ok()))
            .ok_or_else(|| ReconcileError::UnknownItem(item_id.clone()))?;
        self.reconciler.request_quantity_change(item_id, change, max_allowed)
    }

    /// Deletes a line, then drops any edit still waiting for its quiet period.
    ///
    /// A failed delete leaves the line tracked with its pending edit intact.
    pub async fn delete(&self, item_id: &ItemId) -> Result<(), CartError> {
        self.aggregate.delete(item_id).await?;
        self.reconciler.forget(item_id);
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CartError> {
        self.aggregate.delete_all().await?;
        self.reconciler.sync_from_snapshot(&CartSnapshot::default());
        Ok(())
    }

    /// Totals over the last known cart with local edits applied.
    pub fn totals(&self, now: DateTime<Utc>) -> CartTotals {
        let Some(cart) = self.aggregate.caches().last_known() else { return CartTotals::default() };
        let overlaid = cart.with_quantities(&self.reconciler.local_quantities());
        compute(&overlaid, |variant, product, at| resolve_for(product, variant, at), now)
    }
}
