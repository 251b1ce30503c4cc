//! Detailed-cart and cart-count caches.
//!
//! The two representations are fetched independently from the remote but are
//! only ever installed together: after a mutation both are marked stale, both
//! are refetched, and both are swapped in under one lock. A reader therefore
//! never sees a fresh count next to a stale detailed cart or the reverse.
//!
//! There are no per-cache subscribers reacting to a "cart changed" signal.
//! [`CartCaches::cart_changed`] refreshes both caches itself and publishes
//! `CartEvent::Changed` only afterwards, so anyone listening on the bus
//! already reads the refreshed caches.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, warn};

use crate::application::bus::EventBus;
use crate::domain::aggregates::CartSnapshot;
use crate::domain::events::{CartEvent, ChangeCause, Notification};
use crate::remote::{CartRemote, RemoteError};

#[derive(Debug, Default)]
struct CacheState {
    epoch: u64,
    detailed: Option<CartSnapshot>,
    count: Option<u32>,
    fresh: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheView {
    pub detailed: Option<CartSnapshot>,
    pub count: Option<u32>,
    pub fresh: bool,
}

pub struct CartCaches {
    remote: Arc<dyn CartRemote>,
    bus: EventBus,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for CartCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartCaches").field("state", &self.state).finish_non_exhaustive()
    }
}

impl CartCaches {
    pub fn new(remote: Arc<dyn CartRemote>, bus: EventBus) -> Self {
        Self { remote, bus, state: Mutex::new(CacheState::default()) }
    }

    pub fn bus(&self) -> &EventBus { &self.bus }

    pub fn view(&self) -> CacheView {
        let state = self.lock();
        CacheView { detailed: state.detailed.clone(), count: state.count, fresh: state.fresh }
    }

    /// Detailed cart, only while fresh.
    pub fn detailed(&self) -> Option<CartSnapshot> {
        let state = self.lock();
        state.fresh.then(|| state.detailed.clone()).flatten()
    }

    /// Badge count, only while fresh.
    pub fn count(&self) -> Option<u32> {
        let state = self.lock();
        state.count.filter(|_| state.fresh)
    }

    /// Most recent detailed cart, fresh or not.
    pub fn last_known(&self) -> Option<CartSnapshot> { self.lock().detailed.clone() }

    /// Marks both representations stale and returns the new epoch.
    pub fn invalidate(&self) -> u64 {
        let mut state = self.lock();
        state.epoch += 1;
        state.fresh = false;
        state.epoch
    }

    /// Invalidates and refetches both representations.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<CartSnapshot, RemoteError> {
        let epoch = self.invalidate();
        self.refetch(epoch).await
    }

    /// Fresh detailed cart, refetching both representations when stale.
    pub async fn ensure_fresh(&self) -> Result<CartSnapshot, RemoteError> {
        match self.detailed() {
            Some(cart) => Ok(cart),
            None => self.refresh().await,
        }
    }

    /// Runs the single refresh cycle that follows a successful mutation.
    ///
    /// Refresh failures are reported on the bus, never to the mutating caller:
    /// the mutation itself already succeeded.
    pub async fn cart_changed(&self, cause: ChangeCause) {
        match self.refresh().await {
            Ok(_) => self.bus.publish(CartEvent::Changed { cause }),
            Err(err) => {
                warn!(%err, ?cause, "cart caches left stale after mutation");
                self.bus.publish(Notification::RefreshFailed { message: err.to_string() });
            }
        }
    }

    async fn refetch(&self, epoch: u64) -> Result<CartSnapshot, RemoteError> {
        let (detailed, count) = tokio::try_join!(self.remote.fetch_detailed_cart(), self.remote.fetch_cart_count())?;
        let mut state = self.lock();
        if state.epoch == epoch {
            state.detailed = Some(detailed.clone());
            state.count = Some(count);
            state.fresh = true;
        } else {
            debug!(epoch, current = state.epoch, "newer invalidation pending, discarding refetch");
        }
        Ok(detailed)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }
}
