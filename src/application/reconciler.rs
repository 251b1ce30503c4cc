//! Optimistic cart quantity edits.
//!
//! Edits apply to local state immediately and are coalesced per line: every
//! request replaces the line's pending value and restarts its quiet-period
//! timer, so only the last value requested before the line goes quiet is
//! sent. Scheduled commits live in an arena indexed by line id; cancelling a
//! commit removes its arena slot, which is what a firing timer checks.
//!
//! At most one write per line is in flight. A timer that fires while the
//! previous write is still outstanding is parked and committed as soon as that
//! write resolves, unless the remote rejected that write as stale: the line is
//! then resynced and the parked value dropped.
//!
//! Every commit task carries the ticket it was armed with. Re-arming a commit
//! bumps its ticket, so a superseded task that is already past its sleep
//! leaves the commit alone instead of being aborted mid-write.
//!
//! Commit tasks are detached: dropping every handle to the reconciler does not
//! cancel a scheduled or in-flight commit, and failures are always reported
//! on the event bus.

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::application::cache::CartCaches;
use crate::domain::aggregates::CartSnapshot;
use crate::domain::events::{CartEvent, ChangeCause, Notification};
use crate::domain::value_objects::{ItemId, Quantity};
use crate::remote::{CartRemote, RemoteError};

new_key_type! {
    /// Arena slot of a scheduled commit.
    pub struct CommitKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantityChange {
    Delta(i64),
    Absolute(u32),
}

/// What happens to the local quantity when a commit fails for a reason other
/// than stale state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the optimistic value and flag the line as unsynced.
    #[default]
    LeaveAndFlag,
    /// Restore the last quantity the remote accepted.
    Rollback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub debounce: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self { Self { debounce: Duration::from_millis(500), failure_policy: FailurePolicy::default() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("cart item {0} is not tracked")]
    UnknownItem(ItemId),
}

#[derive(Debug)]
struct ScheduledCommit {
    item_id: ItemId,
    quantity: u32,
    timer: Option<AbortHandle>,
    ticket: u64,
    /// Timer fired while a write for the line was in flight.
    parked: bool,
}

#[derive(Debug)]
struct LineState {
    local: u32,
    confirmed: u32,
    scheduled: Option<CommitKey>,
    in_flight: bool,
    unsynced: bool,
}

impl LineState {
    fn new(quantity: u32) -> Self {
        Self { local: quantity, confirmed: quantity, scheduled: None, in_flight: false, unsynced: false }
    }
}

#[derive(Debug, Default)]
struct ReconcilerState {
    lines: HashMap<ItemId, LineState>,
    commits: SlotMap<CommitKey, ScheduledCommit>,
    running: usize,
}

impl ReconcilerState {
    fn cancel(&mut self, key: CommitKey) {
        if let Some(timer) = self.commits.remove(key).and_then(|commit| commit.timer) {
            timer.abort();
        }
    }

    fn is_idle(&self) -> bool { self.commits.is_empty() && self.running == 0 }
}

struct Settlement {
    parked: Option<CommitKey>,
    rolled_back_to: Option<u32>,
}

struct Inner {
    remote: Arc<dyn CartRemote>,
    caches: Arc<CartCaches>,
    config: ReconcilerConfig,
    state: Mutex<ReconcilerState>,
    idle: Notify,
}

#[derive(Clone)]
pub struct QuantityReconciler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QuantityReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantityReconciler").field("config", &self.inner.config).finish_non_exhaustive()
    }
}

impl QuantityReconciler {
    pub fn new(remote: Arc<dyn CartRemote>, caches: Arc<CartCaches>, config: ReconcilerConfig) -> Self {
        Self {
            inner: Arc::new(Inner { remote, caches, config, state: Mutex::new(ReconcilerState::default()), idle: Notify::new() }),
        }
    }

    /// Starts tracking a line at the quantity the remote reports.
    ///
    /// Lines with an edit pending or in flight keep their local value.
    pub fn track(&self, item_id: ItemId, quantity: u32) {
        let mut state = self.inner.lock();
        let line = state.lines.entry(item_id).or_insert_with(|| LineState::new(quantity));
        line.confirmed = quantity;
        if line.scheduled.is_none() && !line.in_flight {
            line.local = quantity;
            line.unsynced = false;
        }
    }

    /// Tracks every line of `snapshot` and forgets lines it no longer holds.
    pub fn sync_from_snapshot(&self, snapshot: &CartSnapshot) {
        for line in snapshot.lines() {
            self.track(line.id.clone(), line.quantity);
        }
        let mut state = self.inner.lock();
        let gone: Vec<ItemId> = state.lines.keys().filter(|id| snapshot.line(id).is_none()).cloned().collect();
        for item_id in gone {
            forget_line(&mut state, &item_id);
        }
        drop(state);
        self.inner.idle.notify_waiters();
    }

    /// Stops tracking a line, cancelling its scheduled commit.
    pub fn forget(&self, item_id: &ItemId) {
        forget_line(&mut self.inner.lock(), item_id);
        self.inner.idle.notify_waiters();
    }

    pub fn quantity(&self, item_id: &ItemId) -> Option<u32> { self.inner.lock().lines.get(item_id).map(|l| l.local) }

    /// Quantity waiting for its quiet period to end.
    pub fn pending(&self, item_id: &ItemId) -> Option<u32> {
        let state = self.inner.lock();
        let key = state.lines.get(item_id)?.scheduled?;
        state.commits.get(key).map(|commit| commit.quantity)
    }

    /// Whether the last commit failed and the local value may differ from the remote.
    pub fn is_unsynced(&self, item_id: &ItemId) -> bool {
        self.inner.lock().lines.get(item_id).is_some_and(|l| l.unsynced)
    }

    pub fn local_quantities(&self) -> HashMap<ItemId, u32> {
        self.inner.lock().lines.iter().map(|(id, line)| (id.clone(), line.local)).collect()
    }

    /// Applies an edit locally and schedules its commit; returns the new local quantity.
    ///
    /// The result is clamped to `[1, max_allowed]`. Must be called from within a
    /// Tokio runtime.
    pub fn request_quantity_change(
        &self,
        item_id: &ItemId,
        change: QuantityChange,
        max_allowed: u32,
    ) -> Result<u32, ReconcileError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        let line = state.lines.get_mut(item_id).ok_or_else(|| ReconcileError::UnknownItem(item_id.clone()))?;

        let requested = match change {
            QuantityChange::Delta(delta) => i64::from(line.local).saturating_add(delta),
            QuantityChange::Absolute(quantity) => i64::from(quantity),
        };
        let quantity = Quantity::clamped(requested, max_allowed).value();
        if i64::from(quantity) != requested {
            debug!(%item_id, requested, quantity, max_allowed, "quantity clamped");
        }
        line.local = quantity;

        let superseded = line.scheduled.take();
        let unchanged = quantity == line.confirmed && !line.in_flight && !line.unsynced;
        if let Some(key) = superseded {
            state.cancel(key);
            debug!(%item_id, quantity, "pending commit superseded");
        }
        if unchanged {
            drop(guard);
            self.inner.idle.notify_waiters();
            return Ok(quantity);
        }

        let key = state.commits.insert(ScheduledCommit {
            item_id: item_id.clone(),
            quantity,
            timer: None,
            ticket: 0,
            parked: false,
        });
        if let Some(line) = state.lines.get_mut(item_id) {
            line.scheduled = Some(key);
        }
        if let Some(commit) = state.commits.get_mut(key) {
            self.inner.arm(key, commit, self.inner.config.debounce);
        }
        Ok(quantity)
    }

    /// Commits every scheduled edit now and waits for the writes to settle.
    pub async fn flush(&self) {
        {
            let mut state = self.inner.lock();
            for (key, commit) in state.commits.iter_mut().filter(|(_, commit)| !commit.parked) {
                self.inner.arm(key, commit, Duration::ZERO);
            }
        }
        self.settled().await;
    }

    /// Resolves once no commit is scheduled, in flight, or refreshing caches.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.idle.notified();
            let idle = self.inner.lock().is_idle();
            if idle {
                return;
            }
            notified.await;
        }
    }
}

fn forget_line(state: &mut ReconcilerState, item_id: &ItemId) {
    if let Some(key) = state.lines.remove(item_id).and_then(|line| line.scheduled) {
        state.cancel(key);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ReconcilerState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Spawns a fresh task for `commit`. Must be called with the state lock held.
    ///
    /// The previous task can only be sleeping or waiting for the lock, since a
    /// task that claimed the commit has removed it from the arena; with its
    /// ticket outdated it returns without writing either way.
    fn arm(self: &Arc<Self>, key: CommitKey, commit: &mut ScheduledCommit, delay: Duration) {
        commit.ticket = commit.ticket.wrapping_add(1);
        commit.parked = false;
        let inner = Arc::clone(self);
        let ticket = commit.ticket;
        let timer = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.run_commit(key, ticket).await;
        })
        .abort_handle();
        if let Some(previous) = commit.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Starts a scheduled commit immediately.
    fn rearm(self: &Arc<Self>, key: CommitKey) {
        let mut state = self.lock();
        if let Some(commit) = state.commits.get_mut(key) {
            self.arm(key, commit, Duration::ZERO);
        }
    }

    async fn run_commit(self: Arc<Self>, key: CommitKey, ticket: u64) {
        let (item_id, quantity) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(commit) = state.commits.get_mut(key) else { return };
            if commit.ticket != ticket {
                return;
            }
            let Some(line) = state.lines.get_mut(&commit.item_id) else {
                state.commits.remove(key);
                drop(guard);
                self.idle.notify_waiters();
                return;
            };
            if line.in_flight {
                debug!(item_id = %commit.item_id, "write in flight, parking commit");
                commit.timer = None;
                commit.parked = true;
                return;
            }
            line.in_flight = true;
            line.scheduled = None;
            let item_id = commit.item_id.clone();
            let quantity = commit.quantity;
            state.commits.remove(key);
            state.running += 1;
            (item_id, quantity)
        };

        info!(%item_id, quantity, "committing cart quantity");
        let result = self.remote.update_quantity(&item_id, quantity).await;
        let settlement = self.settle_write(&item_id, quantity, &result);
        if let Some(parked) = settlement.parked {
            self.rearm(parked);
        }

        match result {
            Ok(()) => {
                self.caches.cart_changed(ChangeCause::QuantityCommitted { item_id, quantity }).await;
            }
            Err(err) if err.is_stale_state() => self.resync(&item_id, &err).await,
            Err(err) => {
                warn!(%item_id, quantity, %err, "quantity commit failed");
                self.caches.bus().publish(Notification::CommitFailed {
                    item_id,
                    message: err.to_string(),
                    rolled_back_to: settlement.rolled_back_to,
                });
            }
        }

        self.lock().running -= 1;
        self.idle.notify_waiters();
    }

    fn settle_write(&self, item_id: &ItemId, quantity: u32, result: &Result<(), RemoteError>) -> Settlement {
        let mut state = self.lock();
        let policy = self.config.failure_policy;
        let ReconcilerState { lines, commits, .. } = &mut *state;
        let Some(line) = lines.get_mut(item_id) else {
            return Settlement { parked: None, rolled_back_to: None };
        };
        line.in_flight = false;

        let mut rolled_back_to = None;
        match result {
            Ok(()) => {
                line.confirmed = quantity;
                if line.scheduled.is_none() {
                    line.unsynced = false;
                }
            }
            Err(err) if err.is_stale_state() => {
                if let Some(key) = line.scheduled.take() {
                    if let Some(timer) = commits.remove(key).and_then(|commit| commit.timer) {
                        timer.abort();
                    }
                    debug!(%item_id, "dropping edit queued behind a stale write");
                }
            }
            Err(_) => {
                line.unsynced = true;
                if policy == FailurePolicy::Rollback && line.scheduled.is_none() {
                    line.local = line.confirmed;
                    rolled_back_to = Some(line.confirmed);
                }
            }
        }

        let parked = line.scheduled.filter(|key| commits.get(*key).is_some_and(|c| c.parked));
        Settlement { parked, rolled_back_to }
    }

    /// Reloads a line after the remote rejected its write as stale.
    async fn resync(&self, item_id: &ItemId, cause: &RemoteError) {
        warn!(%item_id, %cause, "remote rejected quantity as stale, resyncing");
        match self.caches.refresh().await {
            Ok(snapshot) => {
                let quantity = snapshot.line(item_id).map(|line| line.quantity);
                {
                    let mut state = self.lock();
                    match quantity {
                        Some(quantity) => {
                            let superseded = state.lines.get_mut(item_id).and_then(|line| {
                                line.local = quantity;
                                line.confirmed = quantity;
                                line.unsynced = false;
                                line.scheduled.take()
                            });
                            if let Some(key) = superseded {
                                state.cancel(key);
                            }
                        }
                        None => forget_line(&mut state, item_id),
                    }
                }
                let bus = self.caches.bus();
                bus.publish(Notification::Resynced { item_id: item_id.clone(), quantity });
                bus.publish(CartEvent::Changed { cause: ChangeCause::Resynced { item_id: item_id.clone() } });
            }
            Err(err) => {
                warn!(%item_id, %err, "resync failed");
                if let Some(line) = self.lock().lines.get_mut(item_id) {
                    line.unsynced = true;
                }
                self.caches.bus().publish(Notification::CommitFailed {
                    item_id: item_id.clone(),
                    message: cause.to_string(),
                    rolled_back_to: None,
                });
            }
        }
    }
}
