//! Domain events
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::ItemId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Notice(Notification),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    /// Both cached cart representations were refreshed after a mutation.
    Changed { cause: ChangeCause },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeCause {
    QuantityCommitted { item_id: ItemId, quantity: u32 },
    ItemDeleted { item_id: ItemId },
    Cleared,
    Resynced { item_id: ItemId },
}

/// User-facing, dismissible messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notification {
    CommitFailed { item_id: ItemId, message: String, rolled_back_to: Option<u32> },
    /// The remote rejected a commit as stale and the line was reloaded.
    Resynced { item_id: ItemId, quantity: Option<u32> },
    MutationFailed { message: String },
    RefreshFailed { message: String },
}

impl From<CartEvent> for DomainEvent {
    fn from(event: CartEvent) -> Self { DomainEvent::Cart(event) }
}

impl From<Notification> for DomainEvent {
    fn from(notice: Notification) -> Self { DomainEvent::Notice(notice) }
}
