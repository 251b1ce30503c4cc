//! In-process remote used by the demo binary and flow tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{CartRemote, CatalogRemote, RemoteError};
use crate::domain::aggregates::{CartItem, CartSnapshot, Product, ProductCartItem, ShopRef};
use crate::domain::value_objects::{ItemId, ProductId, VariantId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    FetchCart,
    FetchCount,
    UpdateQuantity(ItemId, u32),
    DeleteItem(ItemId),
    DeleteAll,
    FetchProduct(ProductId),
}

#[derive(Debug, Default)]
struct MemoryState {
    cart: CartSnapshot,
    catalog: HashMap<ProductId, Product>,
    calls: Vec<RemoteCall>,
    update_failures: VecDeque<RemoteError>,
}

/// Remote cart kept in memory, recording every call it receives.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    active_updates: AtomicUsize,
    peak_updates: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new(cart: CartSnapshot) -> Self {
        Self { state: Mutex::new(MemoryState { cart, ..MemoryState::default() }), ..Self::default() }
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self { self.latency = Some(latency); self }

    pub fn add_product(&self, product: Product) { self.lock().catalog.insert(product.id.clone(), product); }

    /// Adds a line for `variant_id` to the shop's group, creating the group if needed.
    pub fn add_line(&self, shop: ShopRef, product: Product, variant_id: VariantId, quantity: u32) -> ItemId {
        let id = ItemId::generate();
        let line = ProductCartItem { id: id.clone(), product, variant_id, quantity };
        let mut state = self.lock();
        match state.cart.shops.iter_mut().find(|group| group.shop.id == shop.id) {
            Some(group) => group.items.push(line),
            None => state.cart.shops.push(CartItem { shop, items: vec![line] }),
        }
        id
    }

    /// The next `update_quantity` call fails with `error`.
    pub fn fail_next_update(&self, error: RemoteError) { self.lock().update_failures.push_back(error); }

    /// Overwrites a line's quantity as if another device had edited it.
    pub fn set_remote_quantity(&self, item_id: &ItemId, quantity: u32) {
        let mut state = self.lock();
        if let Some(line) = state.cart.shops.iter_mut().flat_map(|s| s.items.iter_mut()).find(|l| &l.id == item_id) {
            line.quantity = quantity;
        }
    }

    pub fn cart(&self) -> CartSnapshot { self.lock().cart.clone() }

    pub fn calls(&self) -> Vec<RemoteCall> { self.lock().calls.clone() }

    pub fn update_calls(&self) -> Vec<(ItemId, u32)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RemoteCall::UpdateQuantity(id, qty) => Some((id.clone(), *qty)),
                _ => None,
            })
            .collect()
    }

    /// Highest number of `update_quantity` calls that were ever running at once.
    pub fn peak_concurrent_updates(&self) -> usize { self.peak_updates.load(Ordering::SeqCst) }

    pub fn count_of(&self, call: &RemoteCall) -> usize { self.lock().calls.iter().filter(|c| *c == call).count() }

    fn lock(&self) -> MutexGuard<'_, MemoryState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    async fn record(&self, call: RemoteCall) {
        if let Some(latency) = self.latency { tokio::time::sleep(latency).await; }
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl CartRemote for InMemoryRemote {
    async fn fetch_detailed_cart(&self) -> Result<CartSnapshot, RemoteError> {
        self.record(RemoteCall::FetchCart).await;
        Ok(self.lock().cart.clone())
    }

    async fn fetch_cart_count(&self) -> Result<u32, RemoteError> {
        self.record(RemoteCall::FetchCount).await;
        Ok(u32::try_from(self.lock().cart.line_count()).unwrap_or(u32::MAX))
    }

    async fn update_quantity(&self, item_id: &ItemId, quantity: u32) -> Result<(), RemoteError> {
        let active = self.active_updates.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_updates.fetch_max(active, Ordering::SeqCst);
        self.record(RemoteCall::UpdateQuantity(item_id.clone(), quantity)).await;
        self.active_updates.fetch_sub(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(error) = state.update_failures.pop_front() { return Err(error); }
        let line = state
            .cart
            .shops
            .iter_mut()
            .flat_map(|s| s.items.iter_mut())
            .find(|l| &l.id == item_id)
            .ok_or_else(|| RemoteError::ItemGone(item_id.clone()))?;
        let available = line.variant().map(|v| v.stock_quantity).unwrap_or(0);
        if quantity > available {
            return Err(RemoteError::InsufficientStock { item_id: item_id.clone(), available });
        }
        line.quantity = quantity;
        Ok(())
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), RemoteError> {
        self.record(RemoteCall::DeleteItem(item_id.clone())).await;
        if self.lock().cart.remove_line(item_id) { Ok(()) } else { Err(RemoteError::ItemGone(item_id.clone())) }
    }

    async fn delete_all_items(&self) -> Result<(), RemoteError> {
        self.record(RemoteCall::DeleteAll).await;
        self.lock().cart.clear();
        Ok(())
    }
}

#[async_trait]
impl CatalogRemote for InMemoryRemote {
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Product, RemoteError> {
        self.record(RemoteCall::FetchProduct(product_id.clone())).await;
        self.lock().catalog.get(product_id).cloned().ok_or_else(|| RemoteError::ProductNotFound(product_id.clone()))
    }
}
