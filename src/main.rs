//! Storefront cart demo: drives a cart session against an in-memory remote.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cart::domain::aggregates::{CartItem, ShopRef};
use storefront_cart::{
    load_settings, CartSession, CartSnapshot, DomainEvent, EventBus, FlashSaleEntry, InMemoryRemote, ItemId, Money, Percent,
    Product, ProductCartItem, ProductId, QuantityChange, ShopId, Variant, VariantId,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = load_settings()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let seed = match &settings.seed_path {
        Some(path) => load_seed(path)?,
        None => sample_cart(),
    };
    let remote = Arc::new(InMemoryRemote::new(seed));
    let bus = EventBus::new(settings.event_capacity);

    tokio::spawn(log_events(bus.subscribe()));
    if let Some(url) = &settings.nats_url {
        let client = async_nats::connect(url.as_str()).await.with_context(|| format!("connecting to NATS at {url}"))?;
        tokio::spawn(forward_to_nats(client, settings.nats_subject.clone(), bus.subscribe()));
    }

    let session = CartSession::new(remote.clone(), bus, settings.reconciler());
    let cart = session.load().await?;
    let now = Utc::now();
    info!(lines = cart.line_count(), totals = ?session.totals(now), "cart loaded");

    if let Some(first) = cart.lines().next().map(|line| line.id.clone()) {
        for _ in 0..5 {
            let quantity = session.change_quantity(&first, QuantityChange::Delta(1), now)?;
            info!(item_id = %first, quantity, "quantity edited");
            tokio::time::sleep(Duration::from_millis(settings.debounce_ms / 5)).await;
        }
    }
    session.reconciler().flush().await;

    info!(totals = ?session.totals(Utc::now()), count = ?session.aggregate().cart_count(), "cart settled");
    info!(calls = ?remote.calls(), "remote calls");
    Ok(())
}

fn load_seed(path: &Path) -> storefront_cart::Result<CartSnapshot> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn sample_cart() -> CartSnapshot {
    let now = Utc::now();
    let stamp = |offset: ChronoDuration| (now + offset).to_rfc3339_opts(SecondsFormat::Secs, true);
    let variant = |id: &str, base: i64, stock: u32| Variant {
        id: VariantId::from(id),
        base_price: Money::new(base),
        sale_price: None,
        stock_quantity: stock,
        sold_count: 0,
        attribute_values: vec![],
    };
    let product = |id: &str, shop: &str, variants: Vec<Variant>| Product {
        id: ProductId::from(id),
        shop_id: ShopId::from(shop),
        name: id.replace('-', " "),
        discount_percent: None,
        discount_start_date: None,
        discount_end_date: None,
        attributes: vec![],
        variants,
        flash_sales: vec![],
    };

    let mut sneakers = product("running-sneakers", "shop-a", vec![variant("sneakers-42", 1_200_000, 6)]);
    sneakers.flash_sales.push(FlashSaleEntry {
        variant_id: VariantId::from("sneakers-42"),
        start_time: Some(stamp(-ChronoDuration::hours(1))),
        end_time: Some(stamp(ChronoDuration::hours(2))),
        discount_percent: Percent::from_whole(20),
        total_quantity: 50,
        sold_quantity: 47,
        max_quantity_per_user: 2,
        is_sold_out: false,
    });
    let mut socks = product("wool-socks", "shop-a", vec![variant("socks-m", 90_000, 40)]);
    socks.variants[0].sale_price = Some(Money::new(75_000));
    let mut kettle = product("steel-kettle", "shop-b", vec![variant("kettle-1l", 450_000, 0)]);
    kettle.discount_percent = Some(Percent::from_whole(15));
    kettle.discount_start_date = Some(stamp(-ChronoDuration::days(1)));
    kettle.discount_end_date = Some(stamp(ChronoDuration::days(1)));

    let line = |id: &str, product: Product, quantity: u32| ProductCartItem {
        id: ItemId::from(id),
        variant_id: product.variants[0].id.clone(),
        product,
        quantity,
    };
    let shop = |id: &str, name: &str| ShopRef { id: ShopId::from(id), name: name.to_string() };

    CartSnapshot {
        shops: vec![
            CartItem { shop: shop("shop-a", "Trail Supply"), items: vec![line("line-1", sneakers, 1), line("line-2", socks, 3)] },
            CartItem { shop: shop("shop-b", "Home Goods"), items: vec![line("line-3", kettle, 1)] },
        ],
    }
}

async fn log_events(mut events: broadcast::Receiver<DomainEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(?event, "cart event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn forward_to_nats(client: async_nats::Client, subject: String, mut events: broadcast::Receiver<DomainEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "NATS bridge lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "event not serializable");
                continue;
            }
        };
        if let Err(err) = client.publish(subject.clone(), payload.into()).await {
            warn!(%err, "NATS publish failed");
        }
    }
}
