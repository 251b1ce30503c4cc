//! Promotional price resolution.
//!
//! Every place a price is shown (product page, variant picker, cart,
//! checkout) resolves it through [`resolve`], so competing discount sources
//! are ranked the same way everywhere:
//!
//! 1. an active flash sale entry for the variant,
//! 2. the variant's standing sale price,
//! 3. the product-level discount window,
//! 4. the base price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::product::{active_flash_sale, FlashSaleEntry, Product, Variant};
use crate::domain::value_objects::{Money, Percent};

/// Where an effective price came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceSource {
    FlashSale,
    VariantSale,
    ProductDiscount,
    Base,
}

/// The single price a variant sells for at a given instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub effective_price: Money,
    pub base_price: Money,
    pub discount_percent: Percent,
    pub source: PriceSource,
    /// End of the time-boxed promotion this price depends on.
    pub active_until: Option<DateTime<Utc>>,
}

impl PriceQuote {
    pub fn savings(&self) -> Money { self.base_price.saturating_sub(self.effective_price) }
    pub fn is_discounted(&self) -> bool { self.source != PriceSource::Base }
}

/// Resolves the effective price of `variant` at `now`.
///
/// Malformed or missing promotion dates make that promotion inactive; this
/// never fails.
pub fn resolve(variant: &Variant, product: &Product, flash_sales: &[FlashSaleEntry], now: DateTime<Utc>) -> PriceQuote {
    let base = variant.base_price;

    if let Some(entry) = active_flash_sale(flash_sales, &variant.id, now) {
        return PriceQuote {
            effective_price: base.discounted_by(entry.discount_percent),
            base_price: base,
            discount_percent: entry.discount_percent,
            source: PriceSource::FlashSale,
            active_until: entry.ends_at(),
        };
    }

    if let Some(sale) = variant.active_sale_price() {
        return PriceQuote {
            effective_price: sale,
            base_price: base,
            discount_percent: Percent::between(base, base.saturating_sub(sale)),
            source: PriceSource::VariantSale,
            active_until: None,
        };
    }

    if let Some((percent, until)) = product.active_discount(now) {
        return PriceQuote {
            effective_price: base.discounted_by(percent),
            base_price: base,
            discount_percent: percent,
            source: PriceSource::ProductDiscount,
            active_until: Some(until),
        };
    }

    PriceQuote { effective_price: base, base_price: base, discount_percent: Percent::ZERO, source: PriceSource::Base, active_until: None }
}

/// [`resolve`] using the flash sale entries carried on the product itself.
pub fn resolve_for(product: &Product, variant: &Variant, now: DateTime<Utc>) -> PriceQuote {
    resolve(variant, product, &product.flash_sales, now)
}

/// Lowest and highest effective price across a product's variants.
pub fn price_range(product: &Product, now: DateTime<Utc>) -> Option<(Money, Money)> {
    product
        .variants
        .iter()
        .map(|v| resolve_for(product, v, now).effective_price)
        .fold(None, |range, price| match range {
            None => Some((price, price)),
            Some((lo, hi)) => Some((lo.min(price), hi.max(price))),
        })
}
