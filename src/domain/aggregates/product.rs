//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::value_objects::{parse_instant, window_contains, Money, Percent, ProductId, ShopId, VariantId};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub shop_id: ShopId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub discount_percent: Option<Percent>,
    #[serde(default)]
    pub discount_start_date: Option<String>,
    #[serde(default)]
    pub discount_end_date: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub flash_sales: Vec<FlashSaleEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition { pub name: String, pub values: Vec<String> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue { pub attribute: String, pub value: String }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: VariantId,
    pub base_price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub stock_quantity: u32,
    #[serde(default)]
    pub sold_count: u32,
    #[serde(default)]
    pub attribute_values: Vec<AttributeValue>,
}

impl Variant {
    /// The standing sale price, only when it undercuts the base price.
    pub fn active_sale_price(&self) -> Option<Money> {
        self.sale_price.filter(|sale| *sale < self.base_price)
    }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }

    fn matches(&self, selection: &[AttributeValue]) -> bool {
        selection.iter().all(|wanted| self.attribute_values.iter().any(|own| own == wanted))
    }
}

/// One variant's participation in a flash sale campaign.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashSaleEntry {
    pub variant_id: VariantId,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub discount_percent: Percent,
    #[serde(default)]
    pub total_quantity: u32,
    #[serde(default)]
    pub sold_quantity: u32,
    #[serde(default)]
    pub max_quantity_per_user: u32,
    #[serde(default)]
    pub is_sold_out: bool,
}

impl FlashSaleEntry {
    pub fn remaining(&self) -> u32 { self.total_quantity.saturating_sub(self.sold_quantity) }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> { parse_instant(self.end_time.as_deref()) }

    /// Only the feed's sold-out flag ends a campaign early; the counters
    /// bound [`Self::purchase_cap`] and nothing else.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_sold_out && window_contains(self.start_time.as_deref(), self.end_time.as_deref(), now)
    }

    /// Most a single shopper may hold in the cart while this entry applies.
    pub fn purchase_cap(&self) -> u32 { self.max_quantity_per_user.min(self.remaining()) }
}

/// Finds the flash sale entry that applies to `variant_id` at `now`.
///
/// At most one entry should be active per variant; if the feed violates that,
/// the first one in feed order wins.
pub fn active_flash_sale<'a>(
    entries: &'a [FlashSaleEntry],
    variant_id: &VariantId,
    now: DateTime<Utc>,
) -> Option<&'a FlashSaleEntry> {
    let mut active = entries.iter().filter(|e| &e.variant_id == variant_id && e.is_active_at(now));
    let first = active.next();
    if first.is_some() && active.next().is_some() {
        warn!(%variant_id, "more than one flash sale entry active; using the first");
    }
    first
}

/// `min(stock, flash sale cap)`: the most a line for this variant may hold.
pub fn purchase_limit(variant: &Variant, flash_sale: Option<&FlashSaleEntry>) -> u32 {
    match flash_sale {
        Some(entry) => variant.stock_quantity.min(entry.purchase_cap()),
        None => variant.stock_quantity,
    }
}

impl Product {
    pub fn id(&self) -> &ProductId { &self.id }

    pub fn variant(&self, id: &VariantId) -> Result<&Variant, ProductError> {
        self.variants.iter().find(|v| &v.id == id).ok_or_else(|| ProductError::VariantNotFound(id.clone()))
    }

    /// Variant picker lookup: the first variant carrying every selected value.
    pub fn variant_for_selection(&self, selection: &[AttributeValue]) -> Option<&Variant> {
        self.variants.iter().find(|v| v.matches(selection))
    }

    /// Active product-level discount at `now`, if any.
    pub fn active_discount(&self, now: DateTime<Utc>) -> Option<(Percent, DateTime<Utc>)> {
        let percent = self.discount_percent.filter(|p| !p.is_zero())?;
        if !window_contains(self.discount_start_date.as_deref(), self.discount_end_date.as_deref(), now) {
            return None;
        }
        parse_instant(self.discount_end_date.as_deref()).map(|end| (percent, end))
    }

    pub fn active_flash_sale(&self, variant_id: &VariantId, now: DateTime<Utc>) -> Option<&FlashSaleEntry> {
        active_flash_sale(&self.flash_sales, variant_id, now)
    }

    pub fn purchase_limit(&self, variant_id: &VariantId, now: DateTime<Utc>) -> Result<u32, ProductError> {
        let variant = self.variant(variant_id)?;
        Ok(purchase_limit(variant, self.active_flash_sale(variant_id, now)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("variant {0} not found")]
    VariantNotFound(VariantId),
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::TimeZone;
    use testresult::TestResult;

    fn noon() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

    #[test]
    fn test_sale_price_must_undercut_base() {
        let mut v = variant("v1", 1000, 3);
        v.sale_price = Some(Money::new(1000));
        assert_eq!(v.active_sale_price(), None);
        v.sale_price = Some(Money::new(900));
        assert_eq!(v.active_sale_price(), Some(Money::new(900)));
    }

    #[test]
    fn test_flash_sale_activity() {
        let mut entry = flash_sale("v1", 20, "2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z");
        assert!(entry.is_active_at(noon()));
        entry.is_sold_out = true;
        assert!(!entry.is_active_at(noon()));
        entry.is_sold_out = false;
        entry.sold_quantity = entry.total_quantity;
        assert!(entry.is_active_at(noon()));
        assert_eq!(entry.purchase_cap(), 0);
    }

    #[test]
    fn test_flash_sale_without_counters_is_active() -> TestResult {
        let entry: FlashSaleEntry = serde_json::from_str(
            r#"{"variantId":"v1","startTime":"2024-06-01T00:00:00Z","endTime":"2024-06-02T00:00:00Z","discountPercent":20,"isSoldOut":false}"#,
        )?;
        assert!(entry.is_active_at(noon()));
        Ok(())
    }

    #[test]
    fn test_purchase_limit_takes_tightest_bound() {
        let v = variant("v1", 1000, 8);
        let mut entry = flash_sale("v1", 20, "2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z");
        entry.max_quantity_per_user = 5;
        assert_eq!(purchase_limit(&v, Some(&entry)), 5);
        entry.sold_quantity = 97;
        assert_eq!(purchase_limit(&v, Some(&entry)), 3);
        assert_eq!(purchase_limit(&v, None), 8);
    }

    #[test]
    fn test_first_active_flash_sale_wins() {
        let a = flash_sale("v1", 20, "2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z");
        let b = flash_sale("v1", 50, "2024-05-01T00:00:00Z", "2024-07-01T00:00:00Z");
        let other = flash_sale("v2", 90, "2024-05-01T00:00:00Z", "2024-07-01T00:00:00Z");
        let entries = vec![other, a, b];
        let found = active_flash_sale(&entries, &VariantId::from("v1"), noon()).unwrap();
        assert_eq!(found.discount_percent, Percent::from_whole(20));
    }

    #[test]
    fn test_product_discount_needs_valid_window() {
        let mut p = product("p1", vec![variant("v1", 1000, 1)]);
        p.discount_percent = Some(Percent::from_whole(10));
        assert!(p.active_discount(noon()).is_none());
        p.discount_start_date = Some("2024-06-01T00:00:00Z".into());
        p.discount_end_date = Some("tomorrow".into());
        assert!(p.active_discount(noon()).is_none());
        p.discount_end_date = Some("2024-06-03T00:00:00Z".into());
        assert!(p.active_discount(noon()).is_some());
        p.discount_percent = Some(Percent::ZERO);
        assert!(p.active_discount(noon()).is_none());
    }

    #[test]
    fn test_variant_for_selection() {
        let colour = |c: &str| AttributeValue { attribute: "colour".into(), value: c.into() };
        let size = |s: &str| AttributeValue { attribute: "size".into(), value: s.into() };
        let mut red_m = variant("red-m", 1000, 1);
        red_m.attribute_values = vec![colour("red"), size("M")];
        let mut red_l = variant("red-l", 1100, 1);
        red_l.attribute_values = vec![colour("red"), size("L")];
        let p = product("p1", vec![red_m, red_l]);
        let found = p.variant_for_selection(&[colour("red"), size("L")]).unwrap();
        assert_eq!(found.id, VariantId::from("red-l"));
        assert!(p.variant_for_selection(&[colour("blue")]).is_none());
        assert!(matches!(p.variant(&VariantId::from("nope")), Err(ProductError::VariantNotFound(_))));
    }

    #[test]
    fn test_product_deserializes_from_wire() {
        let raw = r#"{
            "id": "p1", "shopId": "s1", "discountPercent": 15,
            "discountStartDate": "2024-06-01T00:00:00Z", "discountEndDate": null,
            "variants": [{"id": "v1", "basePrice": 1000, "salePrice": 800, "stockQuantity": 4}],
            "flashSales": [{"variantId": "v1", "startTime": "bad", "endTime": "2024-06-02T00:00:00Z",
                            "discountPercent": 30, "totalQuantity": 10, "maxQuantityPerUser": 2}]
        }"#;
        let p: Product = serde_json::from_str(raw).unwrap();
        assert_eq!(p.variants[0].active_sale_price(), Some(Money::new(800)));
        assert!(p.active_discount(noon()).is_none());
        assert!(p.active_flash_sale(&VariantId::from("v1"), noon()).is_none());
    }
}
