//! Cart totals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

use crate::domain::aggregates::cart::{CartSnapshot, ProductCartItem};
use crate::domain::aggregates::product::{Product, Variant};
use crate::domain::pricing::PriceQuote;
use crate::domain::value_objects::{ItemId, Money};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub total_quantity: u32,
    pub total_price: Money,
    pub savings: Money,
}

/// Sums purchasable lines of `cart`, pricing each through `price_of` at `now`.
///
/// Lines whose variant is out of stock, or missing from the product snapshot,
/// are left out of both sums.
pub fn compute<F>(cart: &CartSnapshot, price_of: F, now: DateTime<Utc>) -> CartTotals
where
    F: Fn(&Variant, &Product, DateTime<Utc>) -> PriceQuote,
{
    sum(cart.lines(), price_of, now)
}

/// Like [`compute`], restricted to the lines picked for checkout.
pub fn compute_selected<F>(cart: &CartSnapshot, selected: &HashSet<ItemId>, price_of: F, now: DateTime<Utc>) -> CartTotals
where
    F: Fn(&Variant, &Product, DateTime<Utc>) -> PriceQuote,
{
    sum(cart.lines().filter(|line| selected.contains(&line.id)), price_of, now)
}

fn sum<'a, F>(lines: impl Iterator<Item = &'a ProductCartItem>, price_of: F, now: DateTime<Utc>) -> CartTotals
where
    F: Fn(&Variant, &Product, DateTime<Utc>) -> PriceQuote,
{
    lines.fold(CartTotals::default(), |totals, line| {
        let variant = match line.variant() {
            Ok(variant) => variant,
            Err(err) => {
                warn!(item_id = %line.id, %err, "cart line skipped in totals");
                return totals;
            }
        };
        if !variant.is_in_stock() { return totals; }
        let quote = price_of(variant, &line.product, now);
        CartTotals {
            total_quantity: totals.total_quantity.saturating_add(line.quantity),
            total_price: totals.total_price.add(quote.effective_price.multiply(line.quantity)),
            savings: totals.savings.add(quote.savings().multiply(line.quantity)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::fixtures::{line, shop};
    use crate::domain::aggregates::product::fixtures::flash_sale;
    use crate::domain::pricing::{resolve, resolve_for};
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

    fn by_product(variant: &Variant, product: &Product, now: DateTime<Utc>) -> PriceQuote {
        resolve_for(product, variant, now)
    }

    #[test]
    fn test_zero_stock_lines_are_excluded() {
        let cart = CartSnapshot { shops: vec![shop("s1", vec![line("gone", 1000, 0, 3), line("ok", 500, 4, 2)])] };
        let totals = compute(&cart, by_product, noon());
        assert_eq!(totals.total_quantity, 2);
        assert_eq!(totals.total_price, Money::new(1000));
        assert_eq!(cart.line_count(), 2);
    }

    #[test]
    fn test_totals_use_promotional_price() {
        let mut promo = line("promo", 1000, 5, 2);
        promo.product.flash_sales = vec![flash_sale("promo-v", 25, "2024-06-01T00:00:00Z", "2024-06-02T00:00:00Z")];
        let cart = CartSnapshot { shops: vec![shop("s1", vec![promo]), shop("s2", vec![line("plain", 300, 1, 1)])] };
        let totals = compute(&cart, by_product, noon());
        assert_eq!(totals.total_quantity, 3);
        assert_eq!(totals.total_price, Money::new(750 * 2 + 300));
        assert_eq!(totals.savings, Money::new(500));
    }

    #[test]
    fn test_resolver_is_injected() {
        let cart = CartSnapshot { shops: vec![shop("s1", vec![line("a", 1000, 5, 2)])] };
        let no_flash_sales = |v: &Variant, p: &Product, now| resolve(v, p, &[], now);
        assert_eq!(compute(&cart, no_flash_sales, noon()).total_price, Money::new(2000));
    }

    #[test]
    fn test_compute_selected() {
        let cart = CartSnapshot { shops: vec![shop("s1", vec![line("a", 100, 5, 1), line("b", 200, 5, 2), line("c", 300, 0, 1)])] };
        let selected = HashSet::from([ItemId::from("b"), ItemId::from("c")]);
        let totals = compute_selected(&cart, &selected, by_product, noon());
        assert_eq!(totals, CartTotals { total_quantity: 2, total_price: Money::new(400), savings: Money::ZERO });
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        assert_eq!(compute(&CartSnapshot::default(), by_product, noon()), CartTotals::default());
    }
}
