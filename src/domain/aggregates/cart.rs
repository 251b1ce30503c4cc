//! Cart snapshot, the client-side mirror of the remote cart.
//!
//! Shops and lines keep the order the remote service returned them in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::aggregates::product::{Product, ProductError, Variant};
use crate::domain::value_objects::{ItemId, ShopId, VariantId};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub shops: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRef { pub id: ShopId, #[serde(default)] pub name: String }

/// All lines a cart holds for a single shop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub shop: ShopRef,
    #[serde(default)]
    pub items: Vec<ProductCartItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCartItem {
    pub id: ItemId,
    pub product: Product,
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl PartialEq for ProductCartItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.variant_id == other.variant_id && self.quantity == other.quantity
    }
}

impl ProductCartItem {
    pub fn variant(&self) -> Result<&Variant, ProductError> { self.product.variant(&self.variant_id) }

    /// Zero-stock lines stay in the cart but cannot be selected or counted.
    pub fn is_purchasable(&self) -> bool { self.variant().map(Variant::is_in_stock).unwrap_or(false) }
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool { self.shops.iter().all(|shop| shop.items.is_empty()) }

    pub fn lines(&self) -> impl Iterator<Item = &ProductCartItem> { self.shops.iter().flat_map(|shop| shop.items.iter()) }

    pub fn line_count(&self) -> usize { self.lines().count() }

    pub fn line(&self, id: &ItemId) -> Option<&ProductCartItem> { self.lines().find(|line| &line.id == id) }

    /// Removes a line, dropping its shop group once empty.
    pub fn remove_line(&mut self, id: &ItemId) -> bool {
        let before = self.line_count();
        for shop in &mut self.shops { shop.items.retain(|line| &line.id != id); }
        self.shops.retain(|shop| !shop.items.is_empty());
        self.line_count() != before
    }

    pub fn clear(&mut self) { self.shops.clear(); }

    /// Copy of this snapshot with local quantities laid over the remote ones.
    pub fn with_quantities(&self, overrides: &HashMap<ItemId, u32>) -> CartSnapshot {
        let mut overlaid = self.clone();
        for shop in &mut overlaid.shops {
            for line in &mut shop.items {
                if let Some(quantity) = overrides.get(&line.id) { line.quantity = *quantity; }
            }
        }
        overlaid
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::aggregates::product::fixtures::{product, variant};

    pub fn line(id: &str, base: i64, stock: u32, quantity: u32) -> ProductCartItem {
        let variant_id = format!("{id}-v");
        ProductCartItem {
            id: ItemId::from(id),
            product: product(&format!("{id}-p"), vec![variant(&variant_id, base, stock)]),
            variant_id: VariantId::new(variant_id),
            quantity,
        }
    }

    pub fn shop(id: &str, items: Vec<ProductCartItem>) -> CartItem {
        CartItem { shop: ShopRef { id: ShopId::from(id), name: format!("Shop {id}") }, items }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_cart_operations() {
        let mut cart = CartSnapshot { shops: vec![shop("s1", vec![line("a", 100, 1, 1), line("b", 200, 0, 2)]), shop("s2", vec![line("c", 50, 3, 1)])] };
        assert_eq!(cart.line_count(), 3);
        assert!(!cart.line(&ItemId::from("b")).is_some_and(ProductCartItem::is_purchasable));
        assert!(cart.remove_line(&ItemId::from("c")));
        assert_eq!(cart.shops.len(), 1); // empty shop dropped
        assert!(!cart.remove_line(&ItemId::from("c")));
        let order: Vec<_> = cart.lines().map(|l| l.id.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_with_quantities_overlays_known_lines() {
        let cart = CartSnapshot { shops: vec![shop("s1", vec![line("a", 100, 5, 1), line("b", 100, 5, 2)])] };
        let overlaid = cart.with_quantities(&HashMap::from([(ItemId::from("a"), 4), (ItemId::from("zz"), 9)]));
        assert_eq!(overlaid.line(&ItemId::from("a")).map(|l| l.quantity), Some(4));
        assert_eq!(overlaid.line(&ItemId::from("b")).map(|l| l.quantity), Some(2));
        assert_eq!(cart.line(&ItemId::from("a")).map(|l| l.quantity), Some(1));
    }
}
