//! Aggregates module
pub mod product;
pub mod cart;

pub use product::{
    active_flash_sale, purchase_limit, AttributeDefinition, AttributeValue, FlashSaleEntry, Product, ProductError, Variant,
};
pub use cart::{CartItem, CartSnapshot, ProductCartItem, ShopRef};
