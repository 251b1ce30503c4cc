//! Pure domain: catalog and cart data, pricing and totals.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod totals;
pub mod value_objects;
