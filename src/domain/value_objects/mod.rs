//! Value Objects for the storefront cart

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
            pub fn generate() -> Self { Self(uuid::Uuid::now_v7().to_string()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self(value.to_string()) }
        }
    };
}

string_id!(
    /// Cart line identifier, as assigned by the remote cart service.
    ItemId
);
string_id!(ProductId);
string_id!(VariantId);
string_id!(ShopId);

/// Money value object in the smallest currency unit.
///
/// Amounts read off the wire must not be negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("money amount {0} is negative")]
pub struct NegativeAmount(pub i64);

impl TryFrom<i64> for Money {
    type Error = NegativeAmount;

    fn try_from(amount: i64) -> Result<Self, Self::Error> {
        if amount < 0 { Err(NegativeAmount(amount)) } else { Ok(Self(amount)) }
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self { money.0 }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(amount: i64) -> Self { Self(amount) }
    pub fn amount(&self) -> i64 { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0.saturating_add(other.0)) }
    pub fn saturating_sub(&self, other: Money) -> Money { Money(self.0.saturating_sub(other.0)) }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }

    /// Applies a percentage discount, rounding half-up at the smallest unit.
    ///
    /// The percentage is clamped to `[0, 100]`, so the result never exceeds
    /// the original amount.
    pub fn discounted_by(&self, percent: Percent) -> Money {
        let keep = Decimal::ONE_HUNDRED - percent.value();
        let scaled = Decimal::from(self.0) * keep / Decimal::ONE_HUNDRED;
        let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Money(i64::try_from(rounded).unwrap_or(self.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Discount percentage, always within `[0, 100]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Percent(Decimal);

impl Percent {
    pub const ZERO: Percent = Percent(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self { Self(value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)) }
    pub fn from_whole(value: u32) -> Self { Self::new(Decimal::from(value)) }
    pub fn value(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// Share of `base` that `savings` represents, rounded to a whole percent.
    pub fn between(base: Money, savings: Money) -> Self {
        if base.amount() <= 0 { return Self::ZERO; }
        let ratio = Decimal::from(savings.amount()) * Decimal::ONE_HUNDRED / Decimal::from(base.amount());
        Self::new(ratio.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl From<Decimal> for Percent {
    fn from(value: Decimal) -> Self { Self::new(value) }
}

impl From<Percent> for Decimal {
    fn from(value: Percent) -> Self { value.0 }
}

/// Quantity value object for cart lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const MIN: Quantity = Quantity(1);

    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Clamps a requested quantity to `[1, max_allowed]`.
    ///
    /// A `max_allowed` of zero still yields one: a line never drops below a
    /// single unit through quantity edits, only through deletion.
    pub fn clamped(requested: i64, max_allowed: u32) -> Self {
        let upper = i64::from(max_allowed.max(1));
        let value = requested.clamp(1, upper);
        Self(u32::try_from(value).unwrap_or(1))
    }
}

impl Default for Quantity { fn default() -> Self { Self::MIN } }

/// Parses an optional wire timestamp, returning `None` when missing or malformed.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC).
pub fn parse_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() { return None; }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Half-open `[start, end)` window check over optional wire timestamps.
pub fn window_contains(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> bool {
    match (parse_instant(start), parse_instant(end)) {
        (Some(start), Some(end)) => start < end && start <= now && now < end,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_negative_amounts_rejected_on_the_wire() {
        assert_eq!(serde_json::from_str::<Money>("1500").ok(), Some(Money::new(1500)));
        assert!(serde_json::from_str::<Money>("-1").is_err());
        assert_eq!(Money::try_from(-20), Err(NegativeAmount(-20)));
        assert_eq!(serde_json::to_string(&Money::new(42)).ok().as_deref(), Some("42"));
    }

    #[test]
    fn test_discount_rounds_half_up() {
        assert_eq!(Money::new(100_000).discounted_by(Percent::from_whole(20)), Money::new(80_000));
        assert_eq!(Money::new(15).discounted_by(Percent::from_whole(10)), Money::new(14)); // 13.5
        assert_eq!(Money::new(25).discounted_by(Percent::from_whole(10)), Money::new(23)); // 22.5
        assert_eq!(Money::new(999).discounted_by(Percent::from_whole(10)), Money::new(899)); // 899.1
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(Percent::new(Decimal::new(150, 0)).value(), Decimal::ONE_HUNDRED);
        assert_eq!(Percent::new(Decimal::new(-5, 0)), Percent::ZERO);
        assert_eq!(Money::new(500).discounted_by(Percent::new(Decimal::new(250, 0))), Money::ZERO);
    }

    #[test]
    fn test_percent_between() {
        assert_eq!(Percent::between(Money::new(1000), Money::new(250)), Percent::from_whole(25));
        assert_eq!(Percent::between(Money::ZERO, Money::new(10)), Percent::ZERO);
    }

    #[test]
    fn test_quantity_clamped() {
        assert_eq!(Quantity::clamped(11, 5).value(), 5);
        assert_eq!(Quantity::clamped(-3, 5).value(), 1);
        assert_eq!(Quantity::clamped(0, 0).value(), 1);
        assert_eq!(Quantity::clamped(3, 5).value(), 3);
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single();
        assert_eq!(parse_instant(Some("2024-05-01T10:00:00Z")), expected);
        assert_eq!(parse_instant(Some("2024-05-01T12:00:00+02:00")), expected);
        assert_eq!(parse_instant(Some("2024-05-01T10:00:00")), expected);
        assert_eq!(parse_instant(Some("2024-05-01T10:00:00.000")), expected);
        assert_eq!(parse_instant(Some("not a date")), None);
        assert_eq!(parse_instant(Some("")), None);
        assert_eq!(parse_instant(None), None);
    }

    #[test]
    fn test_window_is_half_open() {
        let start = "2024-05-01T00:00:00Z";
        let end = "2024-05-02T00:00:00Z";
        let at = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).single().unwrap_or_default();
        assert!(window_contains(Some(start), Some(end), at(0)));
        assert!(window_contains(Some(start), Some(end), at(23)));
        let at_end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).single().unwrap_or_default();
        assert!(!window_contains(Some(start), Some(end), at_end));
        assert!(!window_contains(Some(end), Some(start), at(12)));
        assert!(!window_contains(None, Some(end), at(12)));
        assert!(!window_contains(Some(start), Some("garbage"), at(12)));
    }
}
