//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are snapshots taken when an item is added to the cart or wishlist;
//! they are never re-fetched. On the wire and in device storage they are plain
//! JSON numbers, which is what the commerce API and the persisted cookie use.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A price in the store currency (INR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(Decimal);

impl Price {
    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from a whole number of rupees.
    #[must_use]
    pub fn from_units(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Get the decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Format for display (e.g., "₹1299.00").
    #[must_use]
    pub fn display(&self) -> String {
        format!("₹{:.2}", self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    /// Accepts both JSON numbers and numeric strings.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        rust_decimal::serde::float::deserialize(deserializer).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_serializes_as_number() {
        let json = serde_json::to_value(Price::from_units(100)).ok();
        assert_eq!(json, Some(serde_json::json!(100.0)));
    }

    #[test]
    fn test_price_deserializes_number_and_string() {
        let from_number: Option<Price> = serde_json::from_str("149.5").ok();
        let from_string: Option<Price> = serde_json::from_str("\"149.5\"").ok();
        assert_eq!(from_number, Some(Price::new(Decimal::new(1495, 1))));
        assert_eq!(from_string, from_number);
    }

    #[test]
    fn test_price_arithmetic() {
        let line = Price::from_units(100) * 2;
        assert_eq!(line, Price::from_units(200));
        let total: Price = [Price::from_units(1), Price::from_units(2)].into_iter().sum();
        assert_eq!(total, Price::from_units(3));
    }

    #[test]
    fn test_price_display() {
        assert_eq!(Price::from_units(200).display(), "₹200.00");
    }
}
