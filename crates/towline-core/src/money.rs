//! Money value object for booking costs, payments and provider earnings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Represents a monetary amount in USD.
///
/// Internally stored as microdollars (millionths of a dollar) so that repeated
/// payments and earnings credits never accumulate floating-point drift.
/// Clients send and receive plain dollar floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    /// Amount in microdollars (1 USD = 1,000,000 microdollars)
    microdollars: i64,
}

impl Money {
    const MICRODOLLARS_PER_DOLLAR: i64 = 1_000_000;

    /// Creates Money from a USD dollar amount.
    pub fn from_usd(dollars: f64) -> Self {
        let microdollars = (dollars * Self::MICRODOLLARS_PER_DOLLAR as f64).round() as i64;
        Self { microdollars }
    }

    /// Creates Money from microdollars.
    pub fn from_microdollars(microdollars: i64) -> Self {
        Self { microdollars }
    }

    /// Creates a zero Money value.
    pub const fn zero() -> Self {
        Self { microdollars: 0 }
    }

    /// Returns the amount in USD as a float.
    pub fn as_usd(&self) -> f64 {
        self.microdollars as f64 / Self::MICRODOLLARS_PER_DOLLAR as f64
    }

    /// Returns the amount in whole cents, as payment processors expect.
    pub fn as_cents(&self) -> i64 {
        (self.microdollars as f64 / 10_000.0).round() as i64
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.microdollars == 0
    }

    /// Returns true if the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.microdollars > 0
    }

    /// Subtracts `other`, clamping at zero.
    ///
    /// Outstanding balances never go negative when a customer overpays.
    #[must_use]
    pub fn saturating_sub_floor(&self, other: Money) -> Self {
        Self {
            microdollars: self.microdollars.saturating_sub(other.microdollars).max(0),
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            microdollars: self.microdollars.saturating_add(other.microdollars),
        }
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.microdollars = self.microdollars.saturating_add(other.microdollars);
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(self.as_usd())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let dollars = f64::deserialize(deserializer)?;
        Ok(Money::from_usd(dollars))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.as_usd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_precision() {
        let mut total = Money::zero();
        for _ in 0..10 {
            total += Money::from_usd(0.1);
        }
        assert_eq!(total, Money::from_usd(1.0));
    }

    #[test]
    fn test_money_display_and_cents() {
        assert_eq!(Money::from_usd(45.5).to_string(), "$45.50");
        assert_eq!(Money::from_usd(45.5).as_cents(), 4550);
    }

    #[test]
    fn test_saturating_sub_floor() {
        let balance = Money::from_usd(20.0);
        assert_eq!(balance.saturating_sub_floor(Money::from_usd(5.0)), Money::from_usd(15.0));
        assert!(balance.saturating_sub_floor(Money::from_usd(50.0)).is_zero());
    }

    #[test]
    fn test_money_serializes_as_dollars() {
        assert_eq!(serde_json::to_string(&Money::from_usd(12.5)).unwrap(), "12.5");
        let parsed: Money = serde_json::from_str("80").unwrap();
        assert_eq!(parsed, Money::from_usd(80.0));
    }
}
