//! Money value object (cents-based to avoid floating point errors).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Represents money in cents to avoid floating-point arithmetic errors.
///
/// Arithmetic never goes negative: subtraction saturates at zero and percentage
/// amounts round down, so a discount can never exceed the amount it was taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Returns `percent`% of this amount, rounded down.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub const fn checked_percent(self, percent: u32) -> Option<Self> {
        match self.0.checked_mul(percent as u64) {
            Some(product) => Some(Self(product / 100)),
            None => None,
        }
    }

    /// Returns the smaller of two amounts.
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|m| m.0).fold(0u64, u64::saturating_add))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down() {
        assert_eq!(Money::from_cents(999).checked_percent(10), Some(Money::from_cents(99)));
        assert_eq!(Money::from_cents(5).checked_percent(5), Some(Money::ZERO));
    }

    #[test]
    fn saturating_sub_never_goes_negative() {
        let a = Money::from_cents(100);
        assert_eq!(a.saturating_sub(Money::from_cents(250)), Money::ZERO);
    }

    #[test]
    fn display_formats_cents() {
        assert_eq!(Money::from_cents(123_456).to_string(), "1234.56");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn overflow_is_detected() {
        assert_eq!(Money::from_cents(u64::MAX).checked_multiply(2), None);
        assert_eq!(Money::checked_from_units(u64::MAX), None);
    }
}
