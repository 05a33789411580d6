//! Signed fixed-point amounts scaled by 10^-8.

use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Number of decimal places.
pub const DECIMALS: u32 = 8;

/// Scaling factor (10^8).
pub const FACTOR: i64 = 100_000_000;

/// A signed 64-bit amount with eight implied decimal places.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed8(i64);

impl Fixed8 {
    /// Zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// One whole unit (10^8 raw).
    #[must_use]
    pub const fn one() -> Self {
        Self(FACTOR)
    }

    /// Wrap a raw 10^-8-scaled value.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Whole units, losing the fraction.
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * FACTOR)
    }

    /// The raw scaled value.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.0
    }

    /// Checked addition.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Checked multiplication by an integer scalar.
    #[must_use]
    pub fn checked_mul_int(self, scalar: i64) -> Option<Self> {
        self.0.checked_mul(scalar).map(Self)
    }

    /// True for negative amounts.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Fixed8 {
    type Output = Fixed8;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Fixed8 {
    type Output = Fixed8;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Neg for Fixed8 {
    type Output = Fixed8;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:08}",
            magnitude / FACTOR as u64,
            magnitude % FACTOR as u64
        )
    }
}

impl fmt::Debug for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed8({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Fixed8::from_units(5).to_string(), "5.00000000");
        assert_eq!(Fixed8::from_raw(150_000_000).to_string(), "1.50000000");
        assert_eq!(Fixed8::from_raw(-1).to_string(), "-0.00000001");
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = Fixed8::from_raw(i64::MAX);
        assert!(max.checked_add(Fixed8::one()).is_none());
        assert_eq!(
            Fixed8::from_units(2).checked_add(Fixed8::from_units(3)),
            Some(Fixed8::from_units(5))
        );
    }
}
