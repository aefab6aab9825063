// Money - Signed fixed-point currency amount (2 fraction digits)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minor units per whole currency unit
const CENTS_PER_UNIT: i64 = 100;

/// Errors from parsing a money amount
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("not a valid decimal amount: {0:?}")]
    Invalid(String),

    #[error("amount out of range: {0:?}")]
    OutOfRange(String),
}

/// A currency amount in minor units (cents).
///
/// All arithmetic is exact integer arithmetic; there is no binary
/// floating point anywhere in the ledger. Two fraction digits match
/// real currency minor units, so the 0.01 settlement epsilon is simply
/// "one cent" and comparisons against it are exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Create from minor units
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create from whole currency units, saturating at the i64 range
    pub const fn from_units(units: i64) -> Self {
        Self(units.saturating_mul(CENTS_PER_UNIT))
    }

    /// Minor units
    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute value, saturating at i64::MAX cents
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn checked_neg(self) -> Option<Money> {
        self.0.checked_neg().map(Money)
    }

    /// Split into `parts` equal shares that sum exactly to `self`.
    ///
    /// Each share is the floor of the even division; the remainder is
    /// distributed one cent at a time to the first shares, so the
    /// placement is deterministic for a fixed ordering of recipients.
    /// Returns an empty vector for zero parts.
    pub fn split(self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let n = parts as i64;
        let base = self.0.div_euclid(n);
        let remainder = self.0.rem_euclid(n);
        (0..n)
            .map(|i| Money(if i < remainder { base + 1 } else { base }))
            .collect()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MoneyError::Invalid(s.to_string()));
        }
        if frac.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(MoneyError::Invalid(s.to_string()));
        }

        let units: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| MoneyError::OutOfRange(s.to_string()))?
        };
        let mut frac_cents: i64 = if frac.is_empty() { 0 } else { frac.parse().unwrap_or(0) };
        if frac.len() == 1 {
            frac_cents *= 10;
        }

        let cents = units
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(|| MoneyError::OutOfRange(s.to_string()))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_cents(1200));
        assert_eq!("12.3".parse::<Money>().unwrap(), Money::from_cents(1230));
        assert_eq!("12.34".parse::<Money>().unwrap(), Money::from_cents(1234));
        assert_eq!(".50".parse::<Money>().unwrap(), Money::from_cents(50));
        assert_eq!("-0.01".parse::<Money>().unwrap(), Money::from_cents(-1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
        assert!("12.345".parse::<Money>().is_err());
        assert!("1,50".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("12.-3".parse::<Money>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for cents in [0, 5, 100, 1234, -1234, -7] {
            let m = Money::from_cents(cents);
            assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
        }
        assert_eq!(Money::from_cents(-7).to_string(), "-0.07");
        assert_eq!(Money::from_cents(1200).to_string(), "12.00");
    }

    #[test]
    fn test_split_exact_sum() {
        let amount = Money::from_cents(10000);
        for parts in 1..=13 {
            let shares = amount.split(parts);
            assert_eq!(shares.len(), parts);
            let total: i64 = shares.iter().map(|s| s.cents()).sum();
            assert_eq!(total, amount.cents(), "lost money splitting by {parts}");
        }
    }

    #[test]
    fn test_split_remainder_goes_to_first_shares() {
        // 100.00 / 3 = 33.34 + 33.33 + 33.33
        let shares = Money::from_cents(10000).split(3);
        assert_eq!(
            shares,
            vec![
                Money::from_cents(3334),
                Money::from_cents(3333),
                Money::from_cents(3333)
            ]
        );
    }

    #[test]
    fn test_split_negative_amount_still_exact() {
        let shares = Money::from_cents(-100).split(3);
        let total: i64 = shares.iter().map(|s| s.cents()).sum();
        assert_eq!(total, -100);
    }

    #[test]
    fn test_split_zero_parts_is_empty() {
        assert!(Money::from_cents(500).split(0).is_empty());
    }

    #[test]
    fn test_from_units_saturates_instead_of_overflowing() {
        assert_eq!(Money::from_units(3), Money::from_cents(300));
        assert_eq!(Money::from_units(i64::MAX), Money::from_cents(i64::MAX));
        assert_eq!(Money::from_units(i64::MIN), Money::from_cents(i64::MIN));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::from_cents(i64::MAX);
        assert!(a.checked_add(Money::from_cents(1)).is_none());
        assert_eq!(
            Money::from_cents(300).checked_sub(Money::from_cents(100)),
            Some(Money::from_cents(200))
        );
    }
}
