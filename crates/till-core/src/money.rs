//! # Money Module
//!
//! Provides the `Money` type for register balances and movement amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A register folds hundreds of movements into one running balance:      │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ drift accumulates per movement   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    "350000.50" ──► 35_000_050 minor units                              │
//! │    Every fold step is exact integer addition                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let opening = Money::from_major(350_000);
//! let sale: Money = "100000.50".parse().unwrap();
//!
//! let balance = opening + sale;
//! assert_eq!(balance.to_string(), "450000.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::CoreError;

/// Number of minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Maximum fractional digits accepted when parsing decimal amounts.
pub const MAX_FRACTION_DIGITS: usize = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A signed monetary value in minor units (hundredths of the currency).
///
/// ## Design Decisions
/// - **i64 (signed)**: balances go negative when expenses exceed cash on hand
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No float constructor**: wire values are parsed from decimal text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(1099).minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from whole major units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole major units (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MINOR_PER_MAJOR
    }

    /// Returns the fractional part as an absolute value (0-99).
    #[inline]
    pub const fn fraction(&self) -> i64 {
        (self.0 % MINOR_PER_MAJOR).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Adds two values, returning `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Parses a decimal string such as `"350000"`, `"-900.5"` or `"+12.00"`.
    ///
    /// ## Rules
    /// - Optional leading `+` or `-`
    /// - At most two fractional digits (anything finer would need rounding)
    /// - ASCII digits only, no thousands separators, no exponent
    /// - Never goes through floating point
    ///
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal_str("12.5").unwrap().minor(), 1250);
    /// assert_eq!(Money::from_decimal_str("-0.05").unwrap().minor(), -5);
    /// assert!(Money::from_decimal_str("1.005").is_err());
    /// assert!(Money::from_decimal_str("abc").is_err());
    /// ```
    pub fn from_decimal_str(raw: &str) -> Result<Money, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidAmount {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let s = raw.trim();
        if s.is_empty() {
            return Err(invalid("empty amount"));
        }

        let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
            (true, rest)
        } else if let Some(rest) = s.strip_prefix('+') {
            (false, rest)
        } else {
            (false, s)
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("no digits"));
        }

        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid("not a decimal number"));
        }

        if frac_part.len() > MAX_FRACTION_DIGITS {
            return Err(invalid("more than two fractional digits"));
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid("out of range"))?
        };

        let mut frac_padded = frac_part.to_string();
        while frac_padded.len() < MAX_FRACTION_DIGITS {
            frac_padded.push('0');
        }
        let frac_val: i64 = frac_padded.parse().map_err(|_| invalid("out of range"))?;

        let minor = int_val
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Money(if negative { -minor } else { minor }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering with two fractional digits and no currency
/// symbol; the front end localizes for display.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.fraction())
    }
}

impl FromStr for Money {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_decimal_str(s)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
