//! # Money Module
//!
//! `Money` (integer minor units) and `Rate` (basis points), plus the one
//! rounding rule the engine allows: half away from zero.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    25.80 × 0.08 in f64 = 2.0640000000000001                             │
//! │    0.1 + 0.2           = 0.30000000000000004                            │
//! │                                                                         │
//! │  OUR SOLUTION: cents × basis points, rounded exactly once               │
//! │    2580 × 800 / 10000 = 206.4  → 206  (half away from zero)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! Banker's rounding is NOT used anywhere. Every product of money and a rate
//! is rounded half away from zero to the minor unit at the point it is made:
//!
//! | exact      | rounded |
//! |------------|---------|
//! | 2.064      | 2.06    |
//! | 2.065      | 2.07    |
//! | -2.065     | -2.07   |
//!
//! ## Usage
//! ```rust
//! use mercato_core::money::{Money, Rate};
//!
//! let excess = Money::from_cents(2580);        // 25.80
//! let share = excess.apply_rate(Rate::from_bps(800)); // × 8%
//! assert_eq!(share.cents(), 206);              // 2.06
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Basis points in one whole (100%).
const BPS_PER_UNIT: i128 = 10_000;

/// Minor units in one major unit.
const CENTS_PER_UNIT: i64 = 100;

// =============================================================================
// Rounding
// =============================================================================

/// Integer division rounding half away from zero.
///
/// `denominator` must be positive.
#[inline]
fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        -((-numerator + half) / denominator)
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units (cents). Single currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: profit and excess can go negative before clamping
/// - **Serialized as the raw integer**: JSON columns carry minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole major units.
    ///
    /// ```rust
    /// use mercato_core::money::Money;
    /// assert_eq!(Money::from_major(4).cents(), 400);
    /// ```
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * CENTS_PER_UNIT)
    }

    /// Parses a decimal string ("12.5", "-3", "0.005") into Money.
    ///
    /// Extra precision is rounded half away from zero. Returns `None` for
    /// anything that is not a plain decimal number.
    ///
    /// ```rust
    /// use mercato_core::money::Money;
    /// assert_eq!(Money::parse("12.5").unwrap().cents(), 1250);
    /// assert_eq!(Money::parse("0.005").unwrap().cents(), 1);
    /// assert!(Money::parse("twelve").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        Decimal::from_str(value.trim()).ok().and_then(Money::from_decimal)
    }

    /// Rounds a major-unit decimal to whole cents, half away from zero.
    /// `None` when the value does not fit.
    pub fn from_decimal(major: Decimal) -> Option<Self> {
        let cents = major
            .checked_mul(Decimal::from(CENTS_PER_UNIT))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        cents.to_i64().map(Money)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero.
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

    /// Clamps negative values to zero.
    ///
    /// Used everywhere a price, cost or subsidy must be `≥ 0`.
    #[inline]
    pub const fn non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Multiplies by an integer quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Multiplies by a rate, rounding half away from zero to the minor unit.
    ///
    /// ```rust
    /// use mercato_core::money::{Money, Rate};
    ///
    /// // 60.00 × 45% = 27.00
    /// assert_eq!(Money::from_major(60).apply_rate(Rate::from_bps(4500)).cents(), 2700);
    /// // 0.05 × 50% = 0.025 → 0.03
    /// assert_eq!(Money::from_cents(5).apply_rate(Rate::from_bps(5000)).cents(), 3);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let scaled = self.0 as i128 * rate.bps() as i128;
        Money(div_round_half_away(scaled, BPS_PER_UNIT) as i64)
    }

    /// Clamps into `[min, max]`.
    #[inline]
    pub fn clamp_between(self, min: Money, max: Money) -> Money {
        if self < min {
            min
        } else if self > max {
            max
        } else {
            self
        }
    }

    /// Decimal representation with two places, e.g. `"26.26"`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!(
            "{}{}.{:02}",
            sign,
            (self.0 / CENTS_PER_UNIT).abs(),
            (self.0 % CENTS_PER_UNIT).abs()
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A proportional rate in basis points. `800` = 8%, `4500` = 45%.
///
/// ## Why Basis Points?
/// Every configured rate in the engine (0.5 per item, 0.08 profit share,
/// 0.45 base commission) has at most four decimal places, so basis points
/// represent all of them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Parses a decimal fraction ("0.08", "0.45", "1") into a rate.
    ///
    /// Negative or non-numeric input yields `None`.
    ///
    /// ```rust
    /// use mercato_core::money::Rate;
    /// assert_eq!(Rate::parse("0.08").unwrap().bps(), 800);
    /// assert_eq!(Rate::parse("0.6").unwrap().bps(), 6000);
    /// assert!(Rate::parse("-0.1").is_none());
    /// ```
    pub fn parse(value: &str) -> Option<Self> {
        let decimal = Decimal::from_str(value.trim()).ok()?;
        if decimal.is_sign_negative() {
            return None;
        }
        let bps = (decimal * Decimal::from(BPS_PER_UNIT as i64))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        bps.to_u32().map(Rate)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Decimal fraction string, e.g. `"0.0800"`.
    pub fn to_decimal_string(&self) -> String {
        Decimal::new(self.0 as i64, 4).to_string()
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(div_round_half_away(25, 10), 3);
        assert_eq!(div_round_half_away(24, 10), 2);
        assert_eq!(div_round_half_away(-25, 10), -3);
        assert_eq!(div_round_half_away(-24, 10), -2);
        assert_eq!(div_round_half_away(0, 10), 0);
    }

    #[test]
    fn test_profit_share_rounding() {
        // 25.80 × 8% = 2.064 → 2.06
        let share = Money::from_cents(2580).apply_rate(Rate::from_bps(800));
        assert_eq!(share.cents(), 206);

        // 20.65 × 10% = 2.065 → 2.07
        let share = Money::from_cents(2065).apply_rate(Rate::from_bps(1000));
        assert_eq!(share.cents(), 207);

        let negative = Money::from_cents(-2065).apply_rate(Rate::from_bps(1000));
        assert_eq!(negative.cents(), -207);
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(Money::parse("4").unwrap(), Money::from_major(4));
        assert_eq!(Money::parse(" 0.5 ").unwrap().cents(), 50);
        assert_eq!(Money::parse("-3.125").unwrap().cents(), -313);
        assert!(Money::parse("").is_none());
        assert!(Money::parse("abc").is_none());
        assert!(Money::parse("79228162514264337593543950335").is_none());
        assert_eq!(Money::from_decimal(Decimal::new(6_660, 3)).unwrap().cents(), 666);
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(Rate::parse("0.45").unwrap().bps(), 4500);
        assert_eq!(Rate::parse("0.2").unwrap().bps(), 2000);
        assert_eq!(Rate::parse("0").unwrap(), Rate::zero());
        assert!(Rate::parse("x").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(2626).to_string(), "26.26");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Rate::from_bps(800).to_decimal_string(), "0.0800");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(450);
        assert_eq!((a + b).cents(), 1450);
        assert_eq!((a - b).cents(), 550);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!((-a).cents(), -1000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 1900);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(Money::from_cents(-1).non_negative(), Money::zero());
        assert_eq!(Money::from_cents(7).non_negative().cents(), 7);

        let max = Money::from_major(50);
        assert_eq!(Money::from_major(80).clamp_between(Money::zero(), max), max);
        assert_eq!(
            Money::from_cents(-10).clamp_between(Money::zero(), max),
            Money::zero()
        );
    }
}
