//! # Rider Payout
//!
//! What the platform pays a rider for one order, and what the order earns.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base        max(0, delivery_base_fee)                                  │
//! │  isolated    max(0, subsidy) if no live order within isolated distance  │
//! │  item        ceil(Σ delivery_count × qty), capped, banded by threshold  │
//! │  urgent      max(0, subsidy) if the order is urgent                     │
//! │  weather     subsidy if the reading is extreme                          │
//! │  ─────────────────────────────────────────────                          │
//! │  without_profit = base + isolated + item + urgent + weather             │
//! │                                                                         │
//! │  profit share:                                                          │
//! │    profit ≤ threshold            → 0                                    │
//! │    excess = profit − without_profit ≤ 0 → 0                             │
//! │    else clamp(excess × rate, 0, max), half away from zero               │
//! │                                                                         │
//! │  rider payable = platform cost = without_profit + share                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Isolation and weather are inputs here; finding neighbours and asking the
//! weather service happen in the db crate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::geo::GeoPoint;
use crate::money::{Money, Rate};
use crate::ports::SettingsStore;
use crate::weather::WeatherInfo;

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the payout formula, read from system settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderPayoutConfig {
    pub base_fee: Money,
    pub isolated_subsidy: Money,
    pub isolated_distance_km: f64,
    pub item_threshold_low: i64,
    /// Paid per counted item in the low band, in major units. Only the
    /// product with the count is rounded to cents.
    pub item_rate_low: Decimal,
    pub item_threshold_high: i64,
    /// Paid per counted item in the high band.
    pub item_rate_high: Decimal,
    pub item_max_count: i64,
    pub urgent_subsidy: Money,
    pub weather_subsidy: Money,
    pub extreme_temp: f64,
    pub profit_threshold: Money,
    pub profit_share_rate: Rate,
    pub max_profit_share: Money,
}

impl Default for RiderPayoutConfig {
    fn default() -> Self {
        Self {
            base_fee: Money::from_major(4),
            isolated_subsidy: Money::from_major(3),
            isolated_distance_km: 8.0,
            item_threshold_low: 5,
            item_rate_low: Decimal::new(50, 2),
            item_threshold_high: 10,
            item_rate_high: Decimal::new(60, 2),
            item_max_count: 50,
            urgent_subsidy: Money::from_major(10),
            weather_subsidy: Money::from_major(1),
            extreme_temp: 37.0,
            profit_threshold: Money::from_major(25),
            profit_share_rate: Rate::from_bps(800),
            max_profit_share: Money::from_major(50),
        }
    }
}

fn money_setting<S: SettingsStore + ?Sized>(settings: &S, key: &str, default: Money) -> Money {
    settings
        .get(key)
        .and_then(|v| Money::parse(&v))
        .unwrap_or(default)
}

fn parsed_setting<S: SettingsStore + ?Sized, T: FromStr>(settings: &S, key: &str, default: T) -> T {
    settings
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl RiderPayoutConfig {
    /// Reads every tunable, falling back to the default when a key is
    /// missing or does not parse.
    pub fn from_settings<S: SettingsStore + ?Sized>(settings: &S) -> Self {
        let d = Self::default();
        Self {
            base_fee: money_setting(settings, "delivery_base_fee", d.base_fee),
            isolated_subsidy: money_setting(settings, "delivery_isolated_subsidy", d.isolated_subsidy),
            isolated_distance_km: parsed_setting(settings, "delivery_isolated_distance", d.isolated_distance_km),
            item_threshold_low: parsed_setting(settings, "delivery_item_threshold_low", d.item_threshold_low),
            item_rate_low: parsed_setting(settings, "delivery_item_rate_low", d.item_rate_low),
            item_threshold_high: parsed_setting(settings, "delivery_item_threshold_high", d.item_threshold_high),
            item_rate_high: parsed_setting(settings, "delivery_item_rate_high", d.item_rate_high),
            item_max_count: parsed_setting(settings, "delivery_item_max_count", d.item_max_count),
            urgent_subsidy: money_setting(settings, "delivery_urgent_subsidy", d.urgent_subsidy),
            weather_subsidy: money_setting(settings, "delivery_weather_subsidy", d.weather_subsidy),
            extreme_temp: parsed_setting(settings, "delivery_extreme_temp", d.extreme_temp),
            profit_threshold: money_setting(settings, "delivery_profit_threshold", d.profit_threshold),
            profit_share_rate: settings
                .get("delivery_profit_share_rate")
                .and_then(|v| Rate::parse(&v))
                .unwrap_or(d.profit_share_rate),
            max_profit_share: money_setting(settings, "delivery_max_profit_share", d.max_profit_share),
        }
    }
}

// =============================================================================
// Calculation Record
// =============================================================================

/// Breakdown persisted on the order as `delivery_fee_calculation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryFeeCalculation {
    pub base_fee: Money,
    pub isolated_fee: Money,
    pub item_fee: Money,
    pub urgent_fee: Money,
    pub weather_fee: Money,
    pub delivery_fee_without_profit: Money,
    pub profit_share: Money,
    pub rider_payable_fee: Money,
    pub total_platform_cost: Money,
}

impl DeliveryFeeCalculation {
    /// What the rider is shown: the share is folded into the payable total
    /// but not itemised.
    pub fn rider_view(&self) -> Self {
        Self {
            profit_share: Money::zero(),
            ..*self
        }
    }
}

/// One order line as the payout formula sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutLine {
    pub quantity: i64,
    /// Normalised delivery weight (see [`crate::pricing::delivery_count`]).
    pub delivery_count: f64,
}

/// Everything the formula needs about one order.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutInput<'a> {
    pub lines: &'a [PayoutLine],
    pub is_isolated: bool,
    pub is_urgent: bool,
    pub weather: Option<&'a WeatherInfo>,
    pub order_profit: Money,
}

// =============================================================================
// Subsidies
// =============================================================================

/// Weighted item count, rounded up and capped at `max`.
///
/// ```rust
/// use mercato_core::rider_payout::{counted_items, PayoutLine};
///
/// let lines = [PayoutLine { quantity: 3, delivery_count: 1.5 }];
/// assert_eq!(counted_items(&lines, 50), 5); // 4.5 rounds up
/// ```
pub fn counted_items(lines: &[PayoutLine], max: i64) -> i64 {
    let weighted: f64 = lines
        .iter()
        .map(|l| l.delivery_count * l.quantity as f64)
        .sum();
    // Absorb float noise such as 1.1 × 10 = 11.000000000000002.
    let counted = (weighted - 1e-9).ceil().max(0.0) as i64;
    counted.min(max.max(0))
}

/// `rate × counted items` for the band the count falls in, never negative.
pub fn item_fee(config: &RiderPayoutConfig, lines: &[PayoutLine]) -> Money {
    let count = counted_items(lines, config.item_max_count);
    if count < config.item_threshold_low {
        return Money::zero();
    }
    let rate = if count < config.item_threshold_high {
        config.item_rate_low
    } else {
        config.item_rate_high
    };
    rate.checked_mul(Decimal::from(count))
        .and_then(Money::from_decimal)
        .unwrap_or_default()
        .non_negative()
}

/// No coordinates means not isolated; otherwise isolated when no other live
/// order lies within the configured distance.
pub fn is_isolated(origin: Option<GeoPoint>, live_neighbours: &[GeoPoint], distance_km: f64) -> bool {
    match origin {
        None => false,
        Some(origin) => !live_neighbours.iter().any(|p| origin.within(p, distance_km)),
    }
}

/// Share of profit above the fees, clamped to `[0, max_profit_share]`.
pub fn profit_share(config: &RiderPayoutConfig, order_profit: Money, without_profit: Money) -> Money {
    if order_profit <= config.profit_threshold {
        return Money::zero();
    }
    let excess = order_profit - without_profit;
    if !excess.is_positive() {
        return Money::zero();
    }
    excess
        .apply_rate(config.profit_share_rate)
        .clamp_between(Money::zero(), config.max_profit_share.non_negative())
}

/// Runs the full formula.
pub fn calculate(config: &RiderPayoutConfig, input: &PayoutInput<'_>) -> DeliveryFeeCalculation {
    let base_fee = config.base_fee.non_negative();
    let isolated_fee = if input.is_isolated {
        config.isolated_subsidy.non_negative()
    } else {
        Money::zero()
    };
    let item_fee = item_fee(config, input.lines);
    let urgent_fee = if input.is_urgent {
        config.urgent_subsidy.non_negative()
    } else {
        Money::zero()
    };
    let weather_fee = match input.weather {
        Some(w) if w.is_extreme(config.extreme_temp) => config.weather_subsidy,
        _ => Money::zero(),
    };

    let without_profit = base_fee + isolated_fee + item_fee + urgent_fee + weather_fee;
    let share = profit_share(config, input.order_profit, without_profit);
    let payable = without_profit + share;

    DeliveryFeeCalculation {
        base_fee,
        isolated_fee,
        item_fee,
        urgent_fee,
        weather_fee,
        delivery_fee_without_profit: without_profit,
        profit_share: share,
        rider_payable_fee: payable,
        total_platform_cost: payable,
    }
}

// =============================================================================
// Order Profit
// =============================================================================

/// `max(0, goods − Σ unit_cost × qty)`. Negative costs count as zero.
pub fn order_profit<I>(goods_amount: Money, costs: I) -> Money
where
    I: IntoIterator<Item = (Money, i64)>,
{
    let total_cost: Money = costs
        .into_iter()
        .map(|(unit_cost, qty)| unit_cost.non_negative().multiply_quantity(qty))
        .sum();
    (goods_amount - total_cost).non_negative()
}

/// `order_profit − total_platform_cost`; may be negative.
#[inline]
pub fn net_profit(order_profit: Money, calculation: &DeliveryFeeCalculation) -> Money {
    order_profit - calculation.total_platform_cost
}

// =============================================================================
// Unit Tests
// =============================================================================
