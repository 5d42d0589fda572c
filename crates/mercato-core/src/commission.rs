//! # Sales Commission
//!
//! Per-order commission for the salesperson who owns the buyer.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  profit = order_amount − goods_cost − delivery_cost                     │
//! │                                                                         │
//! │  profit ≤ min_profit  ──►  invalid order, every amount 0                │
//! │                                                                         │
//! │  base        = profit × base_rate                  (45%)                │
//! │  new bonus   = profit × new_customer_rate if first (20%)                │
//! │  tier        = profit × tier_rate(month sales)     (0 / 5 / 10 / 20%)   │
//! │  total       = base + new bonus + tier                                  │
//! │                                                                         │
//! │  month sales  > 50k ─► tier 1,  > 100k ─► tier 2,  > 200k ─► tier 3     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tier commission is a full top-up: when the month crosses a threshold,
//! every valid row of that month is re-tiered, not just the newest one.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};
use crate::rider_payout::DeliveryFeeCalculation;
use crate::types::string_enum;

// =============================================================================
// Configuration
// =============================================================================

/// Per-salesperson rates and tier thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub employee_code: String,
    pub base_rate: Rate,
    pub new_customer_rate: Rate,
    pub tier1_threshold: Money,
    pub tier1_rate: Rate,
    pub tier2_threshold: Money,
    pub tier2_rate: Rate,
    pub tier3_threshold: Money,
    pub tier3_rate: Rate,
    pub min_profit: Money,
}

impl CommissionConfig {
    pub fn defaults_for(employee_code: &str) -> Self {
        Self {
            employee_code: employee_code.to_string(),
            base_rate: Rate::from_bps(4500),
            new_customer_rate: Rate::from_bps(2000),
            tier1_threshold: Money::from_major(50_000),
            tier1_rate: Rate::from_bps(500),
            tier2_threshold: Money::from_major(100_000),
            tier2_rate: Rate::from_bps(1000),
            tier3_threshold: Money::from_major(200_000),
            tier3_rate: Rate::from_bps(2000),
            min_profit: Money::from_major(5),
        }
    }

    /// Highest tier whose threshold the month's sales strictly exceed.
    ///
    /// ```rust
    /// use mercato_core::commission::CommissionConfig;
    /// use mercato_core::money::Money;
    ///
    /// let config = CommissionConfig::defaults_for("10001");
    /// assert_eq!(config.tier_for(Money::from_major(50_000)).0, 0);
    /// assert_eq!(config.tier_for(Money::from_cents(5_000_001)).0, 1);
    /// assert_eq!(config.tier_for(Money::from_major(250_000)).0, 3);
    /// ```
    pub fn tier_for(&self, month_total_sales: Money) -> (u8, Rate) {
        if month_total_sales > self.tier3_threshold {
            (3, self.tier3_rate)
        } else if month_total_sales > self.tier2_threshold {
            (2, self.tier2_rate)
        } else if month_total_sales > self.tier1_threshold {
            (1, self.tier1_rate)
        } else {
            (0, Rate::zero())
        }
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Inputs gathered from a settled order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionInput {
    pub order_amount: Money,
    pub goods_cost: Money,
    pub delivery_cost: Money,
    pub is_new_customer: bool,
    pub month_total_sales: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub order_profit: Money,
    pub base_commission: Money,
    pub new_customer_bonus: Money,
    pub tier_commission: Money,
    pub total_commission: Money,
    pub tier_level: u8,
    pub is_valid_order: bool,
    pub is_new_customer_order: bool,
}

pub fn calculate(config: &CommissionConfig, input: CommissionInput) -> CommissionBreakdown {
    let profit = input.order_amount - input.goods_cost - input.delivery_cost;
    if profit <= config.min_profit {
        return CommissionBreakdown {
            order_profit: profit,
            ..Default::default()
        };
    }

    let base = profit.apply_rate(config.base_rate);
    let bonus = if input.is_new_customer {
        profit.apply_rate(config.new_customer_rate)
    } else {
        Money::zero()
    };
    let (tier_level, tier_rate) = config.tier_for(input.month_total_sales);
    let tier = profit.apply_rate(tier_rate);

    CommissionBreakdown {
        order_profit: profit,
        base_commission: base,
        new_customer_bonus: bonus,
        tier_commission: tier,
        total_commission: base + bonus + tier,
        tier_level,
        is_valid_order: true,
        is_new_customer_order: input.is_new_customer,
    }
}

/// Goods cost as recorded on the order: goods minus profit when a positive
/// profit is stored, otherwise the full goods amount.
pub fn goods_cost(goods_amount: Money, order_profit: Option<Money>) -> Money {
    match order_profit {
        Some(profit) if profit.is_positive() => goods_amount - profit,
        _ => goods_amount,
    }
}

/// Platform delivery cost of an order, zero without a stored calculation.
pub fn delivery_cost(calculation: Option<&DeliveryFeeCalculation>) -> Money {
    calculation.map_or(Money::zero(), |c| c.total_platform_cost)
}

/// Calculation month `YYYY-MM` of a settlement in the business timezone.
pub fn calc_month(settled_at: DateTime<Utc>, zone: FixedOffset) -> String {
    settled_at.with_timezone(&zone).format("%Y-%m").to_string()
}

// =============================================================================
// Ledger Records
// =============================================================================

/// One commission row: a settled order credited to one salesperson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesCommission {
    pub id: i64,
    pub order_id: i64,
    pub employee_code: String,
    pub user_id: i64,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub settlement_date: Option<DateTime<Utc>>,
    pub calc_month: String,
    pub is_valid_order: bool,
    pub is_new_customer_order: bool,
    pub order_amount: Money,
    pub goods_cost: Money,
    pub delivery_cost: Money,
    pub order_profit: Money,
    pub base_commission: Money,
    pub new_customer_bonus: Money,
    pub tier_commission: Money,
    pub total_commission: Money,
    pub tier_level: u8,
    pub is_accounted: bool,
    pub accounted_at: Option<DateTime<Utc>>,
    pub is_settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
    pub is_accounted_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesCommission {
    /// Applies a month tier to this row, keeping the total identity.
    pub fn retier(&mut self, tier_level: u8, tier_rate: Rate) {
        self.tier_level = tier_level;
        self.tier_commission = self.order_profit.apply_rate(tier_rate);
        self.total_commission = self.base_commission + self.new_customer_bonus + self.tier_commission;
    }

    /// `is_settled ⇒ is_accounted ∧ ¬is_accounted_cancelled`.
    pub fn flags_consistent(&self) -> bool {
        !self.is_settled || (self.is_accounted && !self.is_accounted_cancelled)
    }
}

/// Derived per-month totals for one salesperson.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub employee_code: String,
    pub month: String,
    pub total_sales: Money,
    pub total_valid_orders: i64,
    pub total_new_customers: i64,
    pub total_profit: Money,
    pub total_base_commission: Money,
    pub total_new_customer_bonus: Money,
    pub total_tier_commission: Money,
    pub total_commission: Money,
    pub tier_level: u8,
}

impl MonthlyStats {
    /// Aggregates the rows that count: valid and not administratively cancelled.
    pub fn from_rows<'a, I>(employee_code: &str, month: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a SalesCommission>,
    {
        let mut stats = MonthlyStats {
            employee_code: employee_code.to_string(),
            month: month.to_string(),
            ..Default::default()
        };
        for row in rows
            .into_iter()
            .filter(|r| r.is_valid_order && !r.is_accounted_cancelled)
        {
            stats.total_sales += row.order_amount;
            stats.total_valid_orders += 1;
            if row.is_new_customer_order {
                stats.total_new_customers += 1;
            }
            stats.total_profit += row.order_profit;
            stats.total_base_commission += row.base_commission;
            stats.total_new_customer_bonus += row.new_customer_bonus;
            stats.total_tier_commission += row.tier_commission;
            stats.total_commission += row.total_commission;
            stats.tier_level = stats.tier_level.max(row.tier_level);
        }
        stats
    }
}

/// Status filter for commission listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatusFilter {
    /// Accounted and not cancelled.
    Accounted,
    /// Settled and not cancelled.
    Settled,
    /// Not accounted (includes cancelled rows).
    Unaccounted,
    /// Not settled and not cancelled.
    Unsettled,
    /// Administratively cancelled.
    Cancelled,
    /// Margin too small to earn commission.
    Invalid,
}

string_enum!(CommissionStatusFilter, "status", {
    Accounted => "accounted",
    Settled => "settled",
    Unaccounted => "unaccounted",
    Unsettled => "unsettled",
    Cancelled => "cancelled",
    Invalid => "invalid",
});

impl CommissionStatusFilter {
    pub fn matches(&self, row: &SalesCommission) -> bool {
        match self {
            Self::Accounted => row.is_accounted && !row.is_accounted_cancelled,
            Self::Settled => row.is_settled && !row.is_accounted_cancelled,
            Self::Unaccounted => !row.is_accounted,
            Self::Unsettled => !row.is_settled && !row.is_accounted_cancelled,
            Self::Cancelled => row.is_accounted_cancelled,
            Self::Invalid => !row.is_valid_order,
        }
    }
}

/// Totals for a salesperson over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionOverview {
    /// Valid, non-cancelled rows plus the unaccounted preview.
    pub total_amount: Money,
    /// Preview over unpaid, non-cancelled orders.
    pub unaccounted_amount: Money,
    pub accounted_amount: Money,
    pub settled_amount: Money,
    pub cancelled_amount: Money,
    pub unaccounted_count: i64,
    pub accounted_count: i64,
    pub settled_count: i64,
    pub cancelled_count: i64,
    pub invalid_order_count: i64,
}

impl CommissionOverview {
    /// Buckets ledger rows. The unaccounted preview is added separately.
    pub fn from_rows<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a SalesCommission>,
    {
        let mut overview = CommissionOverview::default();
        for row in rows {
            if !row.is_valid_order {
                overview.invalid_order_count += 1;
                continue;
            }
            if row.is_accounted_cancelled {
                overview.cancelled_amount += row.total_commission;
                overview.cancelled_count += 1;
                continue;
            }
            overview.total_amount += row.total_commission;
            if row.is_settled {
                overview.settled_amount += row.total_commission;
                overview.settled_count += 1;
            } else if row.is_accounted {
                overview.accounted_amount += row.total_commission;
                overview.accounted_count += 1;
            }
        }
        overview
    }

    pub fn add_preview(&mut self, commission: Money) {
        self.unaccounted_amount += commission;
        self.unaccounted_count += 1;
        self.total_amount += commission;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> CommissionConfig {
        CommissionConfig::defaults_for("10001")
    }

    fn row(id: i64, amount: i64, profit: i64) -> SalesCommission {
        let at = Utc.with_ymd_and_hms(2026, 4, 3, 10, 0, 0).unwrap();
        let mut r = SalesCommission {
            id,
            order_id: id,
            employee_code: "10001".to_string(),
            user_id: id,
            order_number: format!("N{id}"),
            order_date: at,
            settlement_date: Some(at),
            calc_month: "2026-04".to_string(),
            is_valid_order: true,
            is_new_customer_order: false,
            order_amount: Money::from_major(amount),
            goods_cost: Money::zero(),
            delivery_cost: Money::zero(),
            order_profit: Money::from_major(profit),
            base_commission: Money::zero(),
            new_customer_bonus: Money::zero(),
            tier_commission: Money::zero(),
            total_commission: Money::zero(),
            tier_level: 0,
            is_accounted: true,
            accounted_at: Some(at),
            is_settled: false,
            settled_at: None,
            is_accounted_cancelled: false,
            created_at: at,
            updated_at: at,
        };
        r.base_commission = r.order_profit.apply_rate(Rate::from_bps(4500));
        r.total_commission = r.base_commission;
        r
    }

    #[test]
    fn test_first_commission_tier_zero() {
        let result = calculate(
            &config(),
            CommissionInput {
                order_amount: Money::from_major(200),
                goods_cost: Money::from_major(120),
                delivery_cost: Money::from_major(20),
                is_new_customer: true,
                month_total_sales: Money::zero(),
            },
        );
        assert_eq!(result.order_profit, Money::from_major(60));
        assert_eq!(result.base_commission, Money::from_major(27));
        assert_eq!(result.new_customer_bonus, Money::from_major(12));
        assert_eq!(result.tier_commission, Money::zero());
        assert_eq!(result.tier_level, 0);
        assert_eq!(result.total_commission, Money::from_major(39));
        assert!(result.is_valid_order);
    }

    #[test]
    fn test_small_margin_is_invalid() {
        let result = calculate(
            &config(),
            CommissionInput {
                order_amount: Money::from_major(100),
                goods_cost: Money::from_major(90),
                delivery_cost: Money::from_major(5),
                is_new_customer: true,
                month_total_sales: Money::zero(),
            },
        );
        assert!(!result.is_valid_order);
        assert!(!result.is_new_customer_order);
        assert_eq!(result.total_commission, Money::zero());
    }

    #[test]
    fn test_tier_thresholds_are_strict() {
        let c = config();
        assert_eq!(c.tier_for(Money::from_major(100_000)), (1, Rate::from_bps(500)));
        assert_eq!(c.tier_for(Money::from_major(100_001)), (2, Rate::from_bps(1000)));
        assert_eq!(c.tier_for(Money::from_major(200_001)), (3, Rate::from_bps(2000)));
    }

    #[test]
    fn test_tier_monotonic() {
        let c = config();
        let mut last = 0;
        for major in (0..300_000).step_by(7_919) {
            let (level, _) = c.tier_for(Money::from_major(major));
            assert!(level >= last);
            last = level;
        }
    }

    #[test]
    fn test_retier_keeps_identity() {
        let mut r = row(1, 30_000, 60);
        r.new_customer_bonus = Money::from_major(12);
        r.retier(1, Rate::from_bps(500));
        assert_eq!(r.tier_commission, Money::from_major(3));
        assert_eq!(r.total_commission, r.base_commission + r.new_customer_bonus + r.tier_commission);
        assert_eq!(r.total_commission, Money::from_major(42));
    }

    #[test]
    fn test_monthly_stats_skip_cancelled_and_invalid() {
        let mut a = row(1, 30_000, 60);
        a.retier(1, Rate::from_bps(500));
        let mut b = row(2, 25_000, 100);
        b.retier(1, Rate::from_bps(500));
        b.is_new_customer_order = true;
        let mut cancelled = row(3, 9_000, 10);
        cancelled.is_accounted_cancelled = true;
        let mut invalid = row(4, 10, 1);
        invalid.is_valid_order = false;

        let stats = MonthlyStats::from_rows("10001", "2026-04", [&a, &b, &cancelled, &invalid]);
        assert_eq!(stats.total_sales, Money::from_major(55_000));
        assert_eq!(stats.total_valid_orders, 2);
        assert_eq!(stats.total_new_customers, 1);
        assert_eq!(stats.total_tier_commission, Money::from_major(8));
        assert_eq!(stats.tier_level, 1);
    }

    #[test]
    fn test_status_filters() {
        let mut cancelled = row(1, 100, 50);
        cancelled.is_accounted = false;
        cancelled.is_accounted_cancelled = true;
        assert!(CommissionStatusFilter::Cancelled.matches(&cancelled));
        assert!(CommissionStatusFilter::Unaccounted.matches(&cancelled));
        assert!(!CommissionStatusFilter::Unsettled.matches(&cancelled));
        assert_eq!("settled".parse::<CommissionStatusFilter>().unwrap(), CommissionStatusFilter::Settled);
        assert!("paid".parse::<CommissionStatusFilter>().is_err());
    }

    #[test]
    fn test_goods_cost_and_month() {
        assert_eq!(goods_cost(Money::from_major(180), Some(Money::from_major(60))), Money::from_major(120));
        assert_eq!(goods_cost(Money::from_major(180), Some(Money::zero())), Money::from_major(180));
        assert_eq!(goods_cost(Money::from_major(180), None), Money::from_major(180));

        let zone = FixedOffset::east_opt(8 * 3600).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 4, 30, 17, 30, 0).unwrap();
        assert_eq!(calc_month(late, zone), "2026-05");
    }

    #[test]
    fn test_overview_buckets() {
        let mut settled = row(1, 100, 50);
        settled.is_settled = true;
        let accounted = row(2, 100, 40);
        let mut cancelled = row(3, 100, 30);
        cancelled.is_accounted_cancelled = true;
        cancelled.is_accounted = false;
        let mut invalid = row(4, 10, 1);
        invalid.is_valid_order = false;

        let mut overview = CommissionOverview::from_rows([&settled, &accounted, &cancelled, &invalid]);
        assert_eq!(overview.settled_count, 1);
        assert_eq!(overview.accounted_count, 1);
        assert_eq!(overview.cancelled_count, 1);
        assert_eq!(overview.invalid_order_count, 1);
        assert_eq!(overview.total_amount, settled.total_commission + accounted.total_commission);

        overview.add_preview(Money::from_major(7));
        assert_eq!(overview.unaccounted_count, 1);
        assert_eq!(
            overview.total_amount,
            settled.total_commission + accounted.total_commission + Money::from_major(7)
        );
    }
}
