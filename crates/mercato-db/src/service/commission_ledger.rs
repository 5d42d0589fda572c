//! # Commission Ledger
//!
//! Credits settled orders to the buyer's salesperson and keeps each month's
//! tier consistent across all of its rows.
//!
//! ## Row Flags
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   settlement ──► accounted ──settle_bulk──► settled (final)             │
//! │                     │  ▲                                                │
//! │      cancel_account │  │ reset_account                                  │
//! │                     ▼  │                                                │
//! │                  accounted_cancelled   (sticky: re-settling skips it)   │
//! │                                                                         │
//! │   Every flag change that alters a month's sales re-tiers the month      │
//! │   under the (sales_code, month) lock and rebuilds its aggregate.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use mercato_core::commission::{
    self, CommissionConfig, CommissionInput, CommissionOverview, MonthlyStats, SalesCommission,
};
use mercato_core::validation::{normalize_page, validate_employee_code, validate_month, validate_non_negative};
use mercato_core::{Money, Order, User, ValidationError, NEW_CUSTOMER_VALID_PROFIT};

use super::error::{EngineError, EngineResult};
use super::locks::MonthKey;
use super::EngineState;
use crate::pool::commit;
use crate::repository::commission::{self as ledger, CommissionQuery};
use crate::repository::order as order_repo;

// =============================================================================
// Settlement Path
// =============================================================================

/// The stored config, created with defaults on first use.
async fn config_or_create(
    conn: &mut SqliteConnection,
    employee_code: &str,
    now: DateTime<Utc>,
) -> EngineResult<CommissionConfig> {
    if let Some(config) = ledger::fetch_config(&mut *conn, employee_code).await? {
        return Ok(config);
    }
    let config = CommissionConfig::defaults_for(employee_code);
    ledger::save_config(&mut *conn, &config, now).await?;
    info!(employee_code, "Created default commission config");
    Ok(config)
}

/// True when nothing disqualifies the buyer from the new-customer bonus.
async fn is_new_customer(conn: &mut SqliteConnection, order: &Order) -> EngineResult<bool> {
    let earlier = order_repo::settled_before(&mut *conn, order.user_id, order.id).await?;
    let has_valid_earlier = earlier.iter().any(|o| {
        let goods_cost = commission::goods_cost(o.goods_amount, o.order_profit);
        let platform_cost = commission::delivery_cost(o.delivery_fee_calculation.as_ref());
        o.total_amount - goods_cost - platform_cost > NEW_CUSTOMER_VALID_PROFIT
    });
    if has_valid_earlier {
        return Ok(false);
    }
    if ledger::has_accounted_new_customer(&mut *conn, order.user_id, order.id).await? {
        return Ok(false);
    }
    Ok(!ledger::has_in_flight_new_customer(&mut *conn, order.user_id, order.id).await?)
}

/// Records the commission of an order that just became paid.
///
/// Runs inside the settlement transaction; the caller holds the month lock.
/// Returns `None` when the buyer has no salesperson.
pub(crate) async fn record_settlement(
    conn: &mut SqliteConnection,
    zone: FixedOffset,
    order: &Order,
    user: &User,
    now: DateTime<Utc>,
) -> EngineResult<Option<SalesCommission>> {
    let Some(code) = user.sales_code.as_deref() else {
        return Ok(None);
    };
    let config = config_or_create(&mut *conn, code, now).await?;

    let existing = ledger::fetch_for_order(&mut *conn, order.id, code).await?;
    if let Some(row) = existing.as_ref().filter(|r| r.is_accounted_cancelled) {
        info!(order_id = order.id, commission_id = row.id, "Commission cancelled by admin, not re-accounted");
        return Ok(existing);
    }

    let goods_cost = commission::goods_cost(order.goods_amount, order.order_profit);
    let delivery_cost = commission::delivery_cost(order.delivery_fee_calculation.as_ref());
    let is_new = is_new_customer(&mut *conn, order).await?;

    let settled_at = order.settlement_date.unwrap_or(now);
    let month = commission::calc_month(settled_at, zone);
    let month_sales = ledger::month_sales(&mut *conn, code, &month, Some(order.id)).await?;

    let breakdown = commission::calculate(
        &config,
        CommissionInput {
            order_amount: order.total_amount,
            goods_cost,
            delivery_cost,
            is_new_customer: is_new,
            month_total_sales: month_sales,
        },
    );

    let row = SalesCommission {
        id: existing.as_ref().map_or(0, |r| r.id),
        order_id: order.id,
        employee_code: code.to_string(),
        user_id: order.user_id,
        order_number: order.order_number.clone(),
        order_date: order.created_at,
        settlement_date: Some(settled_at),
        calc_month: month.clone(),
        is_valid_order: breakdown.is_valid_order,
        is_new_customer_order: breakdown.is_new_customer_order,
        order_amount: order.total_amount,
        goods_cost,
        delivery_cost,
        order_profit: breakdown.order_profit,
        base_commission: breakdown.base_commission,
        new_customer_bonus: breakdown.new_customer_bonus,
        tier_commission: breakdown.tier_commission,
        total_commission: breakdown.total_commission,
        tier_level: breakdown.tier_level,
        is_accounted: true,
        accounted_at: Some(now),
        is_settled: false,
        settled_at: None,
        is_accounted_cancelled: false,
        created_at: existing.as_ref().map_or(now, |r| r.created_at),
        updated_at: now,
    };
    let id = ledger::upsert(&mut *conn, &row).await?;
    debug!(
        order_id = order.id,
        employee_code = code,
        valid = row.is_valid_order,
        new_customer = row.is_new_customer_order,
        total = %row.total_commission,
        "Commission recorded"
    );

    retro_fix(&mut *conn, &config, code, &month, now).await?;
    Ok(ledger::fetch(&mut *conn, id).await?)
}

/// Re-tiers every counting row of a month against the month's total and
/// rebuilds its aggregate.
pub(crate) async fn retro_fix(
    conn: &mut SqliteConnection,
    config: &CommissionConfig,
    employee_code: &str,
    month: &str,
    now: DateTime<Utc>,
) -> EngineResult<MonthlyStats> {
    let mut rows = ledger::month_rows(&mut *conn, employee_code, month).await?;
    let counts = |r: &SalesCommission| r.is_valid_order && !r.is_accounted_cancelled;

    let month_sales: Money = rows.iter().filter(|r| counts(r)).map(|r| r.order_amount).sum();
    let (tier_level, tier_rate) = config.tier_for(month_sales);

    let mut retiered = 0usize;
    for row in rows.iter_mut().filter(|r| counts(r)) {
        let before = (row.tier_level, row.tier_commission);
        row.retier(tier_level, tier_rate);
        if (row.tier_level, row.tier_commission) != before {
            ledger::save_tier(&mut *conn, row, now).await?;
            retiered += 1;
        }
    }
    if retiered > 0 {
        info!(employee_code, month, tier_level, retiered, "Month re-tiered");
    }

    let stats = MonthlyStats::from_rows(employee_code, month, &rows);
    ledger::save_stats(&mut *conn, &stats, now).await?;
    Ok(stats)
}

/// Month keys touched by an order's rows.
pub(crate) async fn month_keys_for_order(conn: &mut SqliteConnection, order_id: i64) -> EngineResult<Vec<MonthKey>> {
    let rows = ledger::rows_for_order(conn, order_id).await?;
    Ok(rows.into_iter().map(|r| (r.employee_code, r.calc_month)).collect())
}

/// Undoes an order's unsettled commission when the order is cancelled,
/// in practice a paid order being refunded.
///
/// Unaccounted rows are deleted; accounted new-customer rows are marked
/// cancelled so the buyer can earn the bonus again. Settled rows stay.
pub(crate) async fn reverse_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Vec<MonthKey>> {
    let rows = ledger::rows_for_order(&mut *conn, order_id).await?;
    let mut affected = BTreeSet::new();

    for row in rows {
        if row.is_settled {
            continue;
        }
        if !row.is_accounted {
            ledger::delete(&mut *conn, row.id).await?;
        } else if row.is_new_customer_order {
            ledger::mark_cancelled(&mut *conn, row.id, now).await?;
        } else {
            continue;
        }
        affected.insert((row.employee_code, row.calc_month));
    }

    for (code, month) in &affected {
        let config = config_or_create(&mut *conn, code, now).await?;
        retro_fix(&mut *conn, &config, code, month, now).await?;
    }
    if !affected.is_empty() {
        info!(order_id, months = affected.len(), "Commission reversed for cancelled order");
    }
    Ok(affected.into_iter().collect())
}

// =============================================================================
// Service
// =============================================================================

/// Rows an administrative transition applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionSelector {
    /// Exactly these rows; any that does not qualify fails the call.
    Ids(Vec<i64>),
    /// Every qualifying row of a salesperson, optionally bounded by order date.
    Filter {
        employee_code: String,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkAction {
    Account,
    Settle,
}

impl BulkAction {
    fn qualifies(&self, row: &SalesCommission) -> bool {
        match self {
            BulkAction::Account => !row.is_accounted && !row.is_accounted_cancelled,
            BulkAction::Settle => row.is_accounted && !row.is_settled && !row.is_accounted_cancelled,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            BulkAction::Account => "accounted",
            BulkAction::Settle => "settled",
        }
    }
}

/// Transitions that move a row in or out of its month's sales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthAction {
    Cancel,
    Reset,
}

impl MonthAction {
    fn qualifies(&self, row: &SalesCommission) -> bool {
        match self {
            MonthAction::Cancel => row.is_accounted && !row.is_settled,
            MonthAction::Reset => row.is_accounted_cancelled,
        }
    }

    async fn apply(&self, conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> EngineResult<bool> {
        let changed = match self {
            MonthAction::Cancel => ledger::mark_cancelled(conn, id, now).await?,
            MonthAction::Reset => ledger::mark_reset(conn, id, now).await?,
        };
        Ok(changed)
    }

    fn verb(&self) -> &'static str {
        match self {
            MonthAction::Cancel => "cancelled",
            MonthAction::Reset => "reset",
        }
    }
}

pub struct CommissionLedgerService {
    state: Arc<EngineState>,
}

impl CommissionLedgerService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        CommissionLedgerService { state }
    }

    /// Marks rows accounted. Tier inputs do not change, so no month is re-tiered.
    pub async fn account_bulk(&self, selector: CommissionSelector) -> EngineResult<Vec<i64>> {
        self.bulk(selector, BulkAction::Account).await
    }

    /// Marks accounted rows settled.
    pub async fn settle_bulk(&self, selector: CommissionSelector) -> EngineResult<Vec<i64>> {
        self.bulk(selector, BulkAction::Settle).await
    }

    async fn bulk(&self, selector: CommissionSelector, action: BulkAction) -> EngineResult<Vec<i64>> {
        let now = self.state.now();
        let mut tx = self.state.db.begin().await?;

        let targets: Vec<SalesCommission> = match selector {
            CommissionSelector::Ids(ids) => {
                let mut rows = Vec::with_capacity(ids.len());
                for id in ids {
                    let row = fetch_row(&mut tx, id).await?;
                    if !action.qualifies(&row) {
                        return Err(EngineError::Conflict(format!(
                            "commission {id} cannot be {}",
                            action.verb()
                        )));
                    }
                    rows.push(row);
                }
                rows
            }
            CommissionSelector::Filter {
                employee_code,
                start,
                end,
            } => {
                validate_employee_code(&employee_code)?;
                let query = CommissionQuery {
                    employee_code: Some(employee_code),
                    start,
                    end,
                    ..Default::default()
                };
                ledger::select_all(&mut tx, &query)
                    .await?
                    .into_iter()
                    .filter(|r| action.qualifies(r))
                    .collect()
            }
        };

        let mut updated = Vec::with_capacity(targets.len());
        for row in &targets {
            let changed = match action {
                BulkAction::Account => ledger::mark_accounted(&mut tx, row.id, now).await?,
                BulkAction::Settle => ledger::mark_settled(&mut tx, row.id, now).await?,
            };
            if changed {
                updated.push(row.id);
            }
        }
        commit(tx).await?;

        info!(action = action.verb(), count = updated.len(), "Commission rows updated");
        Ok(updated)
    }

    /// Withdraws accounted, unsettled rows and re-tiers their months.
    pub async fn cancel_account(&self, ids: &[i64]) -> EngineResult<Vec<i64>> {
        self.month_changing(ids, MonthAction::Cancel).await
    }

    /// Restores cancelled rows to accounted and re-tiers their months.
    pub async fn reset_account(&self, ids: &[i64]) -> EngineResult<Vec<i64>> {
        self.month_changing(ids, MonthAction::Reset).await
    }

    async fn month_changing(&self, ids: &[i64], action: MonthAction) -> EngineResult<Vec<i64>> {
        // Lock keys come from a first read; rows are re-checked under the lock.
        let mut conn = self.state.db.acquire().await?;
        let mut keys = Vec::with_capacity(ids.len());
        for &id in ids {
            let row = fetch_row(&mut conn, id).await?;
            keys.push((row.employee_code, row.calc_month));
        }
        drop(conn);

        let _guards = self.state.locks.acquire(keys).await;
        let now = self.state.now();
        let mut tx = self.state.db.begin().await?;

        let mut months = BTreeSet::new();
        for &id in ids {
            let row = fetch_row(&mut tx, id).await?;
            if !action.qualifies(&row) || !action.apply(&mut tx, id, now).await? {
                return Err(EngineError::Conflict(format!(
                    "commission {id} cannot be {}",
                    action.verb()
                )));
            }
            months.insert((row.employee_code, row.calc_month));
        }
        for (code, month) in &months {
            let config = config_or_create(&mut tx, code, now).await?;
            retro_fix(&mut tx, &config, code, month, now).await?;
        }
        commit(tx).await?;

        info!(action = action.verb(), count = ids.len(), months = months.len(), "Commission rows updated");
        Ok(ids.to_vec())
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub async fn list_commissions(
        &self,
        query: CommissionQuery,
        page: u32,
        page_size: u32,
    ) -> EngineResult<Page<SalesCommission>> {
        if let Some(code) = &query.employee_code {
            validate_employee_code(code)?;
        }
        if let Some(month) = &query.month {
            validate_month(month)?;
        }
        let (page, page_size) = normalize_page(page, page_size);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let mut conn = self.state.db.acquire().await?;
        let items = ledger::list(&mut conn, &query, i64::from(page_size), offset).await?;
        let total = ledger::count(&mut conn, &query).await?;
        Ok(Page {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn get_commission(&self, id: i64) -> EngineResult<SalesCommission> {
        let mut conn = self.state.db.acquire().await?;
        fetch_row(&mut conn, id).await
    }

    /// A salesperson's month; built from the rows if never aggregated.
    pub async fn monthly_stats(&self, employee_code: &str, month: &str) -> EngineResult<MonthlyStats> {
        validate_employee_code(employee_code)?;
        validate_month(month)?;
        let mut conn = self.state.db.acquire().await?;
        if let Some(stats) = ledger::fetch_stats(&mut conn, employee_code, month).await? {
            return Ok(stats);
        }
        let rows = ledger::month_rows(&mut conn, employee_code, month).await?;
        let stats = MonthlyStats::from_rows(employee_code, month, &rows);
        if !rows.is_empty() {
            ledger::save_stats(&mut conn, &stats, self.state.now()).await?;
        }
        Ok(stats)
    }

    /// Every salesperson's aggregate for a month, highest commission first.
    pub async fn monthly_stats_for_month(&self, month: &str) -> EngineResult<Vec<MonthlyStats>> {
        validate_month(month)?;
        let mut conn = self.state.db.acquire().await?;
        Ok(ledger::stats_for_month(&mut conn, month).await?)
    }

    /// Ledger totals over a date range plus a preview of open orders.
    ///
    /// The preview assumes no new-customer bonus and the current month's
    /// sales for the tier.
    pub async fn overview(
        &self,
        employee_code: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EngineResult<CommissionOverview> {
        validate_employee_code(employee_code)?;
        let mut conn = self.state.db.acquire().await?;
        let query = CommissionQuery {
            employee_code: Some(employee_code.to_string()),
            start,
            end,
            ..Default::default()
        };
        let rows = ledger::select_all(&mut conn, &query).await?;
        let mut overview = CommissionOverview::from_rows(&rows);

        let config = ledger::fetch_config(&mut conn, employee_code)
            .await?
            .unwrap_or_else(|| CommissionConfig::defaults_for(employee_code));
        let month = commission::calc_month(self.state.now(), self.state.zone);
        let month_sales = ledger::month_sales(&mut conn, employee_code, &month, None).await?;

        for order in order_repo::open_for_sales_code(&mut conn, employee_code, start, end).await? {
            let breakdown = commission::calculate(
                &config,
                CommissionInput {
                    order_amount: order.total_amount,
                    goods_cost: commission::goods_cost(order.goods_amount, order.order_profit),
                    delivery_cost: commission::delivery_cost(order.delivery_fee_calculation.as_ref()),
                    is_new_customer: false,
                    month_total_sales: month_sales,
                },
            );
            if breakdown.is_valid_order {
                overview.add_preview(breakdown.total_commission);
            }
        }
        Ok(overview)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The stored config, or the defaults if none was saved yet.
    pub async fn get_config(&self, employee_code: &str) -> EngineResult<CommissionConfig> {
        validate_employee_code(employee_code)?;
        let mut conn = self.state.db.acquire().await?;
        Ok(ledger::fetch_config(&mut conn, employee_code)
            .await?
            .unwrap_or_else(|| CommissionConfig::defaults_for(employee_code)))
    }

    /// Saves a config. Existing rows keep their amounts until their month is
    /// next re-tiered.
    pub async fn update_config(&self, config: CommissionConfig) -> EngineResult<CommissionConfig> {
        validate_employee_code(&config.employee_code)?;
        for (field, amount) in [
            ("tier1_threshold", config.tier1_threshold),
            ("tier2_threshold", config.tier2_threshold),
            ("tier3_threshold", config.tier3_threshold),
            ("min_profit", config.min_profit),
        ] {
            validate_non_negative(field, amount)?;
        }
        if config.tier1_threshold > config.tier2_threshold || config.tier2_threshold > config.tier3_threshold {
            return Err(ValidationError::InvalidFormat {
                field: "tier thresholds".to_string(),
                reason: "must be ascending".to_string(),
            }
            .into());
        }
        let mut conn = self.state.db.acquire().await?;
        ledger::save_config(&mut conn, &config, self.state.now()).await?;
        info!(employee_code = %config.employee_code, "Commission config updated");
        Ok(config)
    }
}

async fn fetch_row(conn: &mut SqliteConnection, id: i64) -> EngineResult<SalesCommission> {
    ledger::fetch(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("SalesCommission", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog;
    use crate::repository::order::{DeliveryInfo, NewOrder};
    use crate::service::fixtures::{fixture, start, Fixture, SALES_CODE};
    use crate::service::ErrorKind;
    use mercato_core::commission::CommissionStatusFilter;
    use mercato_core::order::{OrderOptions, OrderTotals};
    use mercato_core::rider_payout::DeliveryFeeCalculation;

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    /// An order with the given economics, already carrying delivery info.
    async fn order_with(f: &Fixture, goods: i64, delivery: i64, profit: i64, platform_cost: i64) -> i64 {
        let mut conn = f.engine.db().acquire().await.unwrap();
        let options = OrderOptions::default();
        let totals =
            OrderTotals::compute(Money::from_major(goods), Money::from_major(delivery), Money::zero(), Money::zero())
                .unwrap();
        let id = order_repo::insert(
            &mut conn,
            &NewOrder {
                user_id: f.user_id,
                address_id: f.address_id,
                totals,
                is_urgent: false,
                options: &options,
                created_at: start(),
            },
        )
        .await
        .unwrap();
        order_repo::save_delivery_info(
            &mut conn,
            id,
            &DeliveryInfo {
                is_isolated: false,
                weather_info: None,
                calculation: DeliveryFeeCalculation {
                    total_platform_cost: Money::from_major(platform_cost),
                    ..Default::default()
                },
                order_profit: Money::from_major(profit),
                net_profit: Money::from_major(profit - platform_cost),
            },
        )
        .await
        .unwrap();
        id
    }

    async fn set_status(f: &Fixture, order_id: i64, status: &str) {
        let mut conn = f.engine.db().acquire().await.unwrap();
        sqlx::query("UPDATE orders SET status = ?2, settlement_date = ?3 WHERE id = ?1")
            .bind(order_id)
            .bind(status)
            .bind(start())
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    /// Marks the order paid and runs the settlement path.
    async fn settle(f: &Fixture, order_id: i64) -> SalesCommission {
        set_status(f, order_id, "paid").await;
        let mut conn = f.engine.db().acquire().await.unwrap();
        let order = order_repo::fetch(&mut conn, order_id).await.unwrap().unwrap();
        let user = catalog::fetch_user(&mut conn, f.user_id).await.unwrap().unwrap();
        record_settlement(&mut conn, zone(), &order, &user, start())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_commission_tier_zero() {
        let f = fixture().await;
        // total 200, goods 180 with profit 60 ⇒ cost 120; delivery 20.
        let id = order_with(&f, 180, 20, 60, 20).await;
        let row = settle(&f, id).await;

        assert!(row.is_valid_order);
        assert!(row.is_new_customer_order);
        assert_eq!(row.order_profit, Money::from_major(60));
        assert_eq!(row.base_commission, Money::from_major(27));
        assert_eq!(row.new_customer_bonus, Money::from_major(12));
        assert_eq!(row.tier_commission, Money::zero());
        assert_eq!(row.total_commission, Money::from_major(39));
        assert_eq!(row.calc_month, "2026-05");
        assert!(row.is_accounted && !row.is_settled);

        let mut conn = f.engine.db().acquire().await.unwrap();
        assert!(ledger::fetch_config(&mut conn, SALES_CODE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_crossing_tier_retiers_whole_month() {
        let f = fixture().await;
        let first = order_with(&f, 30_000, 0, 3_000, 0).await;
        let row = settle(&f, first).await;
        assert_eq!(row.tier_level, 0);

        let second = order_with(&f, 25_000, 0, 2_500, 0).await;
        let row = settle(&f, second).await;
        assert!(!row.is_new_customer_order);
        assert_eq!(row.tier_level, 1);
        assert_eq!(row.tier_commission, Money::from_major(125));

        let ledger_svc = f.engine.ledger();
        let first_row = ledger_svc
            .list_commissions(CommissionQuery::default(), 1, 20)
            .await
            .unwrap()
            .items
            .into_iter()
            .find(|r| r.order_id == first)
            .unwrap();
        assert_eq!(first_row.tier_level, 1);
        assert_eq!(first_row.tier_commission, Money::from_major(150));
        assert_eq!(
            first_row.total_commission,
            first_row.base_commission + first_row.new_customer_bonus + first_row.tier_commission
        );

        let stats = ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap();
        assert_eq!(stats.tier_level, 1);
        assert_eq!(stats.total_sales, Money::from_major(55_000));
        assert_eq!(stats.total_valid_orders, 2);
        assert_eq!(stats.total_new_customers, 1);
    }

    #[tokio::test]
    async fn test_small_margin_is_invalid() {
        let f = fixture().await;
        let id = order_with(&f, 100, 0, 4, 0).await;
        let row = settle(&f, id).await;
        assert!(!row.is_valid_order);
        assert_eq!(row.total_commission, Money::zero());

        let page = f
            .engine
            .ledger()
            .list_commissions(
                CommissionQuery {
                    status: Some(CommissionStatusFilter::Invalid),
                    ..Default::default()
                },
                1,
                20,
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_admin_cancel_is_sticky_until_reset() {
        let f = fixture().await;
        let id = order_with(&f, 180, 20, 60, 20).await;
        let row = settle(&f, id).await;
        let ledger_svc = f.engine.ledger();

        ledger_svc.cancel_account(&[row.id]).await.unwrap();
        let err = ledger_svc.cancel_account(&[row.id]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Settling again leaves the cancelled row untouched.
        let again = settle(&f, id).await;
        assert!(again.is_accounted_cancelled);
        let stats = ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap();
        assert_eq!(stats.total_valid_orders, 0);

        ledger_svc.reset_account(&[row.id]).await.unwrap();
        let restored = ledger_svc.get_commission(row.id).await.unwrap();
        assert!(restored.is_accounted && !restored.is_accounted_cancelled);
        let stats = ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap();
        assert_eq!(stats.total_valid_orders, 1);
    }

    #[tokio::test]
    async fn test_settle_bulk_rejects_named_unqualified_rows() {
        let f = fixture().await;
        let a = settle(&f, order_with(&f, 180, 20, 60, 20).await).await;
        let b = settle(&f, order_with(&f, 300, 0, 90, 10).await).await;
        let ledger_svc = f.engine.ledger();

        ledger_svc.cancel_account(&[b.id]).await.unwrap();
        let err = ledger_svc
            .settle_bulk(CommissionSelector::Ids(vec![a.id, b.id]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!ledger_svc.get_commission(a.id).await.unwrap().is_settled);

        // The filter form skips what does not qualify.
        let settled = ledger_svc
            .settle_bulk(CommissionSelector::Filter {
                employee_code: SALES_CODE.to_string(),
                start: None,
                end: None,
            })
            .await
            .unwrap();
        assert_eq!(settled, vec![a.id]);

        let err = ledger_svc.cancel_account(&[a.id]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_overview_previews_open_orders() {
        let f = fixture().await;
        let paid = settle(&f, order_with(&f, 180, 20, 60, 20).await).await;
        // Open order: total 100, cost 70, delivery 10 ⇒ profit 20, base 9.
        order_with(&f, 100, 0, 30, 10).await;

        let overview = f.engine.ledger().overview(SALES_CODE, None, None).await.unwrap();
        assert_eq!(overview.accounted_count, 1);
        assert_eq!(overview.accounted_amount, paid.total_commission);
        assert_eq!(overview.unaccounted_count, 1);
        assert_eq!(overview.unaccounted_amount, Money::from_major(9));
        assert_eq!(overview.total_amount, Money::from_major(48));
    }

    #[tokio::test]
    async fn test_config_defaults_and_update() {
        let f = fixture().await;
        let ledger_svc = f.engine.ledger();
        let mut config = ledger_svc.get_config(SALES_CODE).await.unwrap();
        assert_eq!(config, CommissionConfig::defaults_for(SALES_CODE));

        config.tier2_threshold = Money::from_major(10);
        let err = ledger_svc.update_config(config.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        config.tier2_threshold = Money::from_major(80_000);
        ledger_svc.update_config(config.clone()).await.unwrap();
        assert_eq!(ledger_svc.get_config(SALES_CODE).await.unwrap(), config);

        let err = ledger_svc.get_config("12").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
