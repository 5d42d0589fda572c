//! # Commission Repository
//!
//! Commission configs, per-order commission rows and the monthly stats cache.
//!
//! ## Row Flags
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  unaccounted ──account──► accounted ──settle──► settled                 │
//! │                              │  ▲                                       │
//! │                       cancel │  │ reset                                 │
//! │                              ▼  │                                       │
//! │                        accounted_cancelled                              │
//! │                                                                         │
//! │  Every flag update is guarded in SQL; a `false` return means the row    │
//! │  was not in the required state.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use mercato_core::commission::{CommissionConfig, CommissionStatusFilter, MonthlyStats, SalesCommission};
use mercato_core::{Money, Rate};

use crate::error::DbResult;

// =============================================================================
// Configs
// =============================================================================

#[derive(Debug, FromRow)]
struct ConfigRow {
    employee_code: String,
    #[sqlx(rename = "base_rate_bps")]
    base_rate: Rate,
    #[sqlx(rename = "new_customer_rate_bps")]
    new_customer_rate: Rate,
    #[sqlx(rename = "tier1_threshold_cents")]
    tier1_threshold: Money,
    #[sqlx(rename = "tier1_rate_bps")]
    tier1_rate: Rate,
    #[sqlx(rename = "tier2_threshold_cents")]
    tier2_threshold: Money,
    #[sqlx(rename = "tier2_rate_bps")]
    tier2_rate: Rate,
    #[sqlx(rename = "tier3_threshold_cents")]
    tier3_threshold: Money,
    #[sqlx(rename = "tier3_rate_bps")]
    tier3_rate: Rate,
    #[sqlx(rename = "min_profit_cents")]
    min_profit: Money,
}

impl From<ConfigRow> for CommissionConfig {
    fn from(row: ConfigRow) -> Self {
        CommissionConfig {
            employee_code: row.employee_code,
            base_rate: row.base_rate,
            new_customer_rate: row.new_customer_rate,
            tier1_threshold: row.tier1_threshold,
            tier1_rate: row.tier1_rate,
            tier2_threshold: row.tier2_threshold,
            tier2_rate: row.tier2_rate,
            tier3_threshold: row.tier3_threshold,
            tier3_rate: row.tier3_rate,
            min_profit: row.min_profit,
        }
    }
}

pub async fn fetch_config(conn: &mut SqliteConnection, employee_code: &str) -> DbResult<Option<CommissionConfig>> {
    let row: Option<ConfigRow> = sqlx::query_as(
        r#"
        SELECT employee_code, base_rate_bps, new_customer_rate_bps,
               tier1_threshold_cents, tier1_rate_bps,
               tier2_threshold_cents, tier2_rate_bps,
               tier3_threshold_cents, tier3_rate_bps,
               min_profit_cents
        FROM sales_commission_configs
        WHERE employee_code = ?1
        "#,
    )
    .bind(employee_code)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(CommissionConfig::from))
}

/// Inserts or replaces a salesperson's config.
pub async fn save_config(conn: &mut SqliteConnection, config: &CommissionConfig, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales_commission_configs (
            employee_code, base_rate_bps, new_customer_rate_bps,
            tier1_threshold_cents, tier1_rate_bps,
            tier2_threshold_cents, tier2_rate_bps,
            tier3_threshold_cents, tier3_rate_bps,
            min_profit_cents, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
        ON CONFLICT(employee_code) DO UPDATE SET
            base_rate_bps = excluded.base_rate_bps,
            new_customer_rate_bps = excluded.new_customer_rate_bps,
            tier1_threshold_cents = excluded.tier1_threshold_cents,
            tier1_rate_bps = excluded.tier1_rate_bps,
            tier2_threshold_cents = excluded.tier2_threshold_cents,
            tier2_rate_bps = excluded.tier2_rate_bps,
            tier3_threshold_cents = excluded.tier3_threshold_cents,
            tier3_rate_bps = excluded.tier3_rate_bps,
            min_profit_cents = excluded.min_profit_cents,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&config.employee_code)
    .bind(config.base_rate)
    .bind(config.new_customer_rate)
    .bind(config.tier1_threshold)
    .bind(config.tier1_rate)
    .bind(config.tier2_threshold)
    .bind(config.tier2_rate)
    .bind(config.tier3_threshold)
    .bind(config.tier3_rate)
    .bind(config.min_profit)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Commission Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct CommissionRow {
    id: i64,
    order_id: i64,
    employee_code: String,
    user_id: i64,
    order_number: String,
    order_date: DateTime<Utc>,
    settlement_date: Option<DateTime<Utc>>,
    calc_month: String,
    is_valid_order: bool,
    is_new_customer_order: bool,
    #[sqlx(rename = "order_amount_cents")]
    order_amount: Money,
    #[sqlx(rename = "goods_cost_cents")]
    goods_cost: Money,
    #[sqlx(rename = "delivery_cost_cents")]
    delivery_cost: Money,
    #[sqlx(rename = "order_profit_cents")]
    order_profit: Money,
    #[sqlx(rename = "base_commission_cents")]
    base_commission: Money,
    #[sqlx(rename = "new_customer_bonus_cents")]
    new_customer_bonus: Money,
    #[sqlx(rename = "tier_commission_cents")]
    tier_commission: Money,
    #[sqlx(rename = "total_commission_cents")]
    total_commission: Money,
    tier_level: u8,
    is_accounted: bool,
    accounted_at: Option<DateTime<Utc>>,
    is_settled: bool,
    settled_at: Option<DateTime<Utc>>,
    is_accounted_cancelled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommissionRow> for SalesCommission {
    fn from(row: CommissionRow) -> Self {
        SalesCommission {
            id: row.id,
            order_id: row.order_id,
            employee_code: row.employee_code,
            user_id: row.user_id,
            order_number: row.order_number,
            order_date: row.order_date,
            settlement_date: row.settlement_date,
            calc_month: row.calc_month,
            is_valid_order: row.is_valid_order,
            is_new_customer_order: row.is_new_customer_order,
            order_amount: row.order_amount,
            goods_cost: row.goods_cost,
            delivery_cost: row.delivery_cost,
            order_profit: row.order_profit,
            base_commission: row.base_commission,
            new_customer_bonus: row.new_customer_bonus,
            tier_commission: row.tier_commission,
            total_commission: row.total_commission,
            tier_level: row.tier_level,
            is_accounted: row.is_accounted,
            accounted_at: row.accounted_at,
            is_settled: row.is_settled,
            settled_at: row.settled_at,
            is_accounted_cancelled: row.is_accounted_cancelled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_COMMISSION: &str = r#"
    SELECT
        id, order_id, employee_code, user_id, order_number, order_date, settlement_date,
        calc_month, is_valid_order, is_new_customer_order,
        order_amount_cents, goods_cost_cents, delivery_cost_cents, order_profit_cents,
        base_commission_cents, new_customer_bonus_cents, tier_commission_cents,
        total_commission_cents, tier_level,
        is_accounted, accounted_at, is_settled, settled_at, is_accounted_cancelled,
        created_at, updated_at
    FROM sales_commissions
"#;

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<SalesCommission>> {
    let row: Option<CommissionRow> = sqlx::query_as(&format!("{SELECT_COMMISSION} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(SalesCommission::from))
}

pub async fn fetch_for_order(
    conn: &mut SqliteConnection,
    order_id: i64,
    employee_code: &str,
) -> DbResult<Option<SalesCommission>> {
    let row: Option<CommissionRow> =
        sqlx::query_as(&format!("{SELECT_COMMISSION} WHERE order_id = ?1 AND employee_code = ?2"))
            .bind(order_id)
            .bind(employee_code)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(SalesCommission::from))
}

/// Every row of an order, one per salesperson.
pub async fn rows_for_order(conn: &mut SqliteConnection, order_id: i64) -> DbResult<Vec<SalesCommission>> {
    let rows: Vec<CommissionRow> = sqlx::query_as(&format!("{SELECT_COMMISSION} WHERE order_id = ?1 ORDER BY id"))
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(SalesCommission::from).collect())
}

/// Rows of one salesperson's month, oldest first.
pub async fn month_rows(conn: &mut SqliteConnection, employee_code: &str, month: &str) -> DbResult<Vec<SalesCommission>> {
    let rows: Vec<CommissionRow> = sqlx::query_as(&format!(
        "{SELECT_COMMISSION} WHERE employee_code = ?1 AND calc_month = ?2 ORDER BY id"
    ))
    .bind(employee_code)
    .bind(month)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(SalesCommission::from).collect())
}

/// Sum of `order_amount` over valid, non-cancelled rows of a month,
/// leaving out one order.
pub async fn month_sales(
    conn: &mut SqliteConnection,
    employee_code: &str,
    month: &str,
    exclude_order_id: Option<i64>,
) -> DbResult<Money> {
    let cents: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(order_amount_cents), 0)
        FROM sales_commissions
        WHERE employee_code = ?1 AND calc_month = ?2
          AND is_valid_order = 1 AND is_accounted_cancelled = 0
          AND (?3 IS NULL OR order_id != ?3)
        "#,
    )
    .bind(employee_code)
    .bind(month)
    .bind(exclude_order_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from_cents(cents))
}

/// Writes a row keyed by `(order_id, employee_code)`. The stored `id` and
/// `created_at` of an existing row are kept.
pub async fn upsert(conn: &mut SqliteConnection, row: &SalesCommission) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO sales_commissions (
            order_id, employee_code, user_id, order_number, order_date, settlement_date,
            calc_month, is_valid_order, is_new_customer_order,
            order_amount_cents, goods_cost_cents, delivery_cost_cents, order_profit_cents,
            base_commission_cents, new_customer_bonus_cents, tier_commission_cents,
            total_commission_cents, tier_level,
            is_accounted, accounted_at, is_settled, settled_at, is_accounted_cancelled,
            created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18,
            ?19, ?20, ?21, ?22, ?23,
            ?24, ?25
        )
        ON CONFLICT(order_id, employee_code) DO UPDATE SET
            user_id = excluded.user_id,
            order_number = excluded.order_number,
            order_date = excluded.order_date,
            settlement_date = excluded.settlement_date,
            calc_month = excluded.calc_month,
            is_valid_order = excluded.is_valid_order,
            is_new_customer_order = excluded.is_new_customer_order,
            order_amount_cents = excluded.order_amount_cents,
            goods_cost_cents = excluded.goods_cost_cents,
            delivery_cost_cents = excluded.delivery_cost_cents,
            order_profit_cents = excluded.order_profit_cents,
            base_commission_cents = excluded.base_commission_cents,
            new_customer_bonus_cents = excluded.new_customer_bonus_cents,
            tier_commission_cents = excluded.tier_commission_cents,
            total_commission_cents = excluded.total_commission_cents,
            tier_level = excluded.tier_level,
            is_accounted = excluded.is_accounted,
            accounted_at = excluded.accounted_at,
            is_settled = excluded.is_settled,
            settled_at = excluded.settled_at,
            is_accounted_cancelled = excluded.is_accounted_cancelled,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(row.order_id)
    .bind(&row.employee_code)
    .bind(row.user_id)
    .bind(&row.order_number)
    .bind(row.order_date)
    .bind(row.settlement_date)
    .bind(&row.calc_month)
    .bind(row.is_valid_order)
    .bind(row.is_new_customer_order)
    .bind(row.order_amount)
    .bind(row.goods_cost)
    .bind(row.delivery_cost)
    .bind(row.order_profit)
    .bind(row.base_commission)
    .bind(row.new_customer_bonus)
    .bind(row.tier_commission)
    .bind(row.total_commission)
    .bind(row.tier_level)
    .bind(row.is_accounted)
    .bind(row.accounted_at)
    .bind(row.is_settled)
    .bind(row.settled_at)
    .bind(row.is_accounted_cancelled)
    .bind(row.created_at)
    .bind(row.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Persists a re-tiered row's tier fields.
pub async fn save_tier(conn: &mut SqliteConnection, row: &SalesCommission, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE sales_commissions
        SET tier_commission_cents = ?2, total_commission_cents = ?3, tier_level = ?4, updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(row.id)
    .bind(row.tier_commission)
    .bind(row.total_commission)
    .bind(row.tier_level)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM sales_commissions WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Flag Transitions
// =============================================================================

/// Unaccounted and not cancelled ⇒ accounted.
pub async fn mark_accounted(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales_commissions
        SET is_accounted = 1, accounted_at = ?2, is_accounted_cancelled = 0, updated_at = ?2
        WHERE id = ?1 AND is_accounted = 0 AND is_accounted_cancelled = 0
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Accounted, unsettled, not cancelled ⇒ settled.
pub async fn mark_settled(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales_commissions
        SET is_settled = 1, settled_at = ?2, updated_at = ?2
        WHERE id = ?1 AND is_accounted = 1 AND is_settled = 0 AND is_accounted_cancelled = 0
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Accounted and unsettled ⇒ accounted-cancelled.
pub async fn mark_cancelled(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales_commissions
        SET is_accounted = 0, is_accounted_cancelled = 1, updated_at = ?2
        WHERE id = ?1 AND is_accounted = 1 AND is_settled = 0
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Accounted-cancelled ⇒ accounted again.
pub async fn mark_reset(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales_commissions
        SET is_accounted = 1, accounted_at = ?2, is_accounted_cancelled = 0, updated_at = ?2
        WHERE id = ?1 AND is_accounted_cancelled = 1
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// New Customer Checks
// =============================================================================

/// Another order of the user holds an accounted new-customer bonus.
pub async fn has_accounted_new_customer(conn: &mut SqliteConnection, user_id: i64, order_id: i64) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM sales_commissions sc
            JOIN orders o ON o.id = sc.order_id
            WHERE sc.user_id = ?1 AND sc.order_id != ?2
              AND sc.is_new_customer_order = 1 AND sc.is_accounted = 1
              AND sc.is_accounted_cancelled = 0
              AND o.status != 'cancelled'
        )
        "#,
    )
    .bind(user_id)
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Another order of the user, still in flight, already claims the bonus.
pub async fn has_in_flight_new_customer(conn: &mut SqliteConnection, user_id: i64, order_id: i64) -> DbResult<bool> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM sales_commissions sc
            JOIN orders o ON o.id = sc.order_id
            WHERE sc.user_id = ?1 AND sc.order_id != ?2
              AND sc.is_new_customer_order = 1
              AND o.status NOT IN ('cancelled', 'paid')
        )
        "#,
    )
    .bind(user_id)
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

// =============================================================================
// Listing
// =============================================================================

/// Listing and bulk-selection filter.
#[derive(Debug, Clone, Default)]
pub struct CommissionQuery {
    pub employee_code: Option<String>,
    pub month: Option<String>,
    pub status: Option<CommissionStatusFilter>,
    /// Inclusive bounds on `order_date`.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn status_clause(status: CommissionStatusFilter) -> &'static str {
    match status {
        CommissionStatusFilter::Accounted => "is_accounted = 1 AND is_accounted_cancelled = 0",
        CommissionStatusFilter::Settled => "is_settled = 1 AND is_accounted_cancelled = 0",
        CommissionStatusFilter::Unaccounted => "is_accounted = 0",
        CommissionStatusFilter::Unsettled => "is_settled = 0 AND is_accounted_cancelled = 0",
        CommissionStatusFilter::Cancelled => "is_accounted_cancelled = 1",
        CommissionStatusFilter::Invalid => "is_valid_order = 0",
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a CommissionQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(code) = &query.employee_code {
        builder.push(" AND employee_code = ").push_bind(code.as_str());
    }
    if let Some(month) = &query.month {
        builder.push(" AND calc_month = ").push_bind(month.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND ").push(status_clause(status));
    }
    if let Some(start) = query.start {
        builder.push(" AND order_date >= ").push_bind(start);
    }
    if let Some(end) = query.end {
        builder.push(" AND order_date <= ").push_bind(end);
    }
}

/// A page of rows, newest order first.
pub async fn list(
    conn: &mut SqliteConnection,
    query: &CommissionQuery,
    limit: i64,
    offset: i64,
) -> DbResult<Vec<SalesCommission>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COMMISSION);
    push_filters(&mut builder, query);
    builder
        .push(" ORDER BY order_date DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let rows = builder.build_query_as::<CommissionRow>().fetch_all(conn).await?;
    Ok(rows.into_iter().map(SalesCommission::from).collect())
}

pub async fn count(conn: &mut SqliteConnection, query: &CommissionQuery) -> DbResult<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sales_commissions");
    push_filters(&mut builder, query);
    let total = builder.build_query_scalar::<i64>().fetch_one(conn).await?;
    Ok(total)
}

/// Every row matching a filter, oldest first.
pub async fn select_all(conn: &mut SqliteConnection, query: &CommissionQuery) -> DbResult<Vec<SalesCommission>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COMMISSION);
    push_filters(&mut builder, query);
    builder.push(" ORDER BY id");
    let rows = builder.build_query_as::<CommissionRow>().fetch_all(conn).await?;
    Ok(rows.into_iter().map(SalesCommission::from).collect())
}

// =============================================================================
// Monthly Stats
// =============================================================================

#[derive(Debug, FromRow)]
struct StatsRow {
    employee_code: String,
    month: String,
    #[sqlx(rename = "total_sales_cents")]
    total_sales: Money,
    total_valid_orders: i64,
    total_new_customers: i64,
    #[sqlx(rename = "total_profit_cents")]
    total_profit: Money,
    #[sqlx(rename = "total_base_commission_cents")]
    total_base_commission: Money,
    #[sqlx(rename = "total_new_customer_bonus_cents")]
    total_new_customer_bonus: Money,
    #[sqlx(rename = "total_tier_commission_cents")]
    total_tier_commission: Money,
    #[sqlx(rename = "total_commission_cents")]
    total_commission: Money,
    tier_level: u8,
}

impl From<StatsRow> for MonthlyStats {
    fn from(row: StatsRow) -> Self {
        MonthlyStats {
            employee_code: row.employee_code,
            month: row.month,
            total_sales: row.total_sales,
            total_valid_orders: row.total_valid_orders,
            total_new_customers: row.total_new_customers,
            total_profit: row.total_profit,
            total_base_commission: row.total_base_commission,
            total_new_customer_bonus: row.total_new_customer_bonus,
            total_tier_commission: row.total_tier_commission,
            total_commission: row.total_commission,
            tier_level: row.tier_level,
        }
    }
}

const SELECT_STATS: &str = r#"
    SELECT employee_code, month, total_sales_cents, total_valid_orders, total_new_customers,
           total_profit_cents, total_base_commission_cents, total_new_customer_bonus_cents,
           total_tier_commission_cents, total_commission_cents, tier_level
    FROM sales_commission_monthly_stats
"#;

pub async fn save_stats(conn: &mut SqliteConnection, stats: &MonthlyStats, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales_commission_monthly_stats (
            employee_code, month, total_sales_cents, total_valid_orders, total_new_customers,
            total_profit_cents, total_base_commission_cents, total_new_customer_bonus_cents,
            total_tier_commission_cents, total_commission_cents, tier_level, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(employee_code, month) DO UPDATE SET
            total_sales_cents = excluded.total_sales_cents,
            total_valid_orders = excluded.total_valid_orders,
            total_new_customers = excluded.total_new_customers,
            total_profit_cents = excluded.total_profit_cents,
            total_base_commission_cents = excluded.total_base_commission_cents,
            total_new_customer_bonus_cents = excluded.total_new_customer_bonus_cents,
            total_tier_commission_cents = excluded.total_tier_commission_cents,
            total_commission_cents = excluded.total_commission_cents,
            tier_level = excluded.tier_level,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&stats.employee_code)
    .bind(&stats.month)
    .bind(stats.total_sales)
    .bind(stats.total_valid_orders)
    .bind(stats.total_new_customers)
    .bind(stats.total_profit)
    .bind(stats.total_base_commission)
    .bind(stats.total_new_customer_bonus)
    .bind(stats.total_tier_commission)
    .bind(stats.total_commission)
    .bind(stats.tier_level)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_stats(
    conn: &mut SqliteConnection,
    employee_code: &str,
    month: &str,
) -> DbResult<Option<MonthlyStats>> {
    let row: Option<StatsRow> = sqlx::query_as(&format!("{SELECT_STATS} WHERE employee_code = ?1 AND month = ?2"))
        .bind(employee_code)
        .bind(month)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(MonthlyStats::from))
}

/// Every salesperson's stats for a month, highest commission first.
pub async fn stats_for_month(conn: &mut SqliteConnection, month: &str) -> DbResult<Vec<MonthlyStats>> {
    let rows: Vec<StatsRow> = sqlx::query_as(&format!(
        "{SELECT_STATS} WHERE month = ?1 ORDER BY total_commission_cents DESC, employee_code"
    ))
    .bind(month)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(MonthlyStats::from).collect())
}
