//! # Coupon Repository
//!
//! Coupon templates, the instances users hold, and the issuance log.
//!
//! Held coupons are always loaded in "loader order": discount descending,
//! then newest instance first. Selection tie-breaks depend on it.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::coupon::{Coupon, CouponIssueLog, HeldCoupon, UserCoupon};
use mercato_core::{CouponStatus, CouponType, Money, OperatorType, UserCouponStatus};

use super::{from_json, to_json};
use crate::error::DbResult;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct CouponRow {
    id: i64,
    name: String,
    coupon_type: CouponType,
    #[sqlx(rename = "discount_value_cents")]
    discount_value: Money,
    #[sqlx(rename = "min_amount_cents")]
    min_amount: Money,
    category_ids: String,
    total_count: i64,
    used_count: i64,
    status: CouponStatus,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_coupon(self) -> DbResult<Coupon> {
        Ok(Coupon {
            id: self.id,
            name: self.name,
            coupon_type: self.coupon_type,
            discount_value: self.discount_value,
            min_amount: self.min_amount,
            category_ids: from_json("coupons.category_ids", &self.category_ids)?,
            total_count: self.total_count,
            used_count: self.used_count,
            status: self.status,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserCouponRow {
    id: i64,
    user_id: i64,
    coupon_id: i64,
    status: UserCouponStatus,
    expires_at: Option<DateTime<Utc>>,
    order_id: Option<i64>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserCouponRow> for UserCoupon {
    fn from(row: UserCouponRow) -> Self {
        UserCoupon {
            id: row.id,
            user_id: row.user_id,
            coupon_id: row.coupon_id,
            status: row.status,
            expires_at: row.expires_at,
            order_id: row.order_id,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

/// A user coupon joined with its template in one row.
#[derive(Debug, FromRow)]
struct HeldRow {
    #[sqlx(flatten)]
    user_coupon: UserCouponRow,
    #[sqlx(rename = "c_id")]
    template_id: i64,
    name: String,
    coupon_type: CouponType,
    #[sqlx(rename = "discount_value_cents")]
    discount_value: Money,
    #[sqlx(rename = "min_amount_cents")]
    min_amount: Money,
    category_ids: String,
    total_count: i64,
    used_count: i64,
    #[sqlx(rename = "c_status")]
    template_status: CouponStatus,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    #[sqlx(rename = "c_created_at")]
    template_created_at: DateTime<Utc>,
}

impl HeldRow {
    fn into_held(self) -> DbResult<HeldCoupon> {
        let coupon = CouponRow {
            id: self.template_id,
            name: self.name,
            coupon_type: self.coupon_type,
            discount_value: self.discount_value,
            min_amount: self.min_amount,
            category_ids: self.category_ids,
            total_count: self.total_count,
            used_count: self.used_count,
            status: self.template_status,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            created_at: self.template_created_at,
        }
        .into_coupon()?;
        Ok(HeldCoupon {
            user_coupon: self.user_coupon.into(),
            coupon,
        })
    }
}

const SELECT_COUPON: &str = r#"
    SELECT id, name, coupon_type, discount_value_cents, min_amount_cents, category_ids,
           total_count, used_count, status, valid_from, valid_to, created_at
    FROM coupons
"#;

const SELECT_HELD: &str = r#"
    SELECT
        uc.id, uc.user_id, uc.coupon_id, uc.status, uc.expires_at, uc.order_id,
        uc.used_at, uc.created_at,
        c.id AS c_id, c.name, c.coupon_type, c.discount_value_cents, c.min_amount_cents,
        c.category_ids, c.total_count, c.used_count, c.status AS c_status,
        c.valid_from, c.valid_to, c.created_at AS c_created_at
    FROM user_coupons uc
    JOIN coupons c ON c.id = uc.coupon_id
"#;

// =============================================================================
// Templates
// =============================================================================

/// Fields of a new coupon template.
#[derive(Debug, Clone)]
pub struct NewCoupon<'a> {
    pub name: &'a str,
    pub coupon_type: CouponType,
    pub discount_value: Money,
    pub min_amount: Money,
    pub category_ids: &'a [i64],
    pub total_count: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

pub async fn insert_coupon(conn: &mut SqliteConnection, coupon: &NewCoupon<'_>, now: DateTime<Utc>) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO coupons (
            name, coupon_type, discount_value_cents, min_amount_cents, category_ids,
            total_count, used_count, status, valid_from, valid_to, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 'active', ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(coupon.name)
    .bind(coupon.coupon_type)
    .bind(coupon.discount_value)
    .bind(coupon.min_amount)
    .bind(to_json("coupons.category_ids", &coupon.category_ids)?)
    .bind(coupon.total_count)
    .bind(coupon.valid_from)
    .bind(coupon.valid_to)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_coupon(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Coupon>> {
    let row: Option<CouponRow> = sqlx::query_as(&format!("{SELECT_COUPON} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(CouponRow::into_coupon).transpose()
}

pub async fn set_coupon_status(conn: &mut SqliteConnection, id: i64, status: CouponStatus) -> DbResult<bool> {
    let result = sqlx::query("UPDATE coupons SET status = ?2 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Instances of a template handed out so far, in any state.
pub async fn count_issued(conn: &mut SqliteConnection, coupon_id: i64) -> DbResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM user_coupons WHERE coupon_id = ?1")
        .bind(coupon_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

pub async fn increment_used_count(conn: &mut SqliteConnection, coupon_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = ?1")
        .bind(coupon_id)
        .execute(conn)
        .await?;
    Ok(())
}

// =============================================================================
// Held Coupons
// =============================================================================

/// Unused coupons of a user in loader order.
pub async fn held_unused(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Vec<HeldCoupon>> {
    let rows: Vec<HeldRow> = sqlx::query_as(&format!(
        "{SELECT_HELD} WHERE uc.user_id = ?1 AND uc.status = 'unused' \
         ORDER BY c.discount_value_cents DESC, uc.created_at DESC, uc.id DESC"
    ))
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(HeldRow::into_held).collect()
}

/// Every coupon a user holds, newest first.
pub async fn held_all(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Vec<HeldCoupon>> {
    let rows: Vec<HeldRow> = sqlx::query_as(&format!(
        "{SELECT_HELD} WHERE uc.user_id = ?1 ORDER BY uc.created_at DESC, uc.id DESC"
    ))
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(HeldRow::into_held).collect()
}

pub async fn fetch_held(conn: &mut SqliteConnection, user_coupon_id: i64) -> DbResult<Option<HeldCoupon>> {
    let row: Option<HeldRow> = sqlx::query_as(&format!("{SELECT_HELD} WHERE uc.id = ?1"))
        .bind(user_coupon_id)
        .fetch_optional(conn)
        .await?;
    row.map(HeldRow::into_held).transpose()
}

pub async fn insert_user_coupon(
    conn: &mut SqliteConnection,
    user_id: i64,
    coupon_id: i64,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO user_coupons (user_id, coupon_id, status, expires_at, created_at)
        VALUES (?1, ?2, 'unused', ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(coupon_id)
    .bind(expires_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Flips an unused instance to used. Returns `false` if it was not unused.
pub async fn mark_used(
    conn: &mut SqliteConnection,
    user_coupon_id: i64,
    order_id: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE user_coupons SET status = 'used', order_id = ?2, used_at = ?3 WHERE id = ?1 AND status = 'unused'",
    )
    .bind(user_coupon_id)
    .bind(order_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Marks overdue unused instances of a user as expired.
pub async fn expire_overdue(conn: &mut SqliteConnection, user_id: i64, now: DateTime<Utc>) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE user_coupons SET status = 'expired'
        WHERE user_id = ?1 AND status = 'unused' AND expires_at IS NOT NULL AND expires_at < ?2
        "#,
    )
    .bind(user_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Issue Log
// =============================================================================

/// Fields of an issuance audit entry.
#[derive(Debug, Clone)]
pub struct NewIssueLog<'a> {
    pub user_id: i64,
    pub coupon_id: i64,
    pub coupon_name: &'a str,
    pub quantity: i64,
    pub reason: Option<&'a str>,
    pub operator_type: OperatorType,
    pub operator_id: i64,
    pub operator_name: &'a str,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn insert_issue_log(conn: &mut SqliteConnection, log: &NewIssueLog<'_>, now: DateTime<Utc>) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO coupon_issue_logs (
            user_id, coupon_id, coupon_name, quantity, reason,
            operator_type, operator_id, operator_name, expires_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        RETURNING id
        "#,
    )
    .bind(log.user_id)
    .bind(log.coupon_id)
    .bind(log.coupon_name)
    .bind(log.quantity)
    .bind(log.reason)
    .bind(log.operator_type)
    .bind(log.operator_id)
    .bind(log.operator_name)
    .bind(log.expires_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

#[derive(Debug, FromRow)]
struct IssueLogRow {
    id: i64,
    user_id: i64,
    coupon_id: i64,
    coupon_name: String,
    quantity: i64,
    reason: Option<String>,
    operator_type: OperatorType,
    operator_id: i64,
    operator_name: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<IssueLogRow> for CouponIssueLog {
    fn from(row: IssueLogRow) -> Self {
        CouponIssueLog {
            id: row.id,
            user_id: row.user_id,
            coupon_id: row.coupon_id,
            coupon_name: row.coupon_name,
            quantity: row.quantity,
            reason: row.reason,
            operator_type: row.operator_type,
            operator_id: row.operator_id,
            operator_name: row.operator_name,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// Issuance history of a user, newest first.
pub async fn issue_logs_for_user(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Vec<CouponIssueLog>> {
    let rows: Vec<IssueLogRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, coupon_id, coupon_name, quantity, reason,
               operator_type, operator_id, operator_name, expires_at, created_at
        FROM coupon_issue_logs
        WHERE user_id = ?1
        ORDER BY id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(CouponIssueLog::from).collect())
}
