//! # Coupon Service
//!
//! Templates, issuance to users, and the user's coupon wallet.
//! Coupons are consumed by order creation, not here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use mercato_core::coupon::{self, Coupon, CouponIssueLog, HeldCoupon};
use mercato_core::validation::{validate_non_negative, validate_text};
use mercato_core::{CouponStatus, CouponType, Money, OperatorType, ValidationError};

use super::error::{EngineError, EngineResult};
use super::EngineState;
use crate::pool::commit;
use crate::repository::catalog;
use crate::repository::coupon::{self as coupon_repo, NewCoupon, NewIssueLog};

const MAX_NAME_LEN: usize = 100;

/// Fields of a new coupon template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCouponRequest {
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_value: Money,
    #[serde(default)]
    pub min_amount: Money,
    /// Empty applies to every category.
    #[serde(default)]
    pub category_ids: Vec<i64>,
    /// 0 means unlimited.
    #[serde(default)]
    pub total_count: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

/// Hands `quantity` copies of a template to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCouponRequest {
    pub user_id: i64,
    pub coupon_id: i64,
    pub quantity: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub operator_type: OperatorType,
    pub operator_id: i64,
    pub operator_name: String,
    pub reason: Option<String>,
}

pub struct CouponService {
    state: Arc<EngineState>,
}

impl CouponService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        CouponService { state }
    }

    pub async fn create_coupon(&self, request: CreateCouponRequest) -> EngineResult<Coupon> {
        let name = validate_text("name", &request.name, MAX_NAME_LEN)?;
        validate_non_negative("discount_value", request.discount_value)?;
        validate_non_negative("min_amount", request.min_amount)?;
        if request.total_count < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "total_count".to_string(),
            }
            .into());
        }
        if request.valid_to < request.valid_from {
            return Err(ValidationError::InvalidFormat {
                field: "valid_to".to_string(),
                reason: "must not be before valid_from".to_string(),
            }
            .into());
        }

        let mut conn = self.state.db.acquire().await?;
        let id = coupon_repo::insert_coupon(
            &mut conn,
            &NewCoupon {
                name: &name,
                coupon_type: request.coupon_type,
                discount_value: request.discount_value,
                min_amount: request.min_amount,
                category_ids: &request.category_ids,
                total_count: request.total_count,
                valid_from: request.valid_from,
                valid_to: request.valid_to,
            },
            self.state.now(),
        )
        .await?;
        info!(coupon_id = id, name = %name, kind = %request.coupon_type, "Coupon created");
        fetch_coupon(&mut conn, id).await
    }

    pub async fn get_coupon(&self, coupon_id: i64) -> EngineResult<Coupon> {
        let mut conn = self.state.db.acquire().await?;
        fetch_coupon(&mut conn, coupon_id).await
    }

    /// Enables or disables a template. Held copies follow the template.
    pub async fn set_status(&self, coupon_id: i64, status: CouponStatus) -> EngineResult<Coupon> {
        let mut conn = self.state.db.acquire().await?;
        if !coupon_repo::set_coupon_status(&mut conn, coupon_id, status).await? {
            return Err(EngineError::not_found("Coupon", coupon_id));
        }
        fetch_coupon(&mut conn, coupon_id).await
    }

    /// Issues copies and writes the audit entry in one transaction.
    /// Returns the new user coupon ids.
    pub async fn issue_coupon(&self, request: IssueCouponRequest) -> EngineResult<Vec<i64>> {
        let operator_name = validate_text("operator_name", &request.operator_name, MAX_NAME_LEN)?;
        let now = self.state.now();
        let mut tx = self.state.db.begin().await?;

        if catalog::fetch_user(&mut tx, request.user_id).await?.is_none() {
            return Err(EngineError::not_found("User", request.user_id));
        }
        let template = fetch_coupon(&mut tx, request.coupon_id).await?;
        let issued = coupon_repo::count_issued(&mut tx, template.id).await?;
        coupon::check_issuable(&template, issued, request.quantity, request.expires_at, now)?;

        let mut ids = Vec::with_capacity(request.quantity as usize);
        for _ in 0..request.quantity {
            ids.push(coupon_repo::insert_user_coupon(&mut tx, request.user_id, template.id, request.expires_at, now).await?);
        }
        coupon_repo::insert_issue_log(
            &mut tx,
            &NewIssueLog {
                user_id: request.user_id,
                coupon_id: template.id,
                coupon_name: &template.name,
                quantity: request.quantity,
                reason: request.reason.as_deref(),
                operator_type: request.operator_type,
                operator_id: request.operator_id,
                operator_name: &operator_name,
                expires_at: request.expires_at,
            },
            now,
        )
        .await?;
        commit(tx).await?;

        info!(
            user_id = request.user_id,
            coupon_id = template.id,
            quantity = request.quantity,
            operator = %operator_name,
            "Coupons issued"
        );
        Ok(ids)
    }

    /// Every coupon the user holds. Overdue unused copies are marked expired first.
    pub async fn list_user_coupons(&self, user_id: i64) -> EngineResult<Vec<HeldCoupon>> {
        let mut conn = self.state.db.acquire().await?;
        let expired = coupon_repo::expire_overdue(&mut conn, user_id, self.state.now()).await?;
        if expired > 0 {
            info!(user_id, expired, "Expired overdue coupons");
        }
        Ok(coupon_repo::held_all(&mut conn, user_id).await?)
    }

    pub async fn issue_logs(&self, user_id: i64) -> EngineResult<Vec<CouponIssueLog>> {
        let mut conn = self.state.db.acquire().await?;
        Ok(coupon_repo::issue_logs_for_user(&mut conn, user_id).await?)
    }
}

async fn fetch_coupon(conn: &mut sqlx::SqliteConnection, coupon_id: i64) -> EngineResult<Coupon> {
    coupon_repo::fetch_coupon(conn, coupon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Coupon", coupon_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{fixture, start};
    use crate::service::ErrorKind;
    use chrono::Duration;
    use mercato_core::UserCouponStatus;

    fn template(total_count: i64) -> CreateCouponRequest {
        CreateCouponRequest {
            name: "Spring sale".to_string(),
            coupon_type: CouponType::Amount,
            discount_value: Money::from_major(10),
            min_amount: Money::from_major(50),
            category_ids: vec![],
            total_count,
            valid_from: start() - Duration::days(1),
            valid_to: start() + Duration::days(10),
        }
    }

    fn issue(user_id: i64, coupon_id: i64, quantity: i64, expires_at: Option<DateTime<Utc>>) -> IssueCouponRequest {
        IssueCouponRequest {
            user_id,
            coupon_id,
            quantity,
            expires_at,
            operator_type: OperatorType::Admin,
            operator_id: 1,
            operator_name: "ops".to_string(),
            reason: Some("launch".to_string()),
        }
    }

    #[tokio::test]
    async fn test_issue_respects_stock_and_logs() {
        let f = fixture().await;
        let coupons = f.engine.coupons();
        let coupon = coupons.create_coupon(template(3)).await.unwrap();

        let ids = coupons.issue_coupon(issue(f.user_id, coupon.id, 2, None)).await.unwrap();
        assert_eq!(ids.len(), 2);

        let err = coupons.issue_coupon(issue(f.user_id, coupon.id, 2, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CouponUnavailable);
        // The failed issue wrote nothing.
        assert_eq!(coupons.list_user_coupons(f.user_id).await.unwrap().len(), 2);

        let logs = coupons.issue_logs(f.user_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].quantity, 2);
        assert_eq!(logs[0].coupon_name, "Spring sale");
        assert_eq!(logs[0].reason.as_deref(), Some("launch"));
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_requests() {
        let f = fixture().await;
        let coupons = f.engine.coupons();
        let coupon = coupons.create_coupon(template(0)).await.unwrap();

        let err = coupons.issue_coupon(issue(f.user_id, coupon.id, 0, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let late = start() + Duration::days(20);
        let err = coupons.issue_coupon(issue(f.user_id, coupon.id, 1, Some(late))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CouponUnavailable);

        coupons.set_status(coupon.id, CouponStatus::Disabled).await.unwrap();
        let err = coupons.issue_coupon(issue(f.user_id, coupon.id, 1, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CouponUnavailable);

        let err = coupons.issue_coupon(issue(f.user_id, 999, 1, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_listing_expires_overdue_copies() {
        let f = fixture().await;
        let coupons = f.engine.coupons();
        let coupon = coupons.create_coupon(template(0)).await.unwrap();
        let soon = start() + Duration::hours(1);
        coupons.issue_coupon(issue(f.user_id, coupon.id, 1, Some(soon))).await.unwrap();

        let held = coupons.list_user_coupons(f.user_id).await.unwrap();
        assert_eq!(held[0].user_coupon.status, UserCouponStatus::Unused);

        f.clock.advance(Duration::hours(2));
        let held = coupons.list_user_coupons(f.user_id).await.unwrap();
        assert_eq!(held[0].user_coupon.status, UserCouponStatus::Expired);
    }

    #[tokio::test]
    async fn test_create_validates_window() {
        let f = fixture().await;
        let mut request = template(0);
        request.valid_to = request.valid_from - Duration::days(1);
        let err = f.engine.coupons().create_coupon(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
