//! # Coupon Selection
//!
//! Which of a user's coupons apply to a checkout, and which pair is used.
//!
//! ## Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  held coupons ─► drop expired / out of window / disabled                │
//! │              ─► tag available or {amount threshold, category mismatch,  │
//! │                                   already free shipping}                │
//! │              ─► split by type                                           │
//! │                                                                         │
//! │  delivery bucket: pinned if present, else first (loader order)          │
//! │  amount bucket:   pinned if min met, else highest discount with min met │
//! │                                                                         │
//! │  at most ONE of each type per order                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CouponStatus, CouponType, OperatorType, UserCouponStatus};

// =============================================================================
// Records
// =============================================================================

/// A coupon template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_value: Money,
    pub min_amount: Money,
    /// Empty means any category.
    pub category_ids: Vec<i64>,
    /// 0 means unlimited.
    pub total_count: i64,
    pub used_count: i64,
    pub status: CouponStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now <= self.valid_to
    }

    pub fn is_exhausted(&self) -> bool {
        self.total_count > 0 && self.used_count >= self.total_count
    }
}

/// One coupon instance owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCoupon {
    pub id: i64,
    pub user_id: i64,
    pub coupon_id: i64,
    pub status: UserCouponStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub order_id: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserCoupon {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// A user coupon joined with its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldCoupon {
    pub user_coupon: UserCoupon,
    pub coupon: Coupon,
}

/// Audit entry written whenever coupons are handed out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponIssueLog {
    pub id: i64,
    pub user_id: i64,
    pub coupon_id: i64,
    pub coupon_name: String,
    pub quantity: i64,
    pub reason: Option<String>,
    pub operator_type: OperatorType,
    pub operator_id: i64,
    pub operator_name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Availability
// =============================================================================

/// Why a coupon cannot be used on this checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    #[serde(rename = "amount threshold")]
    AmountThreshold,
    #[serde(rename = "category mismatch")]
    CategoryMismatch,
    #[serde(rename = "already free shipping")]
    AlreadyFreeShipping,
}

impl UnavailableReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::AmountThreshold => "amount threshold",
            UnavailableReason::CategoryMismatch => "category mismatch",
            UnavailableReason::AlreadyFreeShipping => "already free shipping",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The checkout a coupon is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutContext {
    pub order_amount: Money,
    pub category_ids: Vec<i64>,
    pub delivery_fee: Money,
    pub is_free_shipping: bool,
}

/// A usable-in-principle coupon, tagged for this checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableCoupon {
    pub user_coupon_id: i64,
    pub coupon_id: i64,
    pub name: String,
    pub coupon_type: CouponType,
    pub discount_value: Money,
    pub min_amount: Money,
    pub category_ids: Vec<i64>,
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

/// Expired, out of window or disabled coupons are not shown at all.
pub fn is_usable(held: &HeldCoupon, now: DateTime<Utc>) -> bool {
    held.user_coupon.status == UserCouponStatus::Unused
        && !held.user_coupon.is_overdue(now)
        && held.coupon.is_in_window(now)
        && held.coupon.status == CouponStatus::Active
}

fn unavailable_reason(coupon: &Coupon, ctx: &CheckoutContext) -> Option<UnavailableReason> {
    if ctx.order_amount < coupon.min_amount {
        return Some(UnavailableReason::AmountThreshold);
    }
    if !coupon.category_ids.is_empty() {
        let wanted: HashSet<i64> = coupon.category_ids.iter().copied().collect();
        if !ctx.category_ids.iter().any(|id| wanted.contains(id)) {
            return Some(UnavailableReason::CategoryMismatch);
        }
    }
    if coupon.coupon_type == CouponType::DeliveryFee && ctx.is_free_shipping {
        return Some(UnavailableReason::AlreadyFreeShipping);
    }
    None
}

/// Filters and tags held coupons, keeping the caller's order.
pub fn tag_available(held: &[HeldCoupon], ctx: &CheckoutContext, now: DateTime<Utc>) -> Vec<AvailableCoupon> {
    held.iter()
        .filter(|h| is_usable(h, now))
        .map(|h| {
            let reason = unavailable_reason(&h.coupon, ctx);
            AvailableCoupon {
                user_coupon_id: h.user_coupon.id,
                coupon_id: h.coupon.id,
                name: h.coupon.name.clone(),
                coupon_type: h.coupon.coupon_type,
                discount_value: h.coupon.discount_value,
                min_amount: h.coupon.min_amount,
                category_ids: h.coupon.category_ids.clone(),
                is_available: reason.is_none(),
                reason,
            }
        })
        .collect()
}

// =============================================================================
// Combination
// =============================================================================

/// Coupons the customer asked for explicitly (user coupon ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinnedCoupons {
    pub delivery_coupon_id: Option<i64>,
    pub amount_coupon_id: Option<i64>,
}

/// The pair actually applied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CouponCombination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_fee_coupon: Option<AvailableCoupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_coupon: Option<AvailableCoupon>,
    pub delivery_fee_saved: Money,
    pub amount_saved: Money,
    pub total_discount: Money,
}

impl CouponCombination {
    /// User coupon ids to consume, delivery first.
    pub fn user_coupon_ids(&self) -> Vec<i64> {
        self.delivery_fee_coupon
            .iter()
            .chain(self.amount_coupon.iter())
            .map(|c| c.user_coupon_id)
            .collect()
    }
}

/// Picks one delivery-fee coupon and one amount coupon.
///
/// `tagged` must be in loader order (discount descending, newest first);
/// ties on the amount side go to the earlier entry.
pub fn select_combination(
    tagged: &[AvailableCoupon],
    ctx: &CheckoutContext,
    pinned: PinnedCoupons,
) -> CouponCombination {
    let bucket = |kind: CouponType| -> Vec<&AvailableCoupon> {
        tagged
            .iter()
            .filter(|c| c.is_available && c.coupon_type == kind)
            .collect()
    };
    let delivery_bucket = bucket(CouponType::DeliveryFee);
    let amount_bucket = bucket(CouponType::Amount);

    let find = |bucket: &[&AvailableCoupon], id: Option<i64>| -> Option<AvailableCoupon> {
        let id = id?;
        bucket
            .iter()
            .find(|c| c.user_coupon_id == id)
            .map(|c| (*c).clone())
    };

    let mut result = CouponCombination::default();

    if !ctx.is_free_shipping {
        result.delivery_fee_coupon = find(delivery_bucket.as_slice(), pinned.delivery_coupon_id)
            .or_else(|| delivery_bucket.first().map(|c| (*c).clone()));
        if result.delivery_fee_coupon.is_some() {
            result.delivery_fee_saved = ctx.delivery_fee;
        }
    }

    result.amount_coupon = find(amount_bucket.as_slice(), pinned.amount_coupon_id)
        .filter(|c| c.min_amount <= ctx.order_amount)
        .or_else(|| {
            let mut best: Option<&AvailableCoupon> = None;
            for candidate in amount_bucket.iter().copied() {
                if candidate.min_amount > ctx.order_amount || !candidate.discount_value.is_positive() {
                    continue;
                }
                if best.map_or(true, |b| candidate.discount_value > b.discount_value) {
                    best = Some(candidate);
                }
            }
            best.cloned()
        });
    if let Some(coupon) = &result.amount_coupon {
        result.amount_saved = coupon.discount_value;
    }

    result.total_discount = result.delivery_fee_saved + result.amount_saved;
    result
}

// =============================================================================
// Commit-Time Checks
// =============================================================================

/// Re-checks a held coupon right before it is consumed.
pub fn check_consumable(held: &HeldCoupon, user_id: i64, now: DateTime<Utc>) -> CoreResult<()> {
    let uc = &held.user_coupon;
    let fail = |reason: &str| Err(CoreError::coupon_unavailable(uc.id, reason));

    if uc.user_id != user_id {
        return fail("belongs to another user");
    }
    match uc.status {
        UserCouponStatus::Used => return fail("already used"),
        UserCouponStatus::Expired => return fail("expired"),
        UserCouponStatus::Unused => {}
    }
    if uc.is_overdue(now) {
        return fail("expired");
    }
    if held.coupon.status != CouponStatus::Active {
        return fail("disabled");
    }
    if !held.coupon.is_in_window(now) {
        return fail("outside validity window");
    }
    if held.coupon.is_exhausted() {
        return fail("exhausted");
    }
    Ok(())
}

/// Validates an issuance request against the template.
///
/// `issued` is how many instances of the template exist already.
pub fn check_issuable(
    coupon: &Coupon,
    issued: i64,
    quantity: i64,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let fail = |reason: String| Err(CoreError::coupon_not_issuable(coupon.id, reason));

    if quantity <= 0 {
        return Err(crate::error::ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if coupon.status != CouponStatus::Active {
        return fail("disabled".to_string());
    }
    if !coupon.is_in_window(now) {
        return fail("outside validity window".to_string());
    }
    if coupon.total_count > 0 && issued + quantity > coupon.total_count {
        return fail(format!(
            "only {} left",
            (coupon.total_count - issued).max(0)
        ));
    }
    if let Some(at) = expires_at {
        if at < now {
            return fail("expiry is in the past".to_string());
        }
        if at > coupon.valid_to {
            return fail("expiry is after the template's end".to_string());
        }
        if at < coupon.valid_from {
            return fail("expiry is before the template's start".to_string());
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn held(id: i64, kind: CouponType, discount: i64, min: i64) -> HeldCoupon {
        HeldCoupon {
            user_coupon: UserCoupon {
                id,
                user_id: 1,
                coupon_id: 100 + id,
                status: UserCouponStatus::Unused,
                expires_at: None,
                order_id: None,
                used_at: None,
                created_at: now() - Duration::days(1),
            },
            coupon: Coupon {
                id: 100 + id,
                name: format!("coupon-{id}"),
                coupon_type: kind,
                discount_value: Money::from_major(discount),
                min_amount: Money::from_major(min),
                category_ids: vec![],
                total_count: 0,
                used_count: 0,
                status: CouponStatus::Active,
                valid_from: now() - Duration::days(30),
                valid_to: now() + Duration::days(30),
                created_at: now() - Duration::days(30),
            },
        }
    }

    fn ctx(amount: i64, delivery: i64, free: bool) -> CheckoutContext {
        CheckoutContext {
            order_amount: Money::from_major(amount),
            category_ids: vec![1, 2],
            delivery_fee: Money::from_major(delivery),
            is_free_shipping: free,
        }
    }

    #[test]
    fn test_auto_pick_best_pair() {
        let coupons = vec![
            held(1, CouponType::DeliveryFee, 0, 0),
            held(3, CouponType::Amount, 20, 150),
            held(2, CouponType::Amount, 10, 80),
        ];
        let ctx = ctx(120, 6, false);
        let tagged = tag_available(&coupons, &ctx, now());
        let combo = select_combination(&tagged, &ctx, PinnedCoupons::default());

        assert_eq!(combo.delivery_fee_coupon.as_ref().map(|c| c.user_coupon_id), Some(1));
        assert_eq!(combo.amount_coupon.as_ref().map(|c| c.user_coupon_id), Some(2));
        assert_eq!(combo.delivery_fee_saved, Money::from_major(6));
        assert_eq!(combo.amount_saved, Money::from_major(10));
        assert_eq!(combo.total_discount, Money::from_major(16));
        assert_eq!(combo.user_coupon_ids(), vec![1, 2]);

        let c = tagged.iter().find(|c| c.user_coupon_id == 3).unwrap();
        assert!(!c.is_available);
        assert_eq!(c.reason, Some(UnavailableReason::AmountThreshold));
    }

    #[test]
    fn test_reasons() {
        let mut by_category = held(1, CouponType::Amount, 5, 0);
        by_category.coupon.category_ids = vec![9];
        let delivery = held(2, CouponType::DeliveryFee, 0, 0);

        let tagged = tag_available(&[by_category, delivery], &ctx(50, 0, true), now());
        assert_eq!(tagged[0].reason, Some(UnavailableReason::CategoryMismatch));
        assert_eq!(tagged[1].reason, Some(UnavailableReason::AlreadyFreeShipping));

        let json = serde_json::to_value(&tagged[1]).unwrap();
        assert_eq!(json["reason"], "already free shipping");
    }

    #[test]
    fn test_unusable_are_dropped() {
        let mut expired = held(1, CouponType::Amount, 5, 0);
        expired.user_coupon.expires_at = Some(now() - Duration::minutes(1));
        let mut disabled = held(2, CouponType::Amount, 5, 0);
        disabled.coupon.status = CouponStatus::Disabled;
        let mut future = held(3, CouponType::Amount, 5, 0);
        future.coupon.valid_from = now() + Duration::days(1);
        let mut used = held(4, CouponType::Amount, 5, 0);
        used.user_coupon.status = UserCouponStatus::Used;

        let tagged = tag_available(&[expired, disabled, future, used], &ctx(50, 5, false), now());
        assert!(tagged.is_empty());
    }

    #[test]
    fn test_pinned_wins_when_valid() {
        let coupons = vec![
            held(1, CouponType::DeliveryFee, 0, 0),
            held(2, CouponType::DeliveryFee, 0, 0),
            held(3, CouponType::Amount, 20, 0),
            held(4, CouponType::Amount, 5, 0),
        ];
        let ctx = ctx(100, 6, false);
        let tagged = tag_available(&coupons, &ctx, now());

        let combo = select_combination(
            &tagged,
            &ctx,
            PinnedCoupons {
                delivery_coupon_id: Some(2),
                amount_coupon_id: Some(4),
            },
        );
        assert_eq!(combo.user_coupon_ids(), vec![2, 4]);
        assert_eq!(combo.total_discount, Money::from_major(11));

        // unknown pins fall back
        let combo = select_combination(
            &tagged,
            &ctx,
            PinnedCoupons {
                delivery_coupon_id: Some(99),
                amount_coupon_id: Some(98),
            },
        );
        assert_eq!(combo.user_coupon_ids(), vec![1, 3]);
    }

    #[test]
    fn test_no_delivery_coupon_when_free() {
        let coupons = vec![held(1, CouponType::DeliveryFee, 0, 0)];
        let ctx = ctx(100, 0, true);
        let tagged = tag_available(&coupons, &ctx, now());
        let combo = select_combination(
            &tagged,
            &ctx,
            PinnedCoupons {
                delivery_coupon_id: Some(1),
                amount_coupon_id: None,
            },
        );
        assert!(combo.delivery_fee_coupon.is_none());
        assert_eq!(combo.total_discount, Money::zero());
    }

    #[test]
    fn test_amount_tie_keeps_loader_order() {
        let coupons = vec![held(7, CouponType::Amount, 10, 0), held(8, CouponType::Amount, 10, 0)];
        let ctx = ctx(100, 0, false);
        let tagged = tag_available(&coupons, &ctx, now());
        let combo = select_combination(&tagged, &ctx, PinnedCoupons::default());
        assert_eq!(combo.amount_coupon.map(|c| c.user_coupon_id), Some(7));
    }

    #[test]
    fn test_check_consumable() {
        let ok = held(1, CouponType::Amount, 10, 0);
        assert!(check_consumable(&ok, 1, now()).is_ok());
        assert!(matches!(
            check_consumable(&ok, 2, now()),
            Err(CoreError::CouponUnavailable { user_coupon_id: 1, .. })
        ));

        let mut exhausted = held(2, CouponType::Amount, 10, 0);
        exhausted.coupon.total_count = 3;
        exhausted.coupon.used_count = 3;
        assert!(check_consumable(&exhausted, 1, now()).is_err());

        let mut used = held(3, CouponType::Amount, 10, 0);
        used.user_coupon.status = UserCouponStatus::Used;
        assert!(check_consumable(&used, 1, now()).is_err());
    }

    #[test]
    fn test_check_issuable() {
        let mut coupon = held(1, CouponType::Amount, 10, 0).coupon;
        coupon.total_count = 10;

        assert!(check_issuable(&coupon, 8, 2, None, now()).is_ok());
        assert!(check_issuable(&coupon, 8, 3, None, now()).is_err());
        assert!(matches!(
            check_issuable(&coupon, 0, 0, None, now()),
            Err(CoreError::Validation(_))
        ));
        assert!(check_issuable(&coupon, 0, 1, Some(now() - Duration::hours(1)), now()).is_err());
        assert!(check_issuable(&coupon, 0, 1, Some(now() + Duration::days(31)), now()).is_err());
        assert!(check_issuable(&coupon, 0, 1, Some(now() + Duration::days(3)), now()).is_ok());

        coupon.status = CouponStatus::Disabled;
        assert!(check_issuable(&coupon, 0, 1, None, now()).is_err());
    }
}
