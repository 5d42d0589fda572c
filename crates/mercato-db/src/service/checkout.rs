//! # Checkout Preview
//!
//! Prices the user's shopping list before an order exists: delivery fee,
//! usable coupons and the chosen combination.
//!
//! ```text
//! shopping list ─► delivery_fee::resolve ─► CheckoutContext
//!                                               │
//!                 held coupons ─► tag_available ┴─► select_combination
//!                                                        │
//!                                   payable = goods + fee − discount
//! ```
//!
//! Order creation runs the same [`quote`] inside its transaction, so the
//! preview and the committed order can only differ if the data changed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use mercato_core::coupon::{self, AvailableCoupon, CheckoutContext, CouponCombination, PinnedCoupons};
use mercato_core::delivery_fee::{self, DeliveryFeeSummary};
use mercato_core::order::OrderTotals;
use mercato_core::{Money, ShoppingListItem};

use super::error::EngineResult;
use super::EngineState;
use crate::repository::{catalog, coupon as coupon_repo, delivery_rule, shopping_list};

/// What the buyer sees before placing the order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutPreview {
    pub summary: DeliveryFeeSummary,
    pub coupons: Vec<AvailableCoupon>,
    pub combination: CouponCombination,
    pub delivery_fee: Money,
    pub payable: Money,
}

/// A priced shopping list.
#[derive(Debug, Clone)]
pub(crate) struct Quote {
    pub items: Vec<ShoppingListItem>,
    pub summary: DeliveryFeeSummary,
    pub coupons: Vec<AvailableCoupon>,
    pub combination: CouponCombination,
}

impl Quote {
    pub fn delivery_fee(&self) -> Money {
        if self.summary.is_free_shipping {
            Money::zero()
        } else {
            self.summary.delivery_fee
        }
    }
}

/// Prices a user's list on the given connection.
pub(crate) async fn quote(
    conn: &mut SqliteConnection,
    user_id: i64,
    pinned: PinnedCoupons,
    now: DateTime<Utc>,
) -> EngineResult<Quote> {
    let items = shopping_list::list_for_user(&mut *conn, user_id).await?;
    let setting = delivery_rule::fetch_setting(&mut *conn).await?;
    let exclusions = delivery_rule::list_exclusions(&mut *conn).await?;
    let product_ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
    let placements = catalog::placements(&mut *conn, &product_ids).await?;

    let summary = delivery_fee::resolve(&items, setting, &exclusions, &placements);

    let mut category_ids: Vec<i64> = placements
        .values()
        .flat_map(|p| [p.category_id, p.parent_category_id])
        .flatten()
        .collect();
    category_ids.sort_unstable();
    category_ids.dedup();

    let context = CheckoutContext {
        order_amount: summary.total_amount,
        category_ids,
        delivery_fee: summary.delivery_fee,
        is_free_shipping: summary.is_free_shipping,
    };
    let held = coupon_repo::held_unused(&mut *conn, user_id).await?;
    let coupons = coupon::tag_available(&held, &context, now);
    let combination = coupon::select_combination(&coupons, &context, pinned);

    Ok(Quote {
        items,
        summary,
        coupons,
        combination,
    })
}

pub struct CheckoutService {
    state: Arc<EngineState>,
}

impl CheckoutService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        CheckoutService { state }
    }

    /// Delivery-fee summary, tagged coupons and the best combination.
    pub async fn preview(&self, user_id: i64, pinned: PinnedCoupons) -> EngineResult<CheckoutPreview> {
        let mut conn = self.state.db.acquire().await?;
        let quote = quote(&mut conn, user_id, pinned, self.state.now()).await?;
        let delivery_fee = quote.delivery_fee();
        let totals = OrderTotals::compute(
            quote.summary.total_amount,
            delivery_fee,
            Money::zero(),
            quote.combination.total_discount,
        )?;
        Ok(CheckoutPreview {
            summary: quote.summary,
            coupons: quote.coupons,
            combination: quote.combination,
            delivery_fee,
            payable: totals.total_amount,
        })
    }

    /// The delivery-fee summary alone.
    pub async fn delivery_fee_summary(&self, user_id: i64) -> EngineResult<DeliveryFeeSummary> {
        let mut conn = self.state.db.acquire().await?;
        Ok(quote(&mut conn, user_id, PinnedCoupons::default(), self.state.now())
            .await?
            .summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{fixture, grant_coupon};
    use mercato_core::coupon::UnavailableReason;
    use mercato_core::CouponType;

    #[tokio::test]
    async fn test_preview_picks_delivery_and_best_amount_coupon() {
        let f = fixture().await;
        // 2 × wholesale 50 = 100, which meets the threshold; take 1 so the fee applies.
        f.engine
            .shopping_list()
            .add_item(f.user_id, f.product_id, "10kg", 1, false)
            .await
            .unwrap();

        let delivery = grant_coupon(&f.engine, f.user_id, CouponType::DeliveryFee, Money::from_major(6), Money::zero()).await;
        let small = grant_coupon(&f.engine, f.user_id, CouponType::Amount, Money::from_major(10), Money::from_major(40)).await;
        let big = grant_coupon(&f.engine, f.user_id, CouponType::Amount, Money::from_major(20), Money::from_major(80)).await;

        let preview = f.engine.checkout().preview(f.user_id, PinnedCoupons::default()).await.unwrap();
        assert!(!preview.summary.is_free_shipping);
        assert_eq!(preview.delivery_fee, Money::from_major(5));
        assert_eq!(preview.coupons.len(), 3);

        let unavailable = preview.coupons.iter().find(|c| c.user_coupon_id == big).unwrap();
        assert_eq!(unavailable.reason, Some(UnavailableReason::AmountThreshold));

        assert_eq!(preview.combination.user_coupon_ids(), vec![delivery, small]);
        // Delivery coupon saves the whole fee, amount coupon 10.
        assert_eq!(preview.combination.total_discount, Money::from_major(15));
        assert_eq!(preview.payable, Money::from_major(40));
    }

    #[tokio::test]
    async fn test_free_shipping_blocks_delivery_coupon() {
        let f = fixture().await;
        f.engine
            .shopping_list()
            .add_item(f.user_id, f.product_id, "10kg", 2, false)
            .await
            .unwrap();
        grant_coupon(&f.engine, f.user_id, CouponType::DeliveryFee, Money::from_major(6), Money::zero()).await;

        let preview = f.engine.checkout().preview(f.user_id, PinnedCoupons::default()).await.unwrap();
        assert!(preview.summary.is_free_shipping);
        assert_eq!(preview.delivery_fee, Money::zero());
        assert_eq!(preview.coupons[0].reason, Some(UnavailableReason::AlreadyFreeShipping));
        assert!(preview.combination.delivery_fee_coupon.is_none());
        assert_eq!(preview.payable, Money::from_major(100));
    }

    #[tokio::test]
    async fn test_empty_list_previews_zero() {
        let f = fixture().await;
        let summary = f.engine.checkout().delivery_fee_summary(f.user_id).await.unwrap();
        assert_eq!(summary.total_amount, Money::zero());
        assert_eq!(summary.total_quantity, 0);
    }
}
