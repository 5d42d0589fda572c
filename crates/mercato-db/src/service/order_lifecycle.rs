//! # Order Lifecycle
//!
//! Creates orders from shopping lists and moves them through the state
//! machine, with the ledger and isolation side effects of each move.
//!
//! ## Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    quote list (fee summary, coupons) ─► totals ─► insert order          │
//! │    order number ─► items ─► consume coupons ─► clear list               │
//! │  COMMIT                                                                 │
//! │  cascade (own delivery info + neighbours), failures logged only         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read order ─► check edge ─► lock (sales_code, month) keys              │
//! │  BEGIN                                                                  │
//! │    status update guarded on the old status                              │
//! │    paid:      settlement date, commission + month re-tier               │
//! │    cancelled: commission reversal                                       │
//! │  COMMIT ─► unlock                                                       │
//! │  left the live set? ─► re-check neighbours' isolation                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Refund
//! `paid` is terminal for [`OrderService::transition`]. A paid order is
//! withdrawn through [`OrderService::refund`] instead: `paid → cancelled`
//! under the locks of the months its commission rows sit in, with the
//! reversal in the same transaction. Settled rows are left alone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{error, info};

use mercato_core::commission;
use mercato_core::coupon::{self, PinnedCoupons};
use mercato_core::order::{self, OrderOptions, OrderTotals};
use mercato_core::pricing;
use mercato_core::validation::{validate_non_negative, validate_quantity, validate_text};
use mercato_core::{CoreError, Money, Order, OrderItem, OrderStatus};

use super::checkout;
use super::commission_ledger;
use super::error::{EngineError, EngineResult};
use super::rider_payout::RiderPayoutService;
use super::EngineState;
use crate::pool::commit;
use crate::repository::order::{self as order_repo, NewOrder, NewOrderItem};
use crate::repository::{address, catalog, coupon as coupon_repo, shopping_list};

const MAX_REMARK_LEN: usize = 500;

/// Everything needed to turn a user's shopping list into an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub address_id: i64,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub points_discount: Money,
    #[serde(default)]
    pub options: OrderOptions,
    /// `None` places the order without coupons; `Some` applies the best
    /// combination, honouring any pinned ids.
    #[serde(default)]
    pub coupons: Option<PinnedCoupons>,
}

pub struct OrderService {
    state: Arc<EngineState>,
}

impl OrderService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        OrderService { state }
    }

    fn payout(&self) -> RiderPayoutService {
        RiderPayoutService::new(Arc::clone(&self.state))
    }

    /// Places an order from the user's shopping list.
    pub async fn create_order(&self, request: CreateOrderRequest) -> EngineResult<Order> {
        validate_non_negative("points_discount", request.points_discount)?;
        let mut options = request.options.clone();
        options.remark = match options.remark.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(remark) => Some(validate_text("remark", remark, MAX_REMARK_LEN)?),
        };

        let now = self.state.now();
        let user_id = request.user_id;
        let mut tx = self.state.db.begin().await?;

        if catalog::fetch_user(&mut tx, user_id).await?.is_none() {
            return Err(EngineError::not_found("User", user_id));
        }
        address::fetch(&mut tx, request.address_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| EngineError::not_found("Address", request.address_id))?;

        let pinned = request.coupons.unwrap_or_default();
        let quote = checkout::quote(&mut tx, user_id, pinned, now).await?;
        if quote.items.is_empty() {
            return Err(CoreError::EmptyShoppingList.into());
        }

        let mut goods = Money::zero();
        for item in &quote.items {
            validate_quantity(item.quantity)?;
            goods += pricing::line_amount(&item.spec_snapshot, item.quantity);
        }
        let combination = match request.coupons {
            Some(_) => quote.combination.clone(),
            None => Default::default(),
        };
        let totals = OrderTotals::compute(goods, quote.delivery_fee(), request.points_discount, combination.total_discount)?;

        let order_id = order_repo::insert(
            &mut tx,
            &NewOrder {
                user_id,
                address_id: request.address_id,
                totals,
                is_urgent: request.is_urgent,
                options: &options,
                created_at: now,
            },
        )
        .await?;
        let suffix = self.state.ports.random.next_below(100);
        let number = order::order_number(now, self.state.zone, order_id, suffix);
        order_repo::set_order_number(&mut tx, order_id, &number).await?;

        for item in &quote.items {
            order_repo::insert_item(
                &mut tx,
                order_id,
                &NewOrderItem {
                    product_id: item.product_id,
                    product_name: &item.product_name,
                    spec_name: &item.spec_name,
                    spec_snapshot: &item.spec_snapshot,
                    quantity: item.quantity,
                    unit_price: pricing::unit_price(&item.spec_snapshot),
                    image: item.image.as_deref(),
                },
            )
            .await?;
        }

        if request.coupons.is_some() {
            verify_pinned(&mut tx, user_id, pinned, now).await?;
        }
        for user_coupon_id in combination.user_coupon_ids() {
            consume_coupon(&mut tx, user_id, user_coupon_id, order_id, now).await?;
        }

        shopping_list::delete_for_user(&mut tx, user_id).await?;
        commit(tx).await?;

        info!(
            order_id,
            order_number = %number,
            total = %totals.total_amount,
            coupons = combination.user_coupon_ids().len(),
            "Order created"
        );

        if let Err(e) = self.payout().cascade(order_id).await {
            error!(order_id, error = %e, "Isolation cascade failed after order creation");
        }
        self.get_order(order_id).await
    }

    /// Moves an order along one edge of the state machine.
    pub async fn transition(&self, order_id: i64, to: OrderStatus) -> EngineResult<Order> {
        let now = self.state.now();

        let mut conn = self.state.db.acquire().await?;
        let current = fetch_order(&mut conn, order_id).await?;
        order::transition(current.status, to)?;
        let user = catalog::fetch_user(&mut conn, current.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", current.user_id))?;
        let keys = match to {
            OrderStatus::Paid => user
                .sales_code
                .iter()
                .map(|code| (code.clone(), commission::calc_month(now, self.state.zone)))
                .collect(),
            OrderStatus::Cancelled => commission_ledger::month_keys_for_order(&mut conn, order_id).await?,
            _ => Vec::new(),
        };
        drop(conn);

        let guards = self.state.locks.acquire(keys).await;
        let mut tx = self.state.db.begin().await?;

        let mut order = fetch_order(&mut tx, order_id).await?;
        let from = order.status;
        order::transition(from, to)?;
        if !order_repo::update_status(&mut tx, order_id, from, to, now).await? {
            return Err(EngineError::Conflict(format!("order {order_id} changed concurrently")));
        }
        order.status = to;
        order.updated_at = now;

        match to {
            OrderStatus::Paid => {
                order_repo::set_settlement_date(&mut tx, order_id, now).await?;
                order.settlement_date = Some(now);
                commission_ledger::record_settlement(&mut tx, self.state.zone, &order, &user, now).await?;
            }
            OrderStatus::Cancelled => {
                commission_ledger::reverse_for_order(&mut tx, order_id, now).await?;
            }
            _ => {}
        }
        commit(tx).await?;
        drop(guards);

        info!(order_id, from = %from, to = %to, "Order status changed");

        if order::leaves_live_set(from, to) {
            if let Err(e) = self.payout().reevaluate_neighbours(order_id).await {
                error!(order_id, error = %e, "Neighbour re-evaluation failed");
            }
        }
        Ok(order)
    }

    /// Withdraws a paid order and reverses its unsettled commission.
    pub async fn refund(&self, order_id: i64) -> EngineResult<Order> {
        let now = self.state.now();

        let mut conn = self.state.db.acquire().await?;
        let current = fetch_order(&mut conn, order_id).await?;
        order::refund(current.status)?;
        let keys = commission_ledger::month_keys_for_order(&mut conn, order_id).await?;
        drop(conn);

        let guards = self.state.locks.acquire(keys).await;
        let mut tx = self.state.db.begin().await?;

        let mut order = fetch_order(&mut tx, order_id).await?;
        let from = order.status;
        order::refund(from)?;
        if !order_repo::update_status(&mut tx, order_id, from, OrderStatus::Cancelled, now).await? {
            return Err(EngineError::Conflict(format!("order {order_id} changed concurrently")));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;

        let months = commission_ledger::reverse_for_order(&mut tx, order_id, now).await?;
        commit(tx).await?;
        drop(guards);

        // Paid orders are outside the isolation neighbour set already.
        info!(order_id, months = months.len(), "Paid order refunded");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: i64) -> EngineResult<Order> {
        let mut conn = self.state.db.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    pub async fn get_order_items(&self, order_id: i64) -> EngineResult<Vec<OrderItem>> {
        let mut conn = self.state.db.acquire().await?;
        fetch_order(&mut conn, order_id).await?;
        Ok(order_repo::fetch_items(&mut conn, order_id).await?)
    }
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: i64) -> EngineResult<Order> {
    order_repo::fetch(conn, order_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Order", order_id))
}

/// Pinned ids must name coupons the buyer can still use, even when the
/// selection ends up not choosing them.
async fn verify_pinned(
    conn: &mut SqliteConnection,
    user_id: i64,
    pinned: PinnedCoupons,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<()> {
    for id in [pinned.delivery_coupon_id, pinned.amount_coupon_id].into_iter().flatten() {
        let held = coupon_repo::fetch_held(&mut *conn, id)
            .await?
            .ok_or_else(|| EngineError::not_found("Coupon", id))?;
        coupon::check_consumable(&held, user_id, now)?;
    }
    Ok(())
}

async fn consume_coupon(
    conn: &mut SqliteConnection,
    user_id: i64,
    user_coupon_id: i64,
    order_id: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<()> {
    let held = coupon_repo::fetch_held(&mut *conn, user_coupon_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Coupon", user_coupon_id))?;
    coupon::check_consumable(&held, user_id, now)?;
    if !coupon_repo::mark_used(&mut *conn, user_coupon_id, order_id, now).await? {
        return Err(EngineError::Conflict(format!("coupon {user_coupon_id} already used")));
    }
    coupon_repo::increment_used_count(&mut *conn, held.coupon.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::commission as ledger;
    use crate::service::commission_ledger::CommissionSelector;
    use crate::service::fixtures::{fixture, grant_coupon, start, Fixture, SALES_CODE};
    use crate::service::ErrorKind;
    use mercato_core::geo::GeoPoint;
    use mercato_core::{CouponType, CustomerRole, UserCouponStatus};

    fn request(f: &Fixture) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id: f.user_id,
            address_id: f.address_id,
            ..Default::default()
        }
    }

    async fn add_rice(f: &Fixture, quantity: i64) {
        f.engine
            .shopping_list()
            .add_item(f.user_id, f.product_id, "10kg", quantity, false)
            .await
            .unwrap();
    }

    async fn pay(orders: &OrderService, order_id: i64) -> Order {
        for status in [
            OrderStatus::PendingDelivery,
            OrderStatus::PendingPickup,
            OrderStatus::Delivering,
            OrderStatus::Delivered,
        ] {
            orders.transition(order_id, status).await.unwrap();
        }
        orders.transition(order_id, OrderStatus::Paid).await.unwrap()
    }

    async fn commission_of(f: &Fixture, order_id: i64) -> mercato_core::commission::SalesCommission {
        let mut conn = f.engine.db().acquire().await.unwrap();
        let mut rows = ledger::rows_for_order(&mut conn, order_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        rows.remove(0)
    }

    #[tokio::test]
    async fn test_create_order_from_list() {
        let f = fixture().await;
        add_rice(&f, 3).await;

        let order = f.engine.orders().create_order(request(&f)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.order_number, "20260510100000000142");
        assert_eq!(order.goods_amount, Money::from_major(150));
        assert_eq!(order.delivery_fee, Money::zero());
        assert_eq!(order.total_amount, Money::from_major(150));

        // The cascade ran after commit.
        assert_eq!(order.is_isolated, Some(true));
        assert_eq!(order.order_profit, Some(Money::from_major(30)));
        assert!(order.delivery_fee_calculation.is_some());

        let items = f.engine.orders().get_order_items(order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price, Money::from_major(50));
        assert_eq!(items[0].subtotal, Money::from_major(150));
        assert!(f.engine.shopping_list().list_items(f.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_list_and_foreign_address() {
        let f = fixture().await;
        let err = f.engine.orders().create_order(request(&f)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        add_rice(&f, 1).await;
        let err = f
            .engine
            .orders()
            .create_order(CreateOrderRequest {
                address_id: f.address_id + 100,
                ..request(&f)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        // Nothing was written; the list is intact.
        assert_eq!(f.engine.shopping_list().list_items(f.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_coupons_are_used_once() {
        let f = fixture().await;
        let delivery = grant_coupon(&f.engine, f.user_id, CouponType::DeliveryFee, Money::from_major(6), Money::zero()).await;
        let amount = grant_coupon(&f.engine, f.user_id, CouponType::Amount, Money::from_major(10), Money::from_major(40)).await;

        add_rice(&f, 1).await;
        let first = f
            .engine
            .orders()
            .create_order(CreateOrderRequest {
                coupons: Some(PinnedCoupons::default()),
                ..request(&f)
            })
            .await
            .unwrap();
        assert_eq!(first.delivery_fee, Money::from_major(5));
        assert_eq!(first.coupon_discount, Money::from_major(15));
        assert_eq!(first.total_amount, Money::from_major(40));

        let held = f.engine.coupons().list_user_coupons(f.user_id).await.unwrap();
        assert!(held
            .iter()
            .filter(|h| [delivery, amount].contains(&h.user_coupon.id))
            .all(|h| h.user_coupon.status == UserCouponStatus::Used && h.user_coupon.order_id == Some(first.id)));

        add_rice(&f, 1).await;
        let second = f
            .engine
            .orders()
            .create_order(CreateOrderRequest {
                coupons: Some(PinnedCoupons {
                    delivery_coupon_id: Some(delivery),
                    amount_coupon_id: None,
                }),
                ..request(&f)
            })
            .await
            .unwrap_err();
        assert_eq!(second.kind(), ErrorKind::CouponUnavailable);

        let second = f
            .engine
            .orders()
            .create_order(CreateOrderRequest {
                coupons: Some(PinnedCoupons::default()),
                ..request(&f)
            })
            .await
            .unwrap();
        assert_eq!(second.coupon_discount, Money::zero());
        assert_eq!(second.total_amount, Money::from_major(55));
    }

    #[tokio::test]
    async fn test_pinned_coupon_of_another_user() {
        let f = fixture().await;
        let mut conn = f.engine.db().acquire().await.unwrap();
        let other = catalog::insert_user(&mut conn, "Other", CustomerRole::Retail, None).await.unwrap();
        drop(conn);
        let foreign = grant_coupon(&f.engine, other, CouponType::Amount, Money::from_major(10), Money::zero()).await;

        add_rice(&f, 1).await;
        let err = f
            .engine
            .orders()
            .create_order(CreateOrderRequest {
                coupons: Some(PinnedCoupons {
                    delivery_coupon_id: None,
                    amount_coupon_id: Some(foreign),
                }),
                ..request(&f)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CouponUnavailable);
    }

    #[tokio::test]
    async fn test_walk_to_paid_records_commission() {
        let f = fixture().await;
        add_rice(&f, 3).await;
        let orders = f.engine.orders();
        let order = orders.create_order(request(&f)).await.unwrap();

        let err = orders.transition(order.id, OrderStatus::Delivering).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        for status in [
            OrderStatus::PendingDelivery,
            OrderStatus::PendingPickup,
            OrderStatus::Delivering,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            orders.transition(order.id, status).await.unwrap();
        }
        let paid = orders.transition(order.id, OrderStatus::Paid).await.unwrap();
        assert_eq!(paid.settlement_date, Some(crate::service::fixtures::start()));

        let mut conn = f.engine.db().acquire().await.unwrap();
        let rows = ledger::rows_for_order(&mut conn, order.id).await.unwrap();
        drop(conn);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_valid_order && rows[0].is_new_customer_order && rows[0].is_accounted);
        assert_eq!(rows[0].order_number, order.order_number);

        let err = orders.transition(order.id, OrderStatus::Cancelled).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn test_cancel_reisolates_neighbour() {
        let f = fixture().await;
        let orders = f.engine.orders();
        add_rice(&f, 1).await;
        let first = orders.create_order(request(&f)).await.unwrap();
        add_rice(&f, 1).await;
        let second = orders.create_order(request(&f)).await.unwrap();

        assert_eq!(second.is_isolated, Some(false));
        assert_eq!(orders.get_order(first.id).await.unwrap().is_isolated, Some(false));

        let cancelled = orders.transition(second.id, OrderStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(orders.get_order(first.id).await.unwrap().is_isolated, Some(true));
    }

    #[tokio::test]
    async fn test_refund_frees_new_customer_bonus_and_retiers_month() {
        let f = fixture().await;
        let orders = f.engine.orders();
        let ledger_svc = f.engine.ledger();

        // A second buyer of the same salesperson carries part of the month.
        let mut conn = f.engine.db().acquire().await.unwrap();
        let other = catalog::insert_user(&mut conn, "Hilltop Mart", CustomerRole::Retail, Some(SALES_CODE))
            .await
            .unwrap();
        let other_address = address::insert(
            &mut conn,
            other,
            "3 Summit Ave",
            Some(GeoPoint::new(31.35, 121.52)),
            None,
            true,
            start(),
        )
        .await
        .unwrap();
        drop(conn);
        f.engine
            .shopping_list()
            .add_item(other, f.product_id, "10kg", 500, false)
            .await
            .unwrap();
        let steady = orders
            .create_order(CreateOrderRequest {
                user_id: other,
                address_id: other_address,
                ..Default::default()
            })
            .await
            .unwrap();
        pay(&orders, steady.id).await;

        add_rice(&f, 600).await;
        let first = orders.create_order(request(&f)).await.unwrap();
        pay(&orders, first.id).await;
        let first_row = commission_of(&f, first.id).await;
        assert!(first_row.is_new_customer_order && first_row.is_accounted);
        assert_eq!(commission_of(&f, steady.id).await.tier_level, 1);
        assert_eq!(ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap().tier_level, 1);

        let refunded = orders.refund(first.id).await.unwrap();
        assert_eq!(refunded.status, OrderStatus::Cancelled);
        assert_eq!(orders.get_order(first.id).await.unwrap().status, OrderStatus::Cancelled);

        let first_row = commission_of(&f, first.id).await;
        assert!(first_row.is_accounted_cancelled && !first_row.is_accounted);
        let steady_row = commission_of(&f, steady.id).await;
        assert_eq!(steady_row.tier_level, 0);
        assert_eq!(steady_row.tier_commission, Money::zero());
        let stats = ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap();
        assert_eq!(stats.tier_level, 0);
        assert_eq!(stats.total_sales, Money::from_major(25_000));
        assert_eq!(stats.total_valid_orders, 1);
        assert_eq!(stats.total_new_customers, 1);

        // The buyer's next paid order earns the bonus again.
        add_rice(&f, 3).await;
        let second = orders.create_order(request(&f)).await.unwrap();
        pay(&orders, second.id).await;
        let second_row = commission_of(&f, second.id).await;
        assert!(second_row.is_valid_order && second_row.is_new_customer_order);
        assert!(second_row.new_customer_bonus.is_positive());

        let stats = ledger_svc.monthly_stats(SALES_CODE, "2026-05").await.unwrap();
        assert_eq!(stats.total_sales, Money::from_major(25_150));
        assert_eq!(stats.total_valid_orders, 2);
        assert_eq!(stats.total_new_customers, 2);
    }

    #[tokio::test]
    async fn test_refund_edges_and_settled_commission() {
        let f = fixture().await;
        let orders = f.engine.orders();
        add_rice(&f, 3).await;
        let order = orders.create_order(request(&f)).await.unwrap();

        let err = orders.refund(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        let err = orders.refund(order.id + 100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        pay(&orders, order.id).await;
        let row = commission_of(&f, order.id).await;
        f.engine
            .ledger()
            .settle_bulk(CommissionSelector::Ids(vec![row.id]))
            .await
            .unwrap();

        // Settled rows stay.
        orders.refund(order.id).await.unwrap();
        let row = commission_of(&f, order.id).await;
        assert!(row.is_settled && !row.is_accounted_cancelled);

        let err = orders.refund(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }
}
