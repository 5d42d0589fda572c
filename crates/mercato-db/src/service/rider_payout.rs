//! # Rider Payout Service
//!
//! Applies the payout formula to stored orders and keeps the isolation flags
//! of neighbouring live orders in step.
//!
//! ## Cascade
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order created / address moved                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  own flag: live orders within distance (excluding self)? ─► persist     │
//! │       │         calculation, order_profit, net_profit                   │
//! │       ▼                                                                 │
//! │  neighbours within distance (one hop, never further)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  recompute each neighbour's flag ─► persist only if it changed          │
//! │                                                                         │
//! │  updated_at is never touched by these writes                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Distance is symmetric, so "neighbours of the order" and "orders that have
//! the order as neighbour" are the same set.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::{debug, info};

use mercato_core::geo::GeoPoint;
use mercato_core::pricing;
use mercato_core::rider_payout::{
    self, DeliveryFeeCalculation, PayoutInput, PayoutLine, RiderPayoutConfig,
};
use mercato_core::validation::validate_quantity;
use mercato_core::{CustomerRole, Money, Order, SpecSnapshot};

use super::error::{EngineError, EngineResult};
use super::EngineState;
use crate::repository::order::{self as order_repo, DeliveryInfo, LiveOrderPoint};
use crate::repository::{address, catalog, shopping_list};

/// A line of a not-yet-placed order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewLine {
    pub snapshot: SpecSnapshot,
    pub quantity: i64,
}

/// What a cascade wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    pub order_id: i64,
    pub is_isolated: bool,
    pub neighbours_checked: usize,
    pub neighbours_updated: Vec<i64>,
}

pub struct RiderPayoutService {
    state: Arc<EngineState>,
}

impl RiderPayoutService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        RiderPayoutService { state }
    }

    /// Payout of a stored order. Uses the stored isolation flag and weather
    /// when present; nothing is written.
    pub async fn calculate_for_order(&self, order_id: i64) -> EngineResult<DeliveryFeeCalculation> {
        let mut conn = self.state.db.acquire().await?;
        let (settings, config) = self.state.payout_settings(&mut conn).await?;
        let order = fetch_order(&mut conn, order_id).await?;

        let is_isolated = match order.is_isolated {
            Some(flag) => flag,
            None => {
                let origin = address_point(&mut conn, order.address_id).await?;
                let live = order_repo::live_points(&mut conn, Some(order.id)).await?;
                isolated_among(origin, &live, order.id, config.isolated_distance_km)
            }
        };
        let info = self.derive(&mut conn, &settings, &config, &order, is_isolated).await?;
        Ok(info.calculation)
    }

    /// The rider's view of a stored order's payout.
    pub async fn rider_fee(&self, order_id: i64) -> EngineResult<DeliveryFeeCalculation> {
        Ok(self.calculate_for_order(order_id).await?.rider_view())
    }

    /// Recomputes and persists an order's delivery info, then re-checks its
    /// direct neighbours.
    pub async fn cascade(&self, order_id: i64) -> EngineResult<CascadeReport> {
        let mut conn = self.state.db.acquire().await?;
        let (settings, config) = self.state.payout_settings(&mut conn).await?;
        let order = fetch_order(&mut conn, order_id).await?;
        let origin = address_point(&mut conn, order.address_id).await?;

        let live = order_repo::live_points(&mut conn, None).await?;
        let is_isolated = isolated_among(origin, &live, order.id, config.isolated_distance_km);
        let info = self.derive(&mut conn, &settings, &config, &order, is_isolated).await?;
        order_repo::save_delivery_info(&mut conn, order.id, &info).await?;
        debug!(order_id, is_isolated, platform_cost = %info.calculation.total_platform_cost, "Delivery info persisted");

        let (checked, updated) = self
            .refresh_neighbours(&mut conn, &settings, &config, order.id, origin, &live)
            .await?;
        if !updated.is_empty() {
            info!(order_id, neighbours = ?updated, "Isolation changed for neighbours");
        }
        Ok(CascadeReport {
            order_id,
            is_isolated,
            neighbours_checked: checked,
            neighbours_updated: updated,
        })
    }

    /// Re-checks the neighbours of an order that just left the live set.
    pub async fn reevaluate_neighbours(&self, order_id: i64) -> EngineResult<CascadeReport> {
        let mut conn = self.state.db.acquire().await?;
        let (settings, config) = self.state.payout_settings(&mut conn).await?;
        let order = fetch_order(&mut conn, order_id).await?;
        let origin = address_point(&mut conn, order.address_id).await?;

        let live = order_repo::live_points(&mut conn, None).await?;
        let (checked, updated) = self
            .refresh_neighbours(&mut conn, &settings, &config, order.id, origin, &live)
            .await?;
        Ok(CascadeReport {
            order_id,
            is_isolated: order.is_isolated.unwrap_or(false),
            neighbours_checked: checked,
            neighbours_updated: updated,
        })
    }

    /// Re-checks live orders near a position an order's address just left.
    pub(crate) async fn refresh_around(&self, former: GeoPoint, order_id: i64) -> EngineResult<Vec<i64>> {
        let mut conn = self.state.db.acquire().await?;
        let (settings, config) = self.state.payout_settings(&mut conn).await?;
        let live = order_repo::live_points(&mut conn, None).await?;
        let (_, updated) = self
            .refresh_neighbours(&mut conn, &settings, &config, order_id, Some(former), &live)
            .await?;
        Ok(updated)
    }

    /// Payout preview for items not yet ordered. The profit share is hidden.
    pub async fn preview_rider_fee(
        &self,
        lines: &[PreviewLine],
        address_id: i64,
        is_urgent: bool,
        role: CustomerRole,
    ) -> EngineResult<DeliveryFeeCalculation> {
        for line in lines {
            validate_quantity(line.quantity)?;
        }
        let mut conn = self.state.db.acquire().await?;
        let (settings, config) = self.state.payout_settings(&mut conn).await?;
        let origin = address_point(&mut conn, address_id).await?;
        let live = order_repo::live_points(&mut conn, None).await?;
        drop(conn);

        let points: Vec<GeoPoint> = live.iter().map(|p| p.point).collect();
        let is_isolated = rider_payout::is_isolated(origin, &points, config.isolated_distance_km);
        let weather = match origin {
            Some(point) => self.state.weather_at(&settings, point).await,
            None => None,
        };

        let goods: Money = lines
            .iter()
            .map(|l| pricing::unit_price_for_role(&l.snapshot, role).multiply_quantity(l.quantity))
            .sum();
        let profit = rider_payout::order_profit(goods, lines.iter().map(|l| (pricing::unit_cost(&l.snapshot), l.quantity)));
        let payout_lines: Vec<PayoutLine> = lines
            .iter()
            .map(|l| PayoutLine {
                quantity: l.quantity,
                delivery_count: pricing::delivery_count(&l.snapshot),
            })
            .collect();

        let calculation = rider_payout::calculate(
            &config,
            &PayoutInput {
                lines: &payout_lines,
                is_isolated,
                is_urgent,
                weather: weather.as_ref(),
                order_profit: profit,
            },
        );
        Ok(calculation.rider_view())
    }

    /// [`Self::preview_rider_fee`] over a user's current shopping list.
    pub async fn preview_for_user(
        &self,
        user_id: i64,
        address_id: i64,
        is_urgent: bool,
    ) -> EngineResult<DeliveryFeeCalculation> {
        let mut conn = self.state.db.acquire().await?;
        let user = catalog::fetch_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        let lines: Vec<PreviewLine> = shopping_list::list_for_user(&mut conn, user_id)
            .await?
            .into_iter()
            .map(|item| PreviewLine {
                snapshot: item.spec_snapshot,
                quantity: item.quantity,
            })
            .collect();
        drop(conn);
        self.preview_rider_fee(&lines, address_id, is_urgent, user.user_type).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Everything the formula derives for a stored order, given its flag.
    async fn derive(
        &self,
        conn: &mut SqliteConnection,
        settings: &HashMap<String, String>,
        config: &RiderPayoutConfig,
        order: &Order,
        is_isolated: bool,
    ) -> EngineResult<DeliveryInfo> {
        let items = order_repo::fetch_items(&mut *conn, order.id).await?;

        let weather_info = match &order.weather_info {
            Some(stored) => Some(stored.clone()),
            None => match address_point(&mut *conn, order.address_id).await? {
                Some(point) => self.state.weather_at(settings, point).await,
                None => None,
            },
        };

        // Profit uses the catalogue's current spec cost, matched by name.
        let product_ids: Vec<i64> = items.iter().map(|i| i.product_id).collect();
        let products = catalog::fetch_products(&mut *conn, &product_ids).await?;
        let costs = items.iter().map(|item| {
            let cost = products
                .get(&item.product_id)
                .and_then(|p| p.spec(&item.spec_name))
                .map(|s| pricing::unit_cost(&s.prices))
                .unwrap_or_default();
            (cost, item.quantity)
        });
        let order_profit = rider_payout::order_profit(order.goods_amount, costs);

        let lines: Vec<PayoutLine> = items
            .iter()
            .map(|item| PayoutLine {
                quantity: item.quantity,
                delivery_count: pricing::delivery_count(&item.spec_snapshot),
            })
            .collect();
        let calculation = rider_payout::calculate(
            config,
            &PayoutInput {
                lines: &lines,
                is_isolated,
                is_urgent: order.is_urgent,
                weather: weather_info.as_ref(),
                order_profit,
            },
        );
        let net_profit = rider_payout::net_profit(order_profit, &calculation);

        Ok(DeliveryInfo {
            is_isolated,
            weather_info,
            calculation,
            order_profit,
            net_profit,
        })
    }

    /// One hop: re-checks live orders within distance of `origin` and
    /// re-persists those whose flag changed. Returns (checked, updated ids).
    async fn refresh_neighbours(
        &self,
        conn: &mut SqliteConnection,
        settings: &HashMap<String, String>,
        config: &RiderPayoutConfig,
        trigger_id: i64,
        origin: Option<GeoPoint>,
        live: &[LiveOrderPoint],
    ) -> EngineResult<(usize, Vec<i64>)> {
        let Some(origin) = origin else {
            return Ok((0, Vec::new()));
        };
        let km = config.isolated_distance_km;
        let neighbours: Vec<&LiveOrderPoint> = live
            .iter()
            .filter(|p| p.order_id != trigger_id && origin.within(&p.point, km))
            .collect();

        let mut updated = Vec::new();
        for neighbour in &neighbours {
            let flag = isolated_among(Some(neighbour.point), live, neighbour.order_id, km);
            if neighbour.is_isolated == Some(flag) {
                continue;
            }
            let order = fetch_order(&mut *conn, neighbour.order_id).await?;
            let info = self.derive(&mut *conn, settings, config, &order, flag).await?;
            order_repo::save_delivery_info(&mut *conn, order.id, &info).await?;
            updated.push(order.id);
        }
        Ok((neighbours.len(), updated))
    }
}

/// Isolation of `order_id` at `origin` against the live set, skipping itself.
fn isolated_among(origin: Option<GeoPoint>, live: &[LiveOrderPoint], order_id: i64, km: f64) -> bool {
    let others: Vec<GeoPoint> = live
        .iter()
        .filter(|p| p.order_id != order_id)
        .map(|p| p.point)
        .collect();
    rider_payout::is_isolated(origin, &others, km)
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: i64) -> EngineResult<Order> {
    order_repo::fetch(conn, order_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Order", order_id))
}

async fn address_point(conn: &mut SqliteConnection, address_id: i64) -> EngineResult<Option<GeoPoint>> {
    let address = address::fetch(conn, address_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Address", address_id))?;
    Ok(address.point())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::order::{NewOrder, NewOrderItem};
    use crate::service::fixtures::{self, fixture, start};
    use mercato_core::order::{OrderOptions, OrderTotals};
    use mercato_core::OrderStatus;

    async fn place(engine: &super::super::Engine, user_id: i64, address_id: i64, quantity: i64) -> i64 {
        let mut conn = engine.db().acquire().await.unwrap();
        let snapshot = fixtures::spec("10kg", 40, 50, 60).prices;
        let goods = Money::from_major(50).multiply_quantity(quantity);
        let options = OrderOptions::default();
        let id = order_repo::insert(
            &mut conn,
            &NewOrder {
                user_id,
                address_id,
                totals: OrderTotals::compute(goods, Money::zero(), Money::zero(), Money::zero()).unwrap(),
                is_urgent: false,
                options: &options,
                created_at: start(),
            },
        )
        .await
        .unwrap();
        order_repo::insert_item(
            &mut conn,
            id,
            &NewOrderItem {
                product_id: 1,
                product_name: "Rice",
                spec_name: "10kg",
                spec_snapshot: &snapshot,
                quantity,
                unit_price: Money::from_major(50),
                image: None,
            },
        )
        .await
        .unwrap();
        id
    }

    async fn second_address(engine: &super::super::Engine, user_id: i64, point: GeoPoint) -> i64 {
        let mut conn = engine.db().acquire().await.unwrap();
        address::insert(&mut conn, user_id, "far away", Some(point), None, false, start())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lone_order_is_isolated_then_neighbour_flips_it() {
        let f = fixture().await;
        let payout = f.engine.rider_payout();

        let first = place(&f.engine, f.user_id, f.address_id, 2).await;
        let report = payout.cascade(first).await.unwrap();
        assert!(report.is_isolated);
        assert!(report.neighbours_updated.is_empty());

        // 1 km away: both now have a neighbour.
        let near = second_address(&f.engine, f.user_id, GeoPoint::new(31.209, 121.40)).await;
        let second = place(&f.engine, f.user_id, near, 2).await;
        let report = payout.cascade(second).await.unwrap();
        assert!(!report.is_isolated);
        assert_eq!(report.neighbours_updated, vec![first]);

        let mut conn = f.engine.db().acquire().await.unwrap();
        let stored = order_repo::fetch(&mut conn, first).await.unwrap().unwrap();
        assert_eq!(stored.is_isolated, Some(false));
        assert_eq!(stored.delivery_fee_calculation.unwrap().isolated_fee, Money::zero());
        // Cascade writes leave updated_at alone.
        assert_eq!(stored.updated_at, start());
    }

    #[tokio::test]
    async fn test_cascade_twice_is_stable() {
        let f = fixture().await;
        let payout = f.engine.rider_payout();
        let first = place(&f.engine, f.user_id, f.address_id, 3).await;
        let second = place(&f.engine, f.user_id, f.address_id, 1).await;
        payout.cascade(first).await.unwrap();
        payout.cascade(second).await.unwrap();

        let snapshot = |engine: super::super::Engine| async move {
            let mut conn = engine.db().acquire().await.unwrap();
            let a = order_repo::fetch(&mut conn, first).await.unwrap().unwrap();
            let b = order_repo::fetch(&mut conn, second).await.unwrap().unwrap();
            (a, b)
        };
        let before = snapshot(f.engine.clone()).await;
        let report = payout.cascade(second).await.unwrap();
        assert!(report.neighbours_updated.is_empty());
        assert_eq!(snapshot(f.engine.clone()).await, before);
    }

    #[tokio::test]
    async fn test_leaving_live_set_isolates_neighbour() {
        let f = fixture().await;
        let payout = f.engine.rider_payout();
        let first = place(&f.engine, f.user_id, f.address_id, 1).await;
        let second = place(&f.engine, f.user_id, f.address_id, 1).await;
        payout.cascade(first).await.unwrap();
        payout.cascade(second).await.unwrap();

        let mut conn = f.engine.db().acquire().await.unwrap();
        order_repo::update_status(&mut conn, first, OrderStatus::Pending, OrderStatus::Cancelled, start())
            .await
            .unwrap();
        drop(conn);

        let report = payout.reevaluate_neighbours(first).await.unwrap();
        assert_eq!(report.neighbours_updated, vec![second]);
        let mut conn = f.engine.db().acquire().await.unwrap();
        let stored = order_repo::fetch(&mut conn, second).await.unwrap().unwrap();
        assert_eq!(stored.is_isolated, Some(true));
    }

    #[tokio::test]
    async fn test_order_without_coordinates_is_not_isolated() {
        let f = fixture().await;
        let mut conn = f.engine.db().acquire().await.unwrap();
        let blank = address::insert(&mut conn, f.user_id, "unknown", None, None, false, start())
            .await
            .unwrap();
        drop(conn);
        let id = place(&f.engine, f.user_id, blank, 1).await;
        let report = f.engine.rider_payout().cascade(id).await.unwrap();
        assert!(!report.is_isolated);
        assert_eq!(report.neighbours_checked, 0);
    }

    #[tokio::test]
    async fn test_profit_share_and_rider_view() {
        let f = fixture().await;
        // 12 sacks: goods 600, cost 480, profit 120.
        let id = place(&f.engine, f.user_id, f.address_id, 12).await;
        let payout = f.engine.rider_payout();
        let full = payout.calculate_for_order(id).await.unwrap();
        // base 4 + isolated 3 + 12 × 0.6 = 14.2; share = (120 − 14.2) × 8% = 8.46
        assert_eq!(full.delivery_fee_without_profit, Money::from_cents(1420));
        assert_eq!(full.profit_share, Money::from_cents(846));
        assert_eq!(full.rider_payable_fee, Money::from_cents(2266));

        let rider = payout.rider_fee(id).await.unwrap();
        assert_eq!(rider.profit_share, Money::zero());
        assert_eq!(rider.rider_payable_fee, full.rider_payable_fee);
    }

    #[tokio::test]
    async fn test_settings_changes_reach_the_formula() {
        let f = fixture().await;
        let mut conn = f.engine.db().acquire().await.unwrap();
        crate::repository::settings::set(&mut conn, "delivery_base_fee", "6", start()).await.unwrap();
        crate::repository::settings::set(&mut conn, "delivery_item_rate_high", "0.555", start())
            .await
            .unwrap();
        drop(conn);

        let id = place(&f.engine, f.user_id, f.address_id, 12).await;
        let calc = f.engine.rider_payout().calculate_for_order(id).await.unwrap();
        // base 6 + isolated 3 + 12 × 0.555 = 15.66; share = (120 − 15.66) × 8% = 8.35
        assert_eq!(calc.base_fee, Money::from_major(6));
        assert_eq!(calc.item_fee, Money::from_cents(666));
        assert_eq!(calc.delivery_fee_without_profit, Money::from_cents(1566));
        assert_eq!(calc.profit_share, Money::from_cents(835));
    }

    #[tokio::test]
    async fn test_preview_uses_role_pricing() {
        let f = fixture().await;
        let lines = [PreviewLine {
            snapshot: fixtures::spec("10kg", 40, 50, 60).prices,
            quantity: 5,
        }];
        let payout = f.engine.rider_payout();
        let retail = payout
            .preview_rider_fee(&lines, f.address_id, true, CustomerRole::Retail)
            .await
            .unwrap();
        // base 4 + isolated 3 + 5 × 0.5 + urgent 10 = 19.5
        assert_eq!(retail.delivery_fee_without_profit, Money::from_cents(1950));
        assert_eq!(retail.profit_share, Money::zero());
        // Retail profit 100 ⇒ share (100 − 19.5) × 8% = 6.44, folded into payable.
        assert_eq!(retail.rider_payable_fee, Money::from_cents(2594));

        let err = payout
            .preview_rider_fee(&lines, 999, false, CustomerRole::Retail)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), super::super::ErrorKind::NotFound);
    }
}
