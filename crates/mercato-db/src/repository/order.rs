//! # Order Repository
//!
//! Orders, their items, and the coordinate queries behind isolation checks.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert / insert_item / set_order_number  ← create transaction          │
//! │  update_status / set_settlement_date      ← lifecycle transaction       │
//! │  save_delivery_info                       ← cascade (updated_at kept)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::geo::GeoPoint;
use mercato_core::order::{OrderOptions, OrderTotals};
use mercato_core::rider_payout::DeliveryFeeCalculation;
use mercato_core::weather::WeatherInfo;
use mercato_core::{Money, Order, OrderItem, OrderStatus, OutOfStockStrategy, SpecSnapshot};

use super::{from_json, from_json_opt, to_json};
use crate::error::DbResult;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    user_id: i64,
    address_id: i64,
    status: OrderStatus,
    #[sqlx(rename = "goods_amount_cents")]
    goods_amount: Money,
    #[sqlx(rename = "delivery_fee_cents")]
    delivery_fee: Money,
    #[sqlx(rename = "points_discount_cents")]
    points_discount: Money,
    #[sqlx(rename = "coupon_discount_cents")]
    coupon_discount: Money,
    #[sqlx(rename = "total_amount_cents")]
    total_amount: Money,
    is_urgent: bool,
    is_isolated: Option<bool>,
    weather_info: Option<String>,
    delivery_fee_calculation: Option<String>,
    #[sqlx(rename = "order_profit_cents")]
    order_profit: Option<Money>,
    #[sqlx(rename = "net_profit_cents")]
    net_profit: Option<Money>,
    settlement_date: Option<DateTime<Utc>>,
    remark: Option<String>,
    out_of_stock_strategy: OutOfStockStrategy,
    trust_receipt: bool,
    hide_price: bool,
    require_phone_contact: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> DbResult<Order> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            address_id: self.address_id,
            status: self.status,
            goods_amount: self.goods_amount,
            delivery_fee: self.delivery_fee,
            points_discount: self.points_discount,
            coupon_discount: self.coupon_discount,
            total_amount: self.total_amount,
            is_urgent: self.is_urgent,
            is_isolated: self.is_isolated,
            weather_info: from_json_opt("orders.weather_info", self.weather_info.as_deref())?,
            delivery_fee_calculation: from_json_opt(
                "orders.delivery_fee_calculation",
                self.delivery_fee_calculation.as_deref(),
            )?,
            order_profit: self.order_profit,
            net_profit: self.net_profit,
            settlement_date: self.settlement_date,
            remark: self.remark,
            out_of_stock_strategy: self.out_of_stock_strategy,
            trust_receipt: self.trust_receipt,
            hide_price: self.hide_price,
            require_phone_contact: self.require_phone_contact,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_ORDER: &str = r#"
    SELECT
        o.id, o.order_number, o.user_id, o.address_id, o.status,
        o.goods_amount_cents, o.delivery_fee_cents, o.points_discount_cents,
        o.coupon_discount_cents, o.total_amount_cents,
        o.is_urgent, o.is_isolated, o.weather_info, o.delivery_fee_calculation,
        o.order_profit_cents, o.net_profit_cents, o.settlement_date, o.remark,
        o.out_of_stock_strategy, o.trust_receipt, o.hide_price, o.require_phone_contact,
        o.created_at, o.updated_at
    FROM orders o
"#;

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    product_name: String,
    spec_name: String,
    spec_snapshot: String,
    quantity: i64,
    #[sqlx(rename = "unit_price_cents")]
    unit_price: Money,
    #[sqlx(rename = "subtotal_cents")]
    subtotal: Money,
    image: Option<String>,
}

impl ItemRow {
    fn into_item(self) -> DbResult<OrderItem> {
        Ok(OrderItem {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            product_name: self.product_name,
            spec_name: self.spec_name,
            spec_snapshot: from_json("order_items.spec_snapshot", &self.spec_snapshot)?,
            quantity: self.quantity,
            unit_price: self.unit_price,
            subtotal: self.subtotal,
            image: self.image,
        })
    }
}

// =============================================================================
// Inserts
// =============================================================================

/// Fields of a new order row. Delivery info is filled in by the cascade.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: i64,
    pub address_id: i64,
    pub totals: OrderTotals,
    pub is_urgent: bool,
    pub options: &'a OrderOptions,
    pub created_at: DateTime<Utc>,
}

/// A frozen order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem<'a> {
    pub product_id: i64,
    pub product_name: &'a str,
    pub spec_name: &'a str,
    pub spec_snapshot: &'a SpecSnapshot,
    pub quantity: i64,
    pub unit_price: Money,
    pub image: Option<&'a str>,
}

/// Inserts an order in `pending` with an empty order number.
pub async fn insert(conn: &mut SqliteConnection, order: &NewOrder<'_>) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO orders (
            order_number, user_id, address_id, status,
            goods_amount_cents, delivery_fee_cents, points_discount_cents,
            coupon_discount_cents, total_amount_cents,
            is_urgent, remark, out_of_stock_strategy,
            trust_receipt, hide_price, require_phone_contact,
            created_at, updated_at
        ) VALUES (
            '', ?1, ?2, 'pending',
            ?3, ?4, ?5,
            ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13,
            ?14, ?14
        )
        RETURNING id
        "#,
    )
    .bind(order.user_id)
    .bind(order.address_id)
    .bind(order.totals.goods_amount)
    .bind(order.totals.delivery_fee)
    .bind(order.totals.points_discount)
    .bind(order.totals.coupon_discount)
    .bind(order.totals.total_amount)
    .bind(order.is_urgent)
    .bind(order.options.remark.as_deref())
    .bind(order.options.out_of_stock_strategy)
    .bind(order.options.trust_receipt)
    .bind(order.options.hide_price)
    .bind(order.options.require_phone_contact)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn set_order_number(conn: &mut SqliteConnection, id: i64, order_number: &str) -> DbResult<()> {
    sqlx::query("UPDATE orders SET order_number = ?2 WHERE id = ?1")
        .bind(id)
        .bind(order_number)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_item(conn: &mut SqliteConnection, order_id: i64, item: &NewOrderItem<'_>) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO order_items (
            order_id, product_id, product_name, spec_name, spec_snapshot,
            quantity, unit_price_cents, subtotal_cents, image
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.product_name)
    .bind(item.spec_name)
    .bind(to_json("order_items.spec_snapshot", item.spec_snapshot)?)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.unit_price.multiply_quantity(item.quantity))
    .bind(item.image)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

// =============================================================================
// Reads
// =============================================================================

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Order>> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE o.id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(OrderRow::into_order).transpose()
}

pub async fn fetch_items(conn: &mut SqliteConnection, order_id: i64) -> DbResult<Vec<OrderItem>> {
    let rows: Vec<ItemRow> = sqlx::query_as(
        r#"
        SELECT id, order_id, product_id, product_name, spec_name, spec_snapshot,
               quantity, unit_price_cents, subtotal_cents, image
        FROM order_items
        WHERE order_id = ?1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(ItemRow::into_item).collect()
}

/// Earlier settled orders of a user, oldest first.
pub async fn settled_before(conn: &mut SqliteConnection, user_id: i64, before_id: i64) -> DbResult<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "{SELECT_ORDER} WHERE o.user_id = ?1 AND o.id < ?2 AND o.status = 'paid' \
         AND o.settlement_date IS NOT NULL ORDER BY o.id"
    ))
    .bind(user_id)
    .bind(before_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(OrderRow::into_order).collect()
}

/// Orders of the salesperson's customers that are neither paid nor
/// cancelled, optionally limited to a creation range.
pub async fn open_for_sales_code(
    conn: &mut SqliteConnection,
    sales_code: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> DbResult<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "{SELECT_ORDER} JOIN users u ON u.id = o.user_id \
         WHERE u.sales_code = ?1 AND o.status NOT IN ('paid', 'cancelled') \
         AND (?2 IS NULL OR o.created_at >= ?2) AND (?3 IS NULL OR o.created_at <= ?3) \
         ORDER BY o.id"
    ))
    .bind(sales_code)
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(OrderRow::into_order).collect()
}

// =============================================================================
// Updates
// =============================================================================

pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    from: OrderStatus,
    to: OrderStatus,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_settlement_date(conn: &mut SqliteConnection, id: i64, at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query("UPDATE orders SET settlement_date = ?2 WHERE id = ?1")
        .bind(id)
        .bind(at)
        .execute(conn)
        .await?;
    Ok(())
}

/// Everything the payout engine derives for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryInfo {
    pub is_isolated: bool,
    pub weather_info: Option<WeatherInfo>,
    pub calculation: DeliveryFeeCalculation,
    pub order_profit: Money,
    pub net_profit: Money,
}

/// Persists derived delivery fields. Leaves `updated_at` alone.
pub async fn save_delivery_info(conn: &mut SqliteConnection, id: i64, info: &DeliveryInfo) -> DbResult<()> {
    let weather = info
        .weather_info
        .as_ref()
        .map(|w| to_json("orders.weather_info", w))
        .transpose()?;
    sqlx::query(
        r#"
        UPDATE orders SET
            is_isolated = ?2,
            weather_info = ?3,
            delivery_fee_calculation = ?4,
            order_profit_cents = ?5,
            net_profit_cents = ?6
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(info.is_isolated)
    .bind(weather)
    .bind(to_json("orders.delivery_fee_calculation", &info.calculation)?)
    .bind(info.order_profit)
    .bind(info.net_profit)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Live Orders
// =============================================================================

/// A live order with known coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveOrderPoint {
    pub order_id: i64,
    pub point: GeoPoint,
    pub is_isolated: Option<bool>,
}

/// Live orders (pending, pending_delivery, pending_pickup) whose address has
/// coordinates, optionally excluding one order.
pub async fn live_points(conn: &mut SqliteConnection, exclude_order_id: Option<i64>) -> DbResult<Vec<LiveOrderPoint>> {
    let rows: Vec<(i64, f64, f64, Option<bool>)> = sqlx::query_as(
        r#"
        SELECT o.id, a.latitude, a.longitude, o.is_isolated
        FROM orders o
        JOIN addresses a ON a.id = o.address_id
        WHERE o.status IN ('pending', 'pending_delivery', 'pending_pickup')
          AND a.latitude IS NOT NULL AND a.longitude IS NOT NULL
          AND (?1 IS NULL OR o.id != ?1)
        ORDER BY o.id
        "#,
    )
    .bind(exclude_order_id)
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(order_id, lat, lng, is_isolated)| LiveOrderPoint {
            order_id,
            point: GeoPoint::new(lat, lng),
            is_isolated,
        })
        .collect())
}

/// Ids of live orders delivering to an address.
pub async fn live_at_address(conn: &mut SqliteConnection, address_id: i64) -> DbResult<Vec<i64>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT id FROM orders
        WHERE address_id = ?1 AND status IN ('pending', 'pending_delivery', 'pending_pickup')
        ORDER BY id
        "#,
    )
    .bind(address_id)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}
