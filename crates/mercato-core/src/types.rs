//! # Domain Types
//!
//! Entities and closed enumerations shared by every component.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ ShoppingListItem│──►│     Order       │◄──│   OrderItem     │       │
//! │  │  spec_snapshot  │   │  status         │   │  unit_price     │       │
//! │  │  quantity       │   │  amounts        │   │  subtotal       │       │
//! │  └─────────────────┘   │  is_isolated    │   └─────────────────┘       │
//! │                        │  weather_info   │                              │
//! │  ┌─────────────────┐   │  fee_calc       │   ┌─────────────────┐       │
//! │  │    Address      │◄──│  profits        │   │ SalesCommission │       │
//! │  │  lat / lng      │   └─────────────────┘   │  (see commission)│      │
//! │  └─────────────────┘                          └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! JSON columns (`spec_snapshot`, `weather_info`, `delivery_fee_calculation`)
//! are parsed into typed records at the storage edge; nothing in here holds
//! raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::money::Money;
use crate::rider_payout::DeliveryFeeCalculation;
use crate::weather::WeatherInfo;

/// Implements `as_str`, `Display` and `FromStr` for a snake_case enum.
macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The stored / serialized form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::error::ValidationError::NotAllowed {
                        field: $field.to_string(),
                        allowed: $name::ALL.iter().map(|v| v.as_str().to_string()).collect(),
                    }),
                }
            }
        }
    };
}

pub(crate) use string_enum;

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle state of an order.
///
/// ```text
/// pending ─► pending_delivery ─► pending_pickup ─► delivering ─► delivered ─► paid
///                                                       └─► shipped ─┘
///    any non-terminal ─► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PendingDelivery,
    PendingPickup,
    Delivering,
    Shipped,
    Delivered,
    Paid,
    Cancelled,
}

string_enum!(OrderStatus, "status", {
    Pending => "pending",
    PendingDelivery => "pending_delivery",
    PendingPickup => "pending_pickup",
    Delivering => "delivering",
    Shipped => "shipped",
    Delivered => "delivered",
    Paid => "paid",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Statuses that take part in isolation checks.
    pub const LIVE: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::PendingDelivery,
        OrderStatus::PendingPickup,
    ];

    /// Waiting for a rider; counts as a neighbour for isolation.
    #[inline]
    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }

    /// No further transitions are possible.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

// =============================================================================
// Order Options
// =============================================================================

/// What to do when part of an order is out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OutOfStockStrategy {
    CancelItem,
    ShipAvailable,
    ContactMe,
}

string_enum!(OutOfStockStrategy, "out_of_stock_strategy", {
    CancelItem => "cancel_item",
    ShipAvailable => "ship_available",
    ContactMe => "contact_me",
});

impl Default for OutOfStockStrategy {
    fn default() -> Self {
        OutOfStockStrategy::ContactMe
    }
}

/// Buyer pricing role. Wholesale buyers see wholesale prices first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerRole {
    Retail,
    Wholesale,
}

string_enum!(CustomerRole, "user_type", {
    Retail => "retail",
    Wholesale => "wholesale",
});

impl Default for CustomerRole {
    fn default() -> Self {
        CustomerRole::Retail
    }
}

// =============================================================================
// Coupon Enums
// =============================================================================

/// Kind of voucher. An order carries at most one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    /// Waives the delivery fee.
    DeliveryFee,
    /// Fixed amount off the order.
    Amount,
}

string_enum!(CouponType, "coupon_type", {
    DeliveryFee => "delivery_fee",
    Amount => "amount",
});

/// Whether a coupon template can be used at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Active,
    Disabled,
}

string_enum!(CouponStatus, "coupon_status", {
    Active => "active",
    Disabled => "disabled",
});

/// State of one coupon instance held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum UserCouponStatus {
    Unused,
    Used,
    Expired,
}

string_enum!(UserCouponStatus, "user_coupon_status", {
    Unused => "unused",
    Used => "used",
    Expired => "expired",
});

/// Who handed out a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    Admin,
    Employee,
}

string_enum!(OperatorType, "operator_type", {
    Admin => "admin",
    Employee => "employee",
});

// =============================================================================
// Delivery Fee Rules
// =============================================================================

/// Target of a delivery-fee exclusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ExclusionTarget {
    Product,
    Category,
}

string_enum!(ExclusionTarget, "item_type", {
    Product => "product",
    Category => "category",
});

/// Process-wide delivery fee setting. A missing row means both are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryFeeSetting {
    pub base_fee: Money,
    pub free_shipping_threshold: Money,
}

/// An exclusion rule: items it targets do not count toward free shipping,
/// unless `min_quantity_for_free` is set and reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFeeExclusion {
    pub id: i64,
    pub item_type: ExclusionTarget,
    pub target_id: i64,
    /// Display name of the product or category (for tips).
    pub target_name: String,
    pub min_quantity_for_free: Option<i64>,
    pub remark: Option<String>,
}

// =============================================================================
// Catalogue
// =============================================================================

/// Prices of one product spec, frozen into shopping-list rows and order items.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpecSnapshot {
    pub cost: Money,
    pub wholesale_price: Money,
    pub retail_price: Money,
    /// Delivery weight per unit; `None` or non-positive means 1.0.
    #[serde(default)]
    pub delivery_count: Option<f64>,
}

/// A named spec of a catalogue product ("500ml x 24").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub name: String,
    #[serde(flatten)]
    pub prices: SpecSnapshot,
}

/// A catalogue product as the engine sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub image: Option<String>,
    pub specs: Vec<ProductSpec>,
}

impl Product {
    /// Finds a spec by name.
    pub fn spec(&self, name: &str) -> Option<&ProductSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}

/// A category with its optional parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
}

// =============================================================================
// Shopping List
// =============================================================================

/// One line of a user's shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub spec_name: String,
    pub spec_snapshot: SpecSnapshot,
    pub quantity: i64,
    pub is_special: bool,
    pub image: Option<String>,
}

// =============================================================================
// Address / Users
// =============================================================================

/// A delivery address. Coordinates are null when geocoding failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub store_type: Option<String>,
    pub is_default: bool,
}

impl Address {
    /// Coordinates, if both are present.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }
}

/// A buyer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub user_type: CustomerRole,
    /// Employee code of the salesperson who owns this customer.
    pub sales_code: Option<String>,
}

/// A staff member. Sales employees earn commission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub employee_code: String,
    pub name: String,
    pub phone: String,
    pub is_sales: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order
// =============================================================================

/// A placed order and its persisted economics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub user_id: i64,
    pub address_id: i64,
    pub status: OrderStatus,
    pub goods_amount: Money,
    pub delivery_fee: Money,
    pub points_discount: Money,
    pub coupon_discount: Money,
    pub total_amount: Money,
    pub is_urgent: bool,
    /// Stored isolation flag; `None` until the first cascade.
    pub is_isolated: Option<bool>,
    pub weather_info: Option<WeatherInfo>,
    pub delivery_fee_calculation: Option<DeliveryFeeCalculation>,
    pub order_profit: Option<Money>,
    pub net_profit: Option<Money>,
    pub settlement_date: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub out_of_stock_strategy: OutOfStockStrategy,
    pub trust_receipt: bool,
    pub hide_price: bool,
    pub require_phone_contact: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order. Prices are frozen at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub spec_name: String,
    pub spec_snapshot: SpecSnapshot,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
    pub image: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
