//! # Order Rules
//!
//! State machine, totals and order numbers. No storage here; the lifecycle
//! service in mercato-db drives these inside its transactions.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  pending ─► pending_delivery ─► pending_pickup ─► delivering            │
//! │                                                      │                  │
//! │                                          ┌───────────┤                  │
//! │                                          ▼           ▼                  │
//! │                                       shipped ─► delivered ─► paid      │
//! │                                                                         │
//! │  any non-terminal ─────────────────────────────────────────► cancelled  │
//! │  paid ──────────────────────────────── refund ─────────────► cancelled  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{OrderStatus, OutOfStockStrategy};

// =============================================================================
// State Machine
// =============================================================================

/// Whether `from → to` is an edge of the order state machine.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if to == Cancelled {
        return !from.is_terminal();
    }
    matches!(
        (from, to),
        (Pending, PendingDelivery)
            | (PendingDelivery, PendingPickup)
            | (PendingPickup, Delivering)
            | (Delivering, Delivered)
            | (Delivering, Shipped)
            | (Shipped, Delivered)
            | (Delivered, Paid)
    )
}

/// Checks an edge, failing with [`CoreError::InvalidTransition`].
pub fn transition(from: OrderStatus, to: OrderStatus) -> CoreResult<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

/// Checks the refund edge `paid → cancelled`, which [`transition`] does not
/// allow.
pub fn refund(from: OrderStatus) -> CoreResult<()> {
    if from == OrderStatus::Paid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from,
            to: OrderStatus::Cancelled,
        })
    }
}

/// True when the move takes the order out of the isolation neighbour set.
pub fn leaves_live_set(from: OrderStatus, to: OrderStatus) -> bool {
    from.is_live() && !to.is_live()
}

// =============================================================================
// Totals
// =============================================================================

/// The four amounts an order is priced from, and the payable total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub goods_amount: Money,
    pub delivery_fee: Money,
    pub points_discount: Money,
    pub coupon_discount: Money,
    pub total_amount: Money,
}

impl OrderTotals {
    /// `total = max(0, goods + delivery − points − coupon)`.
    ///
    /// Every component must be non-negative.
    pub fn compute(
        goods_amount: Money,
        delivery_fee: Money,
        points_discount: Money,
        coupon_discount: Money,
    ) -> CoreResult<Self> {
        for (field, value) in [
            ("goods_amount", goods_amount),
            ("delivery_fee", delivery_fee),
            ("points_discount", points_discount),
            ("coupon_discount", coupon_discount),
        ] {
            if value.is_negative() {
                return Err(ValidationError::MustNotBeNegative {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let total = (goods_amount + delivery_fee - points_discount - coupon_discount).non_negative();
        let totals = Self {
            goods_amount,
            delivery_fee,
            points_discount,
            coupon_discount,
            total_amount: total,
        };
        totals.check()?;
        Ok(totals)
    }

    /// Re-checks the stored total against its parts.
    pub fn check(&self) -> CoreResult<()> {
        let expected =
            (self.goods_amount + self.delivery_fee - self.points_discount - self.coupon_discount).non_negative();
        if self.total_amount.is_negative() || self.total_amount != expected {
            return Err(CoreError::InvariantViolation(format!(
                "order total {} does not match parts (expected {})",
                self.total_amount, expected
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Options
// =============================================================================

/// Buyer-chosen options stored on a new order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderOptions {
    pub remark: Option<String>,
    #[serde(default)]
    pub out_of_stock_strategy: OutOfStockStrategy,
    #[serde(default)]
    pub trust_receipt: bool,
    #[serde(default)]
    pub hide_price: bool,
    #[serde(default)]
    pub require_phone_contact: bool,
}

// =============================================================================
// Order Numbers
// =============================================================================

/// `YYYYMMDDHHmmss` in the business timezone, then `id mod 10000` as four
/// digits, then a two-digit suffix.
///
/// ```rust
/// use chrono::{FixedOffset, TimeZone, Utc};
/// use mercato_core::order::order_number;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 1, 2, 4, 5).unwrap();
/// let zone = FixedOffset::east_opt(8 * 3600).unwrap();
/// assert_eq!(order_number(at, zone, 123_457, 9), "20260301100405345709");
/// ```
pub fn order_number(created_at: DateTime<Utc>, zone: FixedOffset, order_id: i64, suffix: u32) -> String {
    format!(
        "{}{:04}{:02}",
        created_at.with_timezone(&zone).format("%Y%m%d%H%M%S"),
        order_id.rem_euclid(10_000),
        suffix % 100
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
