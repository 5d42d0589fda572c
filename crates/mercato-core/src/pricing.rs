//! # Pricing
//!
//! Unit-price selection from a [`SpecSnapshot`].
//!
//! ## Fallback Chains
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Shopping list / delivery fee:  wholesale ─► retail ─► cost ─► 0        │
//! │                                                                         │
//! │  Rider preview, wholesale role: wholesale ─► retail ─► cost ─► 0        │
//! │  Rider preview, other roles:    retail ─► wholesale ─► cost ─► 0        │
//! │                                                                         │
//! │  "─►" = take the first strictly positive price                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::money::Money;
use crate::types::{CustomerRole, SpecSnapshot};

/// Delivery weight used when a snapshot has none.
pub const DEFAULT_DELIVERY_COUNT: f64 = 1.0;

fn first_positive(candidates: [Money; 3]) -> Money {
    candidates
        .into_iter()
        .find(Money::is_positive)
        .unwrap_or_else(Money::zero)
}

/// Effective unit price for shopping-list math.
///
/// ```rust
/// use mercato_core::money::Money;
/// use mercato_core::pricing::unit_price;
/// use mercato_core::types::SpecSnapshot;
///
/// let snap = SpecSnapshot {
///     cost: Money::from_major(6),
///     wholesale_price: Money::zero(),
///     retail_price: Money::from_major(9),
///     delivery_count: None,
/// };
/// assert_eq!(unit_price(&snap), Money::from_major(9));
/// ```
pub fn unit_price(snapshot: &SpecSnapshot) -> Money {
    first_positive([
        snapshot.wholesale_price,
        snapshot.retail_price,
        snapshot.cost,
    ])
}

/// Unit price as seen by a buyer of the given role.
pub fn unit_price_for_role(snapshot: &SpecSnapshot, role: CustomerRole) -> Money {
    match role {
        CustomerRole::Wholesale => first_positive([
            snapshot.wholesale_price,
            snapshot.retail_price,
            snapshot.cost,
        ]),
        CustomerRole::Retail => first_positive([
            snapshot.retail_price,
            snapshot.wholesale_price,
            snapshot.cost,
        ]),
    }
}

/// Unit cost, never negative.
#[inline]
pub fn unit_cost(snapshot: &SpecSnapshot) -> Money {
    snapshot.cost.non_negative()
}

/// Delivery weight per unit, defaulting to 1.0 when missing or non-positive.
#[inline]
pub fn delivery_count(snapshot: &SpecSnapshot) -> f64 {
    match snapshot.delivery_count {
        Some(count) if count > 0.0 && count.is_finite() => count,
        _ => DEFAULT_DELIVERY_COUNT,
    }
}

/// `unit_price × quantity`.
#[inline]
pub fn line_amount(snapshot: &SpecSnapshot, quantity: i64) -> Money {
    unit_price(snapshot).multiply_quantity(quantity)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(cost: i64, wholesale: i64, retail: i64) -> SpecSnapshot {
        SpecSnapshot {
            cost: Money::from_cents(cost),
            wholesale_price: Money::from_cents(wholesale),
            retail_price: Money::from_cents(retail),
            delivery_count: None,
        }
    }

    #[test]
    fn test_wholesale_first() {
        assert_eq!(unit_price(&snap(500, 800, 1000)).cents(), 800);
        assert_eq!(unit_price(&snap(500, 0, 1000)).cents(), 1000);
        assert_eq!(unit_price(&snap(500, 0, 0)).cents(), 500);
        assert_eq!(unit_price(&snap(-5, 0, 0)).cents(), 0);
    }

    #[test]
    fn test_negative_prices_are_skipped() {
        assert_eq!(unit_price(&snap(300, -100, 0)).cents(), 300);
    }

    #[test]
    fn test_role_pricing() {
        let s = snap(500, 800, 1000);
        assert_eq!(unit_price_for_role(&s, CustomerRole::Wholesale).cents(), 800);
        assert_eq!(unit_price_for_role(&s, CustomerRole::Retail).cents(), 1000);

        let no_retail = snap(500, 800, 0);
        assert_eq!(unit_price_for_role(&no_retail, CustomerRole::Retail).cents(), 800);

        let cost_only = snap(500, 0, 0);
        assert_eq!(unit_price_for_role(&cost_only, CustomerRole::Retail).cents(), 500);
    }

    #[test]
    fn test_delivery_count_default() {
        let mut s = snap(0, 0, 0);
        assert_eq!(delivery_count(&s), 1.0);
        s.delivery_count = Some(0.0);
        assert_eq!(delivery_count(&s), 1.0);
        s.delivery_count = Some(-2.0);
        assert_eq!(delivery_count(&s), 1.0);
        s.delivery_count = Some(2.5);
        assert_eq!(delivery_count(&s), 2.5);
    }

    #[test]
    fn test_cost_clamped() {
        assert_eq!(unit_cost(&snap(-100, 0, 0)), Money::zero());
        assert_eq!(line_amount(&snap(0, 250, 0), 4).cents(), 1000);
    }
}
