//! # mercato-core: Pure Order Economics
//!
//! All the money rules of the marketplace back office as pure functions:
//! what a customer pays for delivery, what a rider earns, which coupons
//! apply, how much an order profits and what the salesperson gets.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Mercato Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            HTTP / admin console (out of this workspace)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      mercato-db: services (checkout, lifecycle, ledger)         │   │
//! │  │                  repositories, SQLite                           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mercato-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌────────────┐ ┌─────────────┐ ┌────────────┐    │   │
//! │  │  │ pricing  │ │delivery_fee│ │rider_payout │ │   coupon   │    │   │
//! │  │  └──────────┘ └────────────┘ └─────────────┘ └────────────┘    │   │
//! │  │  ┌──────────┐ ┌────────────┐ ┌─────────────┐ ┌────────────┐    │   │
//! │  │  │commission│ │   order    │ │  geo/weather│ │   ports    │    │   │
//! │  │  └──────────┘ └────────────┘ └─────────────┘ └────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money (cents) and Rate (basis points), half-away rounding
//! - [`types`] - Orders, items, shopping list, addresses, enums
//! - [`pricing`] - Unit-price fallback chains
//! - [`delivery_fee`] - Free-shipping decision with exclusion rules
//! - [`rider_payout`] - Rider subsidies, profit share, order profit
//! - [`coupon`] - Coupon availability and combination choice
//! - [`commission`] - Sales commission and monthly tiers
//! - [`order`] - State machine, totals, order numbers
//! - [`geo`] / [`weather`] - Haversine distance, extreme weather
//! - [`ports`] - Traits for geocoding, weather, settings, clock, randomness
//! - [`error`] / [`validation`] - Typed errors and input checks
//!
//! ## Example Usage
//!
//! ```rust
//! use mercato_core::money::{Money, Rate};
//!
//! let profit = Money::from_major(60);
//! let base = profit.apply_rate(Rate::from_bps(4500));
//! assert_eq!(base.cents(), 2700);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod commission;
pub mod coupon;
pub mod delivery_fee;
pub mod error;
pub mod geo;
pub mod money;
pub mod order;
pub mod ports;
pub mod pricing;
pub mod rider_payout;
pub mod types;
pub mod validation;
pub mod weather;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single shopping-list line or order item.
pub const MAX_ITEM_QUANTITY: i64 = 9999;

/// An earlier paid order only disqualifies the new-customer bonus if its
/// margin exceeded this (5.00).
pub const NEW_CUSTOMER_VALID_PROFIT: Money = Money::from_major(5);
