//! # Error Types
//!
//! Domain errors for mercato-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mercato-core (this file)                                              │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mercato-db                                                            │
//! │  ├── DbError          - Storage failures                               │
//! │  └── EngineError      - What callers see, with an ErrorKind            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The order state machine has no such edge.
    ///
    /// ## When This Occurs
    /// - Skipping a stage (`pending` → `delivering`)
    /// - Moving out of a terminal state (`paid`, `cancelled`)
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A coupon cannot be applied at commit time.
    #[error("Coupon {user_coupon_id} unavailable: {reason}")]
    CouponUnavailable { user_coupon_id: i64, reason: String },

    /// A coupon template cannot be handed out (disabled, out of window,
    /// out of stock, bad expiry).
    #[error("Coupon {coupon_id} cannot be issued: {reason}")]
    CouponNotIssuable { coupon_id: i64, reason: String },

    /// The user's shopping list has no items.
    #[error("Shopping list is empty")]
    EmptyShoppingList,

    /// A state that the engine's own arithmetic should never produce.
    ///
    /// Raised instead of silently correcting (e.g. a negative order total
    /// after clamping).
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn coupon_unavailable(user_coupon_id: i64, reason: impl Into<String>) -> Self {
        CoreError::CouponUnavailable {
            user_coupon_id,
            reason: reason.into(),
        }
    }

    pub fn coupon_not_issuable(coupon_id: i64, reason: impl Into<String>) -> Self {
        CoreError::CouponNotIssuable {
            coupon_id,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. month, phone, employee code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = CoreError::InvalidTransition {
            from: OrderStatus::Paid,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "Order cannot move from paid to cancelled");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: quantity must be positive");
    }
}
