//! # Validation Module
//!
//! Input checks run at the engine boundary, before any business rule.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Request records (typed fields, closed enums)                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE: quantities, amounts, formats                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite (NOT NULL, UNIQUE, CHECK, foreign keys)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Quantity of a shopping-list line or order item.
///
/// ```rust
/// use mercato_core::validation::validate_quantity;
/// assert!(validate_quantity(3).is_ok());
/// assert!(validate_quantity(0).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: format!("must be at most {MAX_ITEM_QUANTITY}"),
        });
    }
    Ok(())
}

/// An amount that may be zero but never negative (fees, thresholds, discounts).
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// A strictly positive count (issue quantity, min quantity for free shipping).
pub fn validate_positive_count(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Non-empty trimmed text with a length cap. Returns the trimmed value.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

/// Employee codes are exactly five ASCII digits.
///
/// ```rust
/// use mercato_core::validation::validate_employee_code;
/// assert!(validate_employee_code("04217").is_ok());
/// assert!(validate_employee_code("4217").is_err());
/// assert!(validate_employee_code("0421a").is_err());
/// ```
pub fn validate_employee_code(code: &str) -> ValidationResult<()> {
    if code.len() != 5 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "employee_code".to_string(),
            reason: "must be 5 digits".to_string(),
        });
    }
    Ok(())
}

/// Phone numbers: 6 to 20 digits, optionally starting with `+`.
pub fn validate_phone(phone: &str) -> ValidationResult<String> {
    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if digits.len() < 6 || digits.len() > 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be 6-20 digits".to_string(),
        });
    }
    Ok(phone.to_string())
}

/// Commission months are `YYYY-MM`.
///
/// ```rust
/// use mercato_core::validation::validate_month;
/// assert!(validate_month("2026-03").is_ok());
/// assert!(validate_month("2026-13").is_err());
/// assert!(validate_month("2026/03").is_err());
/// ```
pub fn validate_month(month: &str) -> ValidationResult<()> {
    let invalid = || ValidationError::InvalidFormat {
        field: "month".to_string(),
        reason: "expected YYYY-MM".to_string(),
    };
    let (year, mon) = month.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || mon.len() != 2 {
        return Err(invalid());
    }
    year.parse::<u32>().map_err(|_| invalid())?;
    let mon: u32 = mon.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&mon) {
        return Err(invalid());
    }
    Ok(())
}

/// Normalises page / page size: page starts at 1, size defaults to 20, max 100.
pub fn normalize_page(page: u32, page_size: u32) -> (u32, u32) {
    let page = page.max(1);
    let page_size = match page_size {
        0 => 20,
        n => n.min(100),
    };
    (page, page_size)
}

// =============================================================================
// Unit Tests
// =============================================================================
