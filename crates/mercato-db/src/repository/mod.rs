//! # Repository Module
//!
//! SQL for every table the engine touches.
//!
//! ## Connection Passing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every function takes `&mut SqliteConnection`:                          │
//! │                                                                         │
//! │   let mut conn = db.acquire().await?;     let mut tx = db.begin().await?;│
//! │   order::fetch(&mut conn, id)             order::fetch(&mut tx, id)     │
//! │                                                                         │
//! │  The caller decides whether a call is part of a transaction.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are read into `*Row` structs (`FromRow`) and converted into the
//! mercato-core types here, so JSON columns never leave this module as text.
//!
//! ## Available Repositories
//!
//! - [`settings`] - `system_settings` key/value store
//! - [`catalog`] - Products, categories, users (read side)
//! - [`delivery_rule`] - Delivery fee setting and exclusion rules
//! - [`address`] - Delivery addresses and coordinates
//! - [`shopping_list`] - Shopping list lines
//! - [`order`] - Orders, items, live-order coordinates
//! - [`coupon`] - Coupon templates, held coupons, issue log
//! - [`commission`] - Commission rows, configs, monthly stats
//! - [`employee`] - Staff and employee codes

pub mod address;
pub mod catalog;
pub mod commission;
pub mod coupon;
pub mod delivery_rule;
pub mod employee;
pub mod order;
pub mod settings;
pub mod shopping_list;

use crate::error::{DbError, DbResult};

/// Parses a JSON TEXT column.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(column, e))
}

/// Serializes a value for a JSON TEXT column.
pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(column, e))
}

/// Parses an optional JSON TEXT column; `NULL` and empty text are `None`.
pub(crate) fn from_json_opt<T: serde::de::DeserializeOwned>(column: &str, raw: Option<&str>) -> DbResult<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => from_json(column, raw).map(Some),
    }
}
