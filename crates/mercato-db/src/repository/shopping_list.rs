//! # Shopping List Repository
//!
//! One row per `(user_id, product_id, spec_name)`; adding the same spec again
//! accumulates quantity.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::{ShoppingListItem, SpecSnapshot};

use super::{from_json, to_json};
use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    user_id: i64,
    product_id: i64,
    product_name: String,
    spec_name: String,
    spec_snapshot: String,
    quantity: i64,
    is_special: bool,
    image: Option<String>,
}

impl ItemRow {
    fn into_item(self) -> DbResult<ShoppingListItem> {
        Ok(ShoppingListItem {
            id: self.id,
            user_id: self.user_id,
            product_id: self.product_id,
            product_name: self.product_name,
            spec_name: self.spec_name,
            spec_snapshot: from_json("shopping_list_items.spec_snapshot", &self.spec_snapshot)?,
            quantity: self.quantity,
            is_special: self.is_special,
            image: self.image,
        })
    }
}

const SELECT_ITEM: &str = r#"
    SELECT id, user_id, product_id, product_name, spec_name, spec_snapshot, quantity, is_special, image
    FROM shopping_list_items
"#;

/// The user's list in insertion order.
pub async fn list_for_user(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Vec<ShoppingListItem>> {
    let rows: Vec<ItemRow> = sqlx::query_as(&format!("{SELECT_ITEM} WHERE user_id = ?1 ORDER BY id"))
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(ItemRow::into_item).collect()
}

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<ShoppingListItem>> {
    let row: Option<ItemRow> = sqlx::query_as(&format!("{SELECT_ITEM} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(ItemRow::into_item).transpose()
}

pub async fn find(
    conn: &mut SqliteConnection,
    user_id: i64,
    product_id: i64,
    spec_name: &str,
) -> DbResult<Option<ShoppingListItem>> {
    let row: Option<ItemRow> = sqlx::query_as(&format!(
        "{SELECT_ITEM} WHERE user_id = ?1 AND product_id = ?2 AND spec_name = ?3"
    ))
    .bind(user_id)
    .bind(product_id)
    .bind(spec_name)
    .fetch_optional(conn)
    .await?;
    row.map(ItemRow::into_item).transpose()
}

/// Inserts a new line.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    conn: &mut SqliteConnection,
    user_id: i64,
    product_id: i64,
    product_name: &str,
    spec_name: &str,
    snapshot: &SpecSnapshot,
    quantity: i64,
    is_special: bool,
    image: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO shopping_list_items
            (user_id, product_id, product_name, spec_name, spec_snapshot, quantity, is_special, image,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(product_name)
    .bind(spec_name)
    .bind(to_json("shopping_list_items.spec_snapshot", snapshot)?)
    .bind(quantity)
    .bind(is_special)
    .bind(image)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Sets quantity and refreshes the snapshot of an existing line.
pub async fn update_line(
    conn: &mut SqliteConnection,
    id: i64,
    quantity: i64,
    snapshot: Option<&SpecSnapshot>,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let snapshot = snapshot
        .map(|s| to_json("shopping_list_items.spec_snapshot", s))
        .transpose()?;
    let result = sqlx::query(
        r#"
        UPDATE shopping_list_items
        SET quantity = ?2, spec_snapshot = COALESCE(?3, spec_snapshot), updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(quantity)
    .bind(snapshot)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM shopping_list_items WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Empties the user's list. Returns the number of removed lines.
pub async fn delete_for_user(conn: &mut SqliteConnection, user_id: i64) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM shopping_list_items WHERE user_id = ?1")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
