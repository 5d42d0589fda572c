//! # Address Repository

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::geo::GeoPoint;
use mercato_core::Address;

use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct AddressRow {
    id: i64,
    user_id: i64,
    text: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    store_type: Option<String>,
    is_default: bool,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Address {
            id: row.id,
            user_id: row.user_id,
            text: row.text,
            latitude: row.latitude,
            longitude: row.longitude,
            store_type: row.store_type,
            is_default: row.is_default,
        }
    }
}

const SELECT_ADDRESS: &str =
    "SELECT id, user_id, text, latitude, longitude, store_type, is_default FROM addresses";

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Address>> {
    let row: Option<AddressRow> = sqlx::query_as(&format!("{SELECT_ADDRESS} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Address::from))
}

/// A user's addresses, default first.
pub async fn list_for_user(conn: &mut SqliteConnection, user_id: i64) -> DbResult<Vec<Address>> {
    let rows: Vec<AddressRow> = sqlx::query_as(&format!(
        "{SELECT_ADDRESS} WHERE user_id = ?1 ORDER BY is_default DESC, id"
    ))
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Address::from).collect())
}

pub async fn count_for_user(conn: &mut SqliteConnection, user_id: i64) -> DbResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM addresses WHERE user_id = ?1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

pub async fn insert(
    conn: &mut SqliteConnection,
    user_id: i64,
    text: &str,
    point: Option<GeoPoint>,
    store_type: Option<&str>,
    is_default: bool,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO addresses (user_id, text, latitude, longitude, store_type, is_default, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(text)
    .bind(point.map(|p| p.latitude))
    .bind(point.map(|p| p.longitude))
    .bind(store_type)
    .bind(is_default)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Replaces the text and coordinates. `None` clears the coordinates.
pub async fn update_text(
    conn: &mut SqliteConnection,
    id: i64,
    text: &str,
    point: Option<GeoPoint>,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE addresses SET text = ?2, latitude = ?3, longitude = ?4, updated_at = ?5 WHERE id = ?1",
    )
    .bind(id)
    .bind(text)
    .bind(point.map(|p| p.latitude))
    .bind(point.map(|p| p.longitude))
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Clears the default flag on every address of the user.
pub async fn clear_default(conn: &mut SqliteConnection, user_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE addresses SET is_default = 0 WHERE user_id = ?1 AND is_default = 1")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn mark_default(conn: &mut SqliteConnection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query("UPDATE addresses SET is_default = 1, updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
