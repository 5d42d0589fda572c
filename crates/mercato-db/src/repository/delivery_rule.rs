//! # Delivery Rule Repository
//!
//! The singleton delivery fee setting and the exclusion rules.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::{DeliveryFeeExclusion, DeliveryFeeSetting, ExclusionTarget, Money};

use crate::error::DbResult;

// =============================================================================
// Setting
// =============================================================================

/// The process-wide setting; a missing row reads as zero fee, zero threshold.
pub async fn fetch_setting(conn: &mut SqliteConnection) -> DbResult<DeliveryFeeSetting> {
    let row: Option<(Money, Money)> = sqlx::query_as(
        "SELECT base_fee_cents, free_shipping_threshold_cents FROM delivery_fee_settings WHERE id = 1",
    )
    .fetch_optional(conn)
    .await?;
    Ok(row
        .map(|(base_fee, free_shipping_threshold)| DeliveryFeeSetting {
            base_fee,
            free_shipping_threshold,
        })
        .unwrap_or_default())
}

pub async fn upsert_setting(conn: &mut SqliteConnection, setting: DeliveryFeeSetting, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO delivery_fee_settings (id, base_fee_cents, free_shipping_threshold_cents, updated_at)
        VALUES (1, ?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            base_fee_cents = excluded.base_fee_cents,
            free_shipping_threshold_cents = excluded.free_shipping_threshold_cents,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(setting.base_fee)
    .bind(setting.free_shipping_threshold)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Exclusions
// =============================================================================

#[derive(Debug, FromRow)]
struct ExclusionRow {
    id: i64,
    item_type: ExclusionTarget,
    target_id: i64,
    target_name: Option<String>,
    min_quantity_for_free: Option<i64>,
    remark: Option<String>,
}

impl From<ExclusionRow> for DeliveryFeeExclusion {
    fn from(row: ExclusionRow) -> Self {
        DeliveryFeeExclusion {
            id: row.id,
            item_type: row.item_type,
            target_id: row.target_id,
            target_name: row.target_name.unwrap_or_default(),
            min_quantity_for_free: row.min_quantity_for_free,
            remark: row.remark,
        }
    }
}

const SELECT_EXCLUSIONS: &str = r#"
    SELECT
        e.id,
        e.item_type,
        e.target_id,
        CASE e.item_type WHEN 'product' THEN p.name ELSE c.name END AS target_name,
        e.min_quantity_for_free,
        e.remark
    FROM delivery_fee_exclusions e
    LEFT JOIN products p ON e.item_type = 'product' AND p.id = e.target_id
    LEFT JOIN categories c ON e.item_type = 'category' AND c.id = e.target_id
"#;

/// All rules, products first, then by id.
pub async fn list_exclusions(conn: &mut SqliteConnection) -> DbResult<Vec<DeliveryFeeExclusion>> {
    let rows: Vec<ExclusionRow> = sqlx::query_as(&format!("{SELECT_EXCLUSIONS} ORDER BY e.item_type DESC, e.id"))
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(DeliveryFeeExclusion::from).collect())
}

pub async fn fetch_exclusion(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<DeliveryFeeExclusion>> {
    let row: Option<ExclusionRow> = sqlx::query_as(&format!("{SELECT_EXCLUSIONS} WHERE e.id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(DeliveryFeeExclusion::from))
}

pub async fn insert_exclusion(
    conn: &mut SqliteConnection,
    item_type: ExclusionTarget,
    target_id: i64,
    min_quantity_for_free: Option<i64>,
    remark: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO delivery_fee_exclusions
            (item_type, target_id, min_quantity_for_free, remark, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        RETURNING id
        "#,
    )
    .bind(item_type)
    .bind(target_id)
    .bind(min_quantity_for_free)
    .bind(remark)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Returns `false` when no rule has that id.
pub async fn update_exclusion(
    conn: &mut SqliteConnection,
    id: i64,
    min_quantity_for_free: Option<i64>,
    remark: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE delivery_fee_exclusions SET min_quantity_for_free = ?2, remark = ?3, updated_at = ?4 WHERE id = ?1",
    )
    .bind(id)
    .bind(min_quantity_for_free)
    .bind(remark)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns `false` when no rule has that id.
pub async fn delete_exclusion(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM delivery_fee_exclusions WHERE id = ?1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::catalog;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_missing_setting_is_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        assert_eq!(fetch_setting(&mut conn).await.unwrap(), DeliveryFeeSetting::default());

        let setting = DeliveryFeeSetting {
            base_fee: Money::from_major(5),
            free_shipping_threshold: Money::from_major(100),
        };
        upsert_setting(&mut conn, setting, Utc::now()).await.unwrap();
        assert_eq!(fetch_setting(&mut conn).await.unwrap(), setting);
    }

    #[tokio::test]
    async fn test_exclusion_names_and_uniqueness() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let now = Utc::now();
        let category = catalog::insert_category(&mut conn, "Frozen", None).await.unwrap();

        let id = insert_exclusion(&mut conn, ExclusionTarget::Category, category, Some(10), None, now)
            .await
            .unwrap();
        let rule = fetch_exclusion(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(rule.target_name, "Frozen");
        assert_eq!(rule.min_quantity_for_free, Some(10));

        let err = insert_exclusion(&mut conn, ExclusionTarget::Category, category, None, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        assert!(update_exclusion(&mut conn, id, None, Some("always"), now).await.unwrap());
        assert_eq!(list_exclusions(&mut conn).await.unwrap()[0].min_quantity_for_free, None);
        assert!(delete_exclusion(&mut conn, id).await.unwrap());
        assert!(!delete_exclusion(&mut conn, id).await.unwrap());
    }
}
