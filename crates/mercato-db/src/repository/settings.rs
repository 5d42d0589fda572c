//! # Settings Repository
//!
//! The `system_settings` key/value table behind [`SettingsStore`].
//!
//! [`SettingsStore`]: mercato_core::ports::SettingsStore

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::error::DbResult;

pub async fn get(conn: &mut SqliteConnection, key: &str) -> DbResult<Option<String>> {
    let value = sqlx::query_scalar("SELECT value FROM system_settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(value)
}

/// Loads every setting. Callers read tunables from the returned map.
pub async fn load_all(conn: &mut SqliteConnection) -> DbResult<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM system_settings")
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn set(conn: &mut SqliteConnection, key: &str, value: &str, now: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO system_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use mercato_core::ports::SettingsStore;
    use mercato_core::rider_payout::RiderPayoutConfig;
    use mercato_core::Money;

    #[tokio::test]
    async fn test_set_overwrites_and_feeds_payout_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let now = Utc::now();

        set(&mut conn, "delivery_base_fee", "4", now).await.unwrap();
        set(&mut conn, "delivery_base_fee", "4.5", now).await.unwrap();
        set(&mut conn, "delivery_urgent_subsidy", "not a number", now).await.unwrap();

        assert_eq!(get(&mut conn, "delivery_base_fee").await.unwrap().as_deref(), Some("4.5"));
        assert_eq!(get(&mut conn, "missing").await.unwrap(), None);

        let all = load_all(&mut conn).await.unwrap();
        assert_eq!(SettingsStore::get(&all, "delivery_base_fee").as_deref(), Some("4.5"));

        let config = RiderPayoutConfig::from_settings(&all);
        assert_eq!(config.base_fee, Money::from_cents(450));
        assert_eq!(config.urgent_subsidy, RiderPayoutConfig::default().urgent_subsidy);
    }
}
