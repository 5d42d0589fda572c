//! # Employee Repository

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use mercato_core::Employee;

use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct EmployeeRow {
    id: i64,
    employee_code: String,
    name: String,
    phone: String,
    is_sales: bool,
    created_at: DateTime<Utc>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Employee {
            id: row.id,
            employee_code: row.employee_code,
            name: row.name,
            phone: row.phone,
            is_sales: row.is_sales,
            created_at: row.created_at,
        }
    }
}

const SELECT_EMPLOYEE: &str = "SELECT id, employee_code, name, phone, is_sales, created_at FROM employees";

pub async fn code_exists(conn: &mut SqliteConnection, employee_code: &str) -> DbResult<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM employees WHERE employee_code = ?1)")
        .bind(employee_code)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

pub async fn phone_exists(conn: &mut SqliteConnection, phone: &str) -> DbResult<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM employees WHERE phone = ?1)")
        .bind(phone)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

pub async fn insert(
    conn: &mut SqliteConnection,
    employee_code: &str,
    name: &str,
    phone: &str,
    is_sales: bool,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO employees (employee_code, name, phone, is_sales, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING id
        "#,
    )
    .bind(employee_code)
    .bind(name)
    .bind(phone)
    .bind(is_sales)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Employee>> {
    let row: Option<EmployeeRow> = sqlx::query_as(&format!("{SELECT_EMPLOYEE} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Employee::from))
}

pub async fn fetch_by_code(conn: &mut SqliteConnection, employee_code: &str) -> DbResult<Option<Employee>> {
    let row: Option<EmployeeRow> = sqlx::query_as(&format!("{SELECT_EMPLOYEE} WHERE employee_code = ?1"))
        .bind(employee_code)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Employee::from))
}

/// All employees, optionally sales staff only.
pub async fn list(conn: &mut SqliteConnection, sales_only: bool) -> DbResult<Vec<Employee>> {
    let rows: Vec<EmployeeRow> = sqlx::query_as(&format!(
        "{SELECT_EMPLOYEE} WHERE (?1 = 0 OR is_sales = 1) ORDER BY employee_code"
    ))
    .bind(sales_only)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Employee::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_code_and_phone_are_unique() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let now = Utc::now();

        insert(&mut conn, "10001", "Ana", "13800000001", true, now).await.unwrap();
        assert!(code_exists(&mut conn, "10001").await.unwrap());
        assert!(phone_exists(&mut conn, "13800000001").await.unwrap());
        assert!(!code_exists(&mut conn, "10002").await.unwrap());

        let err = insert(&mut conn, "10002", "Ben", "13800000001", false, now).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        insert(&mut conn, "10003", "Cai", "13800000003", false, now).await.unwrap();
        assert_eq!(list(&mut conn, true).await.unwrap().len(), 1);
        assert_eq!(list(&mut conn, false).await.unwrap().len(), 2);
        assert_eq!(fetch_by_code(&mut conn, "10003").await.unwrap().unwrap().name, "Cai");
    }
}
