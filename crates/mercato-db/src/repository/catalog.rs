//! # Catalog Repository
//!
//! Products, categories and users. The engine only reads these; the insert
//! functions exist for the seed tool and tests.

use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;

use mercato_core::delivery_fee::ProductPlacement;
use mercato_core::{Category, CustomerRole, Product, ProductSpec, User};

use super::{from_json, to_json};
use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category_id: Option<i64>,
    image: Option<String>,
    specs: String,
}

impl ProductRow {
    fn into_product(self) -> DbResult<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            category_id: self.category_id,
            image: self.image,
            specs: from_json("products.specs", &self.specs)?,
        })
    }
}

// =============================================================================
// Products
// =============================================================================

pub async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as("SELECT id, name, category_id, image, specs FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(ProductRow::into_product).transpose()
}

/// Loads the given products keyed by id. Unknown ids are skipped.
pub async fn fetch_products(conn: &mut SqliteConnection, ids: &[i64]) -> DbResult<HashMap<i64, Product>> {
    let mut products = HashMap::with_capacity(ids.len());
    for &id in ids {
        if products.contains_key(&id) {
            continue;
        }
        if let Some(product) = fetch_product(&mut *conn, id).await? {
            products.insert(id, product);
        }
    }
    Ok(products)
}

/// Category and parent category of each product.
pub async fn placements(conn: &mut SqliteConnection, product_ids: &[i64]) -> DbResult<HashMap<i64, ProductPlacement>> {
    let mut placements = HashMap::with_capacity(product_ids.len());
    for &id in product_ids {
        if placements.contains_key(&id) {
            continue;
        }
        let row: Option<(Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT p.category_id, c.parent_id
            FROM products p
            LEFT JOIN categories c ON c.id = p.category_id
            WHERE p.id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some((category_id, parent_category_id)) = row {
            placements.insert(
                id,
                ProductPlacement {
                    category_id,
                    parent_category_id,
                },
            );
        }
    }
    Ok(placements)
}

pub async fn insert_product(
    conn: &mut SqliteConnection,
    name: &str,
    category_id: Option<i64>,
    image: Option<&str>,
    specs: &[ProductSpec],
) -> DbResult<i64> {
    let id = sqlx::query_scalar("INSERT INTO products (name, category_id, image, specs) VALUES (?1, ?2, ?3, ?4) RETURNING id")
        .bind(name)
        .bind(category_id)
        .bind(image)
        .bind(to_json("products.specs", &specs)?)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

// =============================================================================
// Categories
// =============================================================================

pub async fn fetch_category(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Category>> {
    let row: Option<(i64, Option<i64>, String)> = sqlx::query_as("SELECT id, parent_id, name FROM categories WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|(id, parent_id, name)| Category { id, parent_id, name }))
}

pub async fn insert_category(conn: &mut SqliteConnection, name: &str, parent_id: Option<i64>) -> DbResult<i64> {
    let id = sqlx::query_scalar("INSERT INTO categories (name, parent_id) VALUES (?1, ?2) RETURNING id")
        .bind(name)
        .bind(parent_id)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    user_type: CustomerRole,
    sales_code: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            user_type: row.user_type,
            sales_code: row.sales_code.filter(|code| !code.trim().is_empty()),
        }
    }
}

pub async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as("SELECT id, name, user_type, sales_code FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(User::from))
}

pub async fn insert_user(
    conn: &mut SqliteConnection,
    name: &str,
    user_type: CustomerRole,
    sales_code: Option<&str>,
) -> DbResult<i64> {
    let id = sqlx::query_scalar("INSERT INTO users (name, user_type, sales_code) VALUES (?1, ?2, ?3) RETURNING id")
        .bind(name)
        .bind(user_type)
        .bind(sales_code)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use mercato_core::{Money, SpecSnapshot};

    #[tokio::test]
    async fn test_product_specs_round_trip_and_placement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let drinks = insert_category(&mut conn, "Drinks", None).await.unwrap();
        let soda = insert_category(&mut conn, "Soda", Some(drinks)).await.unwrap();
        let spec = ProductSpec {
            name: "330ml x 24".to_string(),
            prices: SpecSnapshot {
                cost: Money::from_major(30),
                wholesale_price: Money::from_major(36),
                retail_price: Money::from_major(42),
                delivery_count: Some(2.0),
            },
        };
        let product_id = insert_product(&mut conn, "Cola", Some(soda), None, &[spec.clone()]).await.unwrap();

        let product = fetch_product(&mut conn, product_id).await.unwrap().unwrap();
        assert_eq!(product.spec("330ml x 24"), Some(&spec));

        let map = placements(&mut conn, &[product_id, 999]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&product_id].category_id, Some(soda));
        assert_eq!(map[&product_id].parent_category_id, Some(drinks));
    }

    #[tokio::test]
    async fn test_blank_sales_code_reads_as_none() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let id = insert_user(&mut conn, "Shop", CustomerRole::Wholesale, Some("  ")).await.unwrap();
        let user = fetch_user(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(user.sales_code, None);
        assert_eq!(user.user_type, CustomerRole::Wholesale);
    }
}
