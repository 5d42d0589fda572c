//! # Seed Data Generator
//!
//! Populates a development database with a small catalogue, buyers,
//! sales staff, the delivery fee setting and a coupon template.
//!
//! ## Usage
//! ```bash
//! # Seed ./mercato.db (or MERCATO_DB_PATH)
//! cargo run -p mercato-db --bin seed
//!
//! # Specify database path
//! cargo run -p mercato-db --bin seed -- --db ./data/dev.db
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info,mercato_db=debug,sqlx=warn`).

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mercato_core::geo::GeoPoint;
use mercato_core::ports::{GeoService, WeatherService};
use mercato_core::weather::WeatherInfo;
use mercato_core::{CouponType, CustomerRole, DeliveryFeeSetting, ExclusionTarget, Money, ProductSpec, SpecSnapshot};
use mercato_db::repository::{address, catalog};
use mercato_db::service::coupon::CreateCouponRequest;
use mercato_db::service::delivery_rules::ExclusionRequest;
use mercato_db::{Database, Engine, EngineConfig, Ports};

/// Categories and their products: (name, [(spec, cost, wholesale, retail)]).
const CATALOGUE: &[(&str, &[(&str, &[(&str, i64, i64, i64)])])] = &[
    (
        "Staples",
        &[
            ("Rice", &[("10kg", 40, 50, 60), ("25kg", 95, 115, 135)]),
            ("Flour", &[("5kg", 18, 23, 28)]),
            ("Cooking Oil", &[("5L", 45, 55, 66)]),
        ],
    ),
    (
        "Drinks",
        &[
            ("Mineral Water", &[("24x550ml", 16, 20, 26)]),
            ("Orange Juice", &[("12x1L", 48, 60, 72)]),
        ],
    ),
    (
        "Frozen",
        &[
            ("Dumplings", &[("1kg", 14, 18, 23)]),
            ("Chicken Wings", &[("2kg", 38, 46, 55)]),
        ],
    ),
];

/// (name, role, address, latitude, longitude)
const BUYERS: &[(&str, CustomerRole, &str, f64, f64)] = &[
    ("Corner Shop", CustomerRole::Retail, "8 Harbour Rd", 31.2000, 121.4000),
    ("Noodle House", CustomerRole::Wholesale, "21 Canal St", 31.2080, 121.4050),
    ("Hilltop Mart", CustomerRole::Retail, "3 Summit Ave", 31.3500, 121.5200),
];

/// Adapters that never answer; seeded addresses carry their own coordinates.
struct Offline;

#[async_trait]
impl GeoService for Offline {
    async fn geocode(&self, _address: &str, _api_key: Option<&str>) -> Option<GeoPoint> {
        None
    }
}

#[async_trait]
impl WeatherService for Offline {
    async fn now(&self, _point: GeoPoint, _api_key: Option<&str>) -> Option<WeatherInfo> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mercato_db=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = EngineConfig::from_env()?;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mercato Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $MERCATO_DB_PATH or ./mercato.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %config.database_path, "Opening database");
    let db = Database::new(config.db_config()).await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        warn!(products = existing, "Database already seeded, skipping");
        return Ok(());
    }

    let offline = Arc::new(Offline);
    let engine = Engine::new(db, Ports::system(offline.clone(), offline), &config)?;

    // Staff first: buyers reference a sales code.
    let sales = engine.employees().create_employee("Lin Wei", "13800000001", true).await?;
    engine.employees().create_employee("Zhao Min", "13800000002", false).await?;
    info!(sales_code = %sales.employee_code, "Employees created");

    let mut conn = engine.db().acquire().await?;
    let mut first_product = None;
    let mut frozen = None;
    for (category, products) in CATALOGUE {
        let category_id = catalog::insert_category(&mut conn, category, None).await?;
        if *category == "Frozen" {
            frozen = Some(category_id);
        }
        for (name, specs) in products.iter() {
            let specs: Vec<ProductSpec> = specs
                .iter()
                .map(|(spec, cost, wholesale, retail)| ProductSpec {
                    name: spec.to_string(),
                    prices: SpecSnapshot {
                        cost: Money::from_major(*cost),
                        wholesale_price: Money::from_major(*wholesale),
                        retail_price: Money::from_major(*retail),
                        delivery_count: None,
                    },
                })
                .collect();
            let id = catalog::insert_product(&mut conn, name, Some(category_id), None, &specs).await?;
            first_product.get_or_insert(id);
        }
    }

    let now = chrono::Utc::now();
    let mut buyer_ids = Vec::with_capacity(BUYERS.len());
    for (name, role, text, lat, lng) in BUYERS {
        let user_id = catalog::insert_user(&mut conn, name, *role, Some(sales.employee_code.as_str())).await?;
        address::insert(&mut conn, user_id, text, Some(GeoPoint::new(*lat, *lng)), None, true, now).await?;
        buyer_ids.push(user_id);
    }
    drop(conn);
    info!(buyers = buyer_ids.len(), "Catalogue and buyers created");

    let rules = engine.delivery_rules();
    rules
        .upsert_setting(DeliveryFeeSetting {
            base_fee: Money::from_major(5),
            free_shipping_threshold: Money::from_major(100),
        })
        .await?;
    if let Some(category_id) = frozen {
        rules
            .create_exclusion(ExclusionRequest {
                item_type: ExclusionTarget::Category,
                target_id: category_id,
                min_quantity_for_free: Some(10),
                remark: Some("cold chain".to_string()),
            })
            .await?;
    }

    let coupon = engine
        .coupons()
        .create_coupon(CreateCouponRequest {
            name: "Welcome 10 off 80".to_string(),
            coupon_type: CouponType::Amount,
            discount_value: Money::from_major(10),
            min_amount: Money::from_major(80),
            category_ids: vec![],
            total_count: 0,
            valid_from: now,
            valid_to: now + Duration::days(30),
        })
        .await?;
    info!(coupon_id = coupon.id, "Coupon template created");

    if let Some(product_id) = first_product {
        engine
            .shopping_list()
            .add_item(buyer_ids[0], product_id, "10kg", 2, false)
            .await?;
    }

    info!("Seed complete");
    Ok(())
}
