//! # Engine Services
//!
//! Transactional operations built from the repositories and the pure rules
//! in mercato-core.
//!
//! ## Service Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Engine                                     │
//! │   (Database + Ports + business timezone + settlement locks)             │
//! │                                                                         │
//! │  checkout()        preview: fee summary ─► coupons ─► payable          │
//! │  orders()          create / transition (tx) ─► cascade, ledger          │
//! │  rider_payout()    payout quote, isolation cascade, rider preview       │
//! │  ledger()          settlement, bulk account/settle, reporting           │
//! │  coupons()         templates, issuance, held coupons                    │
//! │  delivery_rules()  fee setting, exclusion rules                         │
//! │  shopping_list()   list upkeep                                          │
//! │  addresses()       geocoded addresses, default handling                 │
//! │  employees()       staff with generated codes                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every service holds an `Arc<EngineState>`; cloning a service is cheap.
//! A service never holds a pooled connection while waiting on another one.

pub mod address;
pub mod checkout;
pub mod commission_ledger;
pub mod coupon;
pub mod delivery_rules;
pub mod employee;
pub mod error;
pub mod locks;
pub mod order_lifecycle;
pub mod rider_payout;
pub mod shopping_list;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use sqlx::SqliteConnection;
use tracing::warn;

use mercato_core::geo::GeoPoint;
use mercato_core::ports::{
    Clock, GeoService, RandomSource, SettingsStore, WeatherService, MAP_KEY_SETTING, WEATHER_KEY_SETTING,
};
use mercato_core::rider_payout::RiderPayoutConfig;
use mercato_core::weather::WeatherInfo;

use crate::config::{ConfigError, EngineConfig};
use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::settings;

pub use error::{EngineError, EngineResult, ErrorKind};
use locks::SettlementLocks;

// =============================================================================
// Ports
// =============================================================================

/// The outside world as the engine sees it.
#[derive(Clone)]
pub struct Ports {
    pub geo: Arc<dyn GeoService>,
    pub weather: Arc<dyn WeatherService>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
}

impl Ports {
    /// Real clock and entropy with the given geo and weather adapters.
    pub fn system(geo: Arc<dyn GeoService>, weather: Arc<dyn WeatherService>) -> Self {
        Ports {
            geo,
            weather,
            clock: Arc::new(SystemClock),
            random: Arc::new(SystemRandom),
        }
    }
}

/// `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Draws from a fresh v4 UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn next_below(&self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        (uuid::Uuid::new_v4().as_u128() % upper as u128) as u32
    }
}

// =============================================================================
// Shared State
// =============================================================================

pub(crate) struct EngineState {
    pub(crate) db: Database,
    pub(crate) ports: Ports,
    pub(crate) zone: FixedOffset,
    pub(crate) outbound_timeout: Duration,
    pub(crate) locks: SettlementLocks,
}

impl EngineState {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.ports.clock.now()
    }

    pub(crate) async fn settings(&self, conn: &mut SqliteConnection) -> DbResult<HashMap<String, String>> {
        settings::load_all(conn).await
    }

    /// The settings map together with the payout tunables read from it.
    pub(crate) async fn payout_settings(
        &self,
        conn: &mut SqliteConnection,
    ) -> DbResult<(HashMap<String, String>, RiderPayoutConfig)> {
        let settings = self.settings(conn).await?;
        let config = RiderPayoutConfig::from_settings(&settings);
        Ok((settings, config))
    }

    /// Geocodes under the outbound deadline. Failures are logged, not raised.
    pub(crate) async fn geocode<S: SettingsStore + ?Sized>(&self, settings: &S, text: &str) -> Option<GeoPoint> {
        let key = settings.get(MAP_KEY_SETTING);
        let call = self.ports.geo.geocode(text, key.as_deref());
        match tokio::time::timeout(self.outbound_timeout, call).await {
            Ok(Some(point)) => Some(point),
            Ok(None) => {
                warn!(address = %text, "Geocoding returned no result");
                None
            }
            Err(_) => {
                warn!(address = %text, timeout_ms = self.outbound_timeout.as_millis() as u64, "Geocoding timed out");
                None
            }
        }
    }

    /// Current weather under the outbound deadline. Failures are logged, not raised.
    pub(crate) async fn weather_at<S: SettingsStore + ?Sized>(&self, settings: &S, point: GeoPoint) -> Option<WeatherInfo> {
        let key = settings.get(WEATHER_KEY_SETTING);
        let call = self.ports.weather.now(point, key.as_deref());
        match tokio::time::timeout(self.outbound_timeout, call).await {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                warn!(lat = point.latitude, lng = point.longitude, "Weather lookup returned no result");
                None
            }
            Err(_) => {
                warn!(
                    lat = point.latitude,
                    lng = point.longitude,
                    timeout_ms = self.outbound_timeout.as_millis() as u64,
                    "Weather lookup timed out"
                );
                None
            }
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Entry point: hands out the services.
#[derive(Clone)]
pub struct Engine {
    state: Arc<EngineState>,
}

impl Engine {
    /// Builds an engine from process configuration.
    pub fn new(db: Database, ports: Ports, config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_zone(db, ports, config.zone()?, config.outbound_timeout()))
    }

    pub fn with_zone(db: Database, ports: Ports, zone: FixedOffset, outbound_timeout: Duration) -> Self {
        Engine {
            state: Arc::new(EngineState {
                db,
                ports,
                zone,
                outbound_timeout,
                locks: SettlementLocks::new(),
            }),
        }
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn zone(&self) -> FixedOffset {
        self.state.zone
    }

    pub fn checkout(&self) -> checkout::CheckoutService {
        checkout::CheckoutService::new(Arc::clone(&self.state))
    }

    pub fn orders(&self) -> order_lifecycle::OrderService {
        order_lifecycle::OrderService::new(Arc::clone(&self.state))
    }

    pub fn rider_payout(&self) -> rider_payout::RiderPayoutService {
        rider_payout::RiderPayoutService::new(Arc::clone(&self.state))
    }

    pub fn ledger(&self) -> commission_ledger::CommissionLedgerService {
        commission_ledger::CommissionLedgerService::new(Arc::clone(&self.state))
    }

    pub fn coupons(&self) -> coupon::CouponService {
        coupon::CouponService::new(Arc::clone(&self.state))
    }

    pub fn delivery_rules(&self) -> delivery_rules::DeliveryRuleService {
        delivery_rules::DeliveryRuleService::new(Arc::clone(&self.state))
    }

    pub fn shopping_list(&self) -> shopping_list::ShoppingListService {
        shopping_list::ShoppingListService::new(Arc::clone(&self.state))
    }

    pub fn addresses(&self) -> address::AddressService {
        address::AddressService::new(Arc::clone(&self.state))
    }

    pub fn employees(&self) -> employee::EmployeeService {
        employee::EmployeeService::new(Arc::clone(&self.state))
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    //! A seeded in-memory engine shared by the service tests.

    use super::*;
    use crate::repository::{address, catalog, coupon, delivery_rule};
    use crate::DbConfig;
    use chrono::TimeZone;
    use mercato_core::ports::testing::{FixedClock, SequenceRandom, StaticGeo, StaticWeather};
    use mercato_core::{CouponType, CustomerRole, DeliveryFeeSetting, Money, ProductSpec, SpecSnapshot};

    pub const SALES_CODE: &str = "20001";

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 2, 0, 0).unwrap()
    }

    pub struct Fixture {
        pub engine: Engine,
        pub clock: Arc<FixedClock>,
        pub user_id: i64,
        pub address_id: i64,
        pub product_id: i64,
    }

    pub fn spec(name: &str, cost: i64, wholesale: i64, retail: i64) -> ProductSpec {
        ProductSpec {
            name: name.to_string(),
            prices: SpecSnapshot {
                cost: Money::from_major(cost),
                wholesale_price: Money::from_major(wholesale),
                retail_price: Money::from_major(retail),
                delivery_count: None,
            },
        }
    }

    pub async fn engine_with(geo: StaticGeo, weather: StaticWeather) -> (Engine, Arc<FixedClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::new(start()));
        let ports = Ports {
            geo: Arc::new(geo),
            weather: Arc::new(weather),
            clock: clock.clone(),
            random: Arc::new(SequenceRandom::new(vec![42, 13579, 24680])),
        };
        let zone = FixedOffset::east_opt(8 * 3600).unwrap();
        (Engine::with_zone(db, ports, zone, Duration::from_millis(500)), clock)
    }

    /// One retail user of [`SALES_CODE`] with a geocoded default address and
    /// a product "Rice" (spec "10kg": cost 40, wholesale 50, retail 60).
    pub async fn fixture() -> Fixture {
        let (engine, clock) = engine_with(StaticGeo::default(), StaticWeather::default()).await;
        let mut conn = engine.db().acquire().await.unwrap();
        let user_id = catalog::insert_user(&mut conn, "Corner Shop", CustomerRole::Retail, Some(SALES_CODE))
            .await
            .unwrap();
        let address_id = address::insert(
            &mut conn,
            user_id,
            "8 Harbour Rd",
            Some(GeoPoint::new(31.20, 121.40)),
            None,
            true,
            start(),
        )
        .await
        .unwrap();
        let staples = catalog::insert_category(&mut conn, "Staples", None).await.unwrap();
        let product_id = catalog::insert_product(&mut conn, "Rice", Some(staples), None, &[spec("10kg", 40, 50, 60)])
            .await
            .unwrap();
        delivery_rule::upsert_setting(
            &mut conn,
            DeliveryFeeSetting {
                base_fee: Money::from_major(5),
                free_shipping_threshold: Money::from_major(100),
            },
            start(),
        )
        .await
        .unwrap();
        drop(conn);
        Fixture {
            engine,
            clock,
            user_id,
            address_id,
            product_id,
        }
    }

    /// Creates a template valid around [`start`] and hands one to the user.
    /// Returns the user coupon id.
    pub async fn grant_coupon(
        engine: &Engine,
        user_id: i64,
        coupon_type: CouponType,
        discount: Money,
        min_amount: Money,
    ) -> i64 {
        let mut conn = engine.db().acquire().await.unwrap();
        let coupon_id = coupon::insert_coupon(
            &mut conn,
            &coupon::NewCoupon {
                name: "promo",
                coupon_type,
                discount_value: discount,
                min_amount,
                category_ids: &[],
                total_count: 0,
                valid_from: start() - chrono::Duration::days(1),
                valid_to: start() + chrono::Duration::days(30),
            },
            start(),
        )
        .await
        .unwrap();
        coupon::insert_user_coupon(&mut conn, user_id, coupon_id, None, start())
            .await
            .unwrap()
    }
}
