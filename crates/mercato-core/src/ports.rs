//! # Ports
//!
//! Everything the engine needs from the outside world, as traits.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Port            Used by                     Failure means              │
//! │  ─────────────   ─────────────────────────   ────────────────────────   │
//! │  GeoService      addresses (geocode)         coordinates stay null      │
//! │  WeatherService  rider payout, cascade       weather subsidy is 0       │
//! │  SettingsStore   payout config, API keys     defaults apply             │
//! │  Clock           every timestamp             -                          │
//! │  RandomSource    employee codes, order nos   -                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Geo and weather return `Option`: the engine never propagates their errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::geo::{haversine_km, GeoPoint};
use crate::weather::WeatherInfo;

/// Settings key holding the maps API key.
pub const MAP_KEY_SETTING: &str = "map_amap_key";

/// Settings key holding the weather API key.
pub const WEATHER_KEY_SETTING: &str = "weather_api_key";

/// Geocoding and distance.
#[async_trait]
pub trait GeoService: Send + Sync {
    /// Resolves free-form address text to coordinates.
    async fn geocode(&self, address: &str, api_key: Option<&str>) -> Option<GeoPoint>;

    /// Great-circle distance in kilometres.
    fn distance_km(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        haversine_km(a, b)
    }
}

/// Current weather at a point.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn now(&self, point: GeoPoint, api_key: Option<&str>) -> Option<WeatherInfo>;
}

/// String key/value settings.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;
}

impl SettingsStore for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Uniform random integers.
pub trait RandomSource: Send + Sync {
    /// A value in `0..upper`. `upper` is positive.
    fn next_below(&self, upper: u32) -> u32;
}

// =============================================================================
// Test Doubles
// =============================================================================

/// Deterministic implementations of the ports for tests and the seed tool.
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn new(at: DateTime<Utc>) -> Self {
            Self(Mutex::new(at))
        }

        pub fn set(&self, at: DateTime<Utc>) {
            if let Ok(mut guard) = self.0.lock() {
                *guard = at;
            }
        }

        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut guard) = self.0.lock() {
                *guard += by;
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            match self.0.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// Replays a fixed sequence of values, cycling.
    #[derive(Debug)]
    pub struct SequenceRandom {
        values: Vec<u32>,
        cursor: AtomicUsize,
    }

    impl SequenceRandom {
        pub fn new(values: Vec<u32>) -> Self {
            Self {
                values,
                cursor: AtomicUsize::new(0),
            }
        }
    }

    impl RandomSource for SequenceRandom {
        fn next_below(&self, upper: u32) -> u32 {
            if self.values.is_empty() || upper == 0 {
                return 0;
            }
            let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
            self.values[i] % upper
        }
    }

    /// Same weather everywhere, or none.
    #[derive(Debug, Default)]
    pub struct StaticWeather(pub Option<WeatherInfo>);

    #[async_trait]
    impl WeatherService for StaticWeather {
        async fn now(&self, _point: GeoPoint, _api_key: Option<&str>) -> Option<WeatherInfo> {
            self.0.clone()
        }
    }

    /// Geocodes from a fixed table of address text.
    #[derive(Debug, Default)]
    pub struct StaticGeo(pub HashMap<String, GeoPoint>);

    impl StaticGeo {
        pub fn with(mut self, address: &str, point: GeoPoint) -> Self {
            self.0.insert(address.to_string(), point);
            self
        }
    }

    #[async_trait]
    impl GeoService for StaticGeo {
        async fn geocode(&self, address: &str, _api_key: Option<&str>) -> Option<GeoPoint> {
            self.0.get(address).copied()
        }
    }
}
