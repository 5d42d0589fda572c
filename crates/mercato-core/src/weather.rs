//! Weather readings and the "extreme weather" rule for rider subsidies.

use serde::{Deserialize, Serialize};

/// Condition keywords that make a reading extreme (case-insensitive).
const EXTREME_KEYWORDS: [&str; 5] = ["rain", "snow", "storm", "typhoon", "extreme"];

/// Current weather at a delivery address, persisted on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInfo {
    /// Degrees Celsius.
    pub temperature: f64,
    pub condition: String,
    /// Millimetres.
    #[serde(default)]
    pub precipitation: f64,
}

impl WeatherInfo {
    /// Extreme when hot enough, wet, or the condition names bad weather.
    pub fn is_extreme(&self, extreme_temp: f64) -> bool {
        is_extreme(self, extreme_temp)
    }
}

/// ```rust
/// use mercato_core::weather::{is_extreme, WeatherInfo};
///
/// let w = WeatherInfo { temperature: 22.0, condition: "Light Rain".into(), precipitation: 0.0 };
/// assert!(is_extreme(&w, 37.0));
/// ```
pub fn is_extreme(weather: &WeatherInfo, extreme_temp: f64) -> bool {
    if weather.temperature >= extreme_temp || weather.precipitation > 0.0 {
        return true;
    }
    let condition = weather.condition.to_lowercase();
    EXTREME_KEYWORDS.iter().any(|k| condition.contains(k))
}
