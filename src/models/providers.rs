//! Wire formats of the upstream providers.
//!
//! Only the fields the pipeline consumes are modelled; everything else in the payloads is ignored.

use serde::{Deserialize, Serialize};

// --- OpenWeather (primary) ---

/// Response of the OpenWeather `/air_pollution` endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherAirResponse {
    pub list: Vec<OpenWeatherAirEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherAirEntry {
    pub main: OpenWeatherAirMain,
    #[serde(default)]
    pub components: OpenWeatherComponents,
    /// Unix timestamp (seconds).
    pub dt: i64,
}

/// The coarse 1-5 air quality category reported by OpenWeather.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherAirMain {
    pub aqi: u8,
}

/// Pollutant concentrations in µg/m³. Any of them may be missing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenWeatherComponents {
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub o3: Option<f64>,
}

/// Response of the OpenWeather `/weather` endpoint (metric units).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherCurrentResponse {
    pub main: OpenWeatherCurrentMain,
    pub wind: Option<OpenWeatherWind>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherCurrentMain {
    pub temp: f64,
    pub humidity: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenWeatherWind {
    pub speed: f64,
}

// --- WAQI (secondary) ---

/// Envelope of the WAQI `/feed/geo:{lat};{lon}/` endpoint.
///
/// On failure `status` is `"error"` and `data` is a plain message string, so `data` is kept
/// untyped until the status has been checked.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaqiResponse {
    pub status: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaqiFeed {
    /// Continuous index; WAQI reports `"-"` when a station has no current value.
    pub aqi: serde_json::Value,
    #[serde(default)]
    pub iaqi: WaqiComponents,
    pub time: Option<WaqiTime>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WaqiComponents {
    pub pm25: Option<WaqiValue>,
    pub pm10: Option<WaqiValue>,
    pub no2: Option<WaqiValue>,
    pub so2: Option<WaqiValue>,
    pub co: Option<WaqiValue>,
    pub o3: Option<WaqiValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaqiValue {
    pub v: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WaqiTime {
    /// ISO-8601 timestamp with offset.
    pub iso: Option<String>,
}
