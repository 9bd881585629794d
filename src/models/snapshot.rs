//! Readings, stored snapshots and the aggregate views over them.

use crate::aqi::{aqi_from_pm25, Aqi, AqiCategory};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which link of the provider chain produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Primary,
    Secondary,
    /// Synthetic values; consumers should discount confidence.
    Mock,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Primary => "primary",
            DataSource::Secondary => "secondary",
            DataSource::Mock => "mock",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six pollutant concentrations of one reading (µg/m³).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pollutants {
    pub pm25: f64,
    pub pm10: f64,
    pub no2: f64,
    pub so2: f64,
    pub co: f64,
    pub o3: f64,
}

impl Pollutants {
    /// Returns a copy with every concentration clamped to be non-negative (NaN becomes 0).
    pub fn clamped(&self) -> Self {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.max(0.0) };
        Self {
            pm25: clamp(self.pm25),
            pm10: clamp(self.pm10),
            no2: clamp(self.no2),
            so2: clamp(self.so2),
            co: clamp(self.co),
            o3: clamp(self.o3),
        }
    }
}

/// Optional meteorological context attached to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// One normalized reading as returned by the provider chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(flatten)]
    pub pollutants: Pollutants,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
    pub weather: Option<WeatherConditions>,
}

/// A snapshot ready to be appended to the history store.
///
/// Only constructible from a [`Reading`], so the stored index always derives from the stored
/// PM2.5 concentration.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub(crate) district_id: i32,
    pub(crate) measured_at: DateTime<Utc>,
    pub(crate) pollutants: Pollutants,
    pub(crate) aqi: Aqi,
    pub(crate) weather: WeatherConditions,
    pub(crate) source: DataSource,
}

impl NewSnapshot {
    pub fn from_reading(district_id: i32, reading: &Reading) -> Self {
        let pollutants = reading.pollutants.clamped();
        Self {
            district_id,
            measured_at: reading.timestamp,
            pollutants,
            aqi: aqi_from_pm25(pollutants.pm25),
            weather: reading.weather.unwrap_or_default(),
            source: reading.source,
        }
    }

    pub fn district_id(&self) -> i32 {
        self.district_id
    }

    pub fn aqi(&self) -> Aqi {
        self.aqi
    }
}

/// A persisted row of `air_quality_history`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Snapshot {
    pub id: i64,
    pub district_id: i32,
    pub measured_at: DateTime<Utc>,
    pub pm25: f64,
    pub pm10: f64,
    pub no2: f64,
    pub so2: f64,
    pub co: f64,
    pub o3: f64,
    pub aqi: i32,
    pub aqi_status: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub source: String,
    pub is_forecast: bool,
    /// Set on rows written by the external forecasting service.
    pub confidence_level: Option<f64>,
}

impl Snapshot {
    /// Category of the stored row; rows with an unrecognised label fall back to the index.
    pub fn category(&self) -> AqiCategory {
        AqiCategory::from_label(&self.aqi_status)
            .unwrap_or_else(|| AqiCategory::from_index(self.aqi))
    }

    /// Materializes a pending snapshot with the id assigned by the store.
    pub fn from_new(id: i64, new: &NewSnapshot) -> Self {
        Self {
            id,
            district_id: new.district_id,
            measured_at: new.measured_at,
            pm25: new.pollutants.pm25,
            pm10: new.pollutants.pm10,
            no2: new.pollutants.no2,
            so2: new.pollutants.so2,
            co: new.pollutants.co,
            o3: new.pollutants.o3,
            aqi: new.aqi.value,
            aqi_status: new.aqi.category.label().to_string(),
            temperature: new.weather.temperature,
            humidity: new.weather.humidity,
            pressure: new.weather.pressure,
            wind_speed: new.weather.wind_speed,
            source: new.source.as_str().to_string(),
            is_forecast: false,
            confidence_level: None,
        }
    }
}

/// Trailing query window accepted by history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Period {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Hour, Period::Day, Period::Week, Period::Month];

    pub fn duration(&self) -> Duration {
        match self {
            Period::Hour => Duration::hours(1),
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Hour => "1h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
        }
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid period '{}'. Must be one of: 1h, 24h, 7d, 30d",
                    s
                ))
            })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Min/max/avg of one metric over a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl MetricStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let (mut min, mut max, mut sum, mut n) = (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize);
        for v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            n += 1;
        }
        (n > 0).then(|| MetricStats {
            min,
            max,
            avg: sum / n as f64,
        })
    }

    /// Assembles stats from nullable SQL aggregate columns.
    pub fn from_columns(min: Option<f64>, max: Option<f64>, avg: Option<f64>) -> Option<Self> {
        match (min, max, avg) {
            (Some(min), Some(max), Some(avg)) => Some(MetricStats { min, max, avg }),
            _ => None,
        }
    }
}

/// Aggregate view over the real snapshots of one district in a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_records: i64,
    pub aqi: Option<MetricStats>,
    pub pm25: Option<MetricStats>,
    pub pm10: Option<MetricStats>,
    pub temperature: Option<MetricStats>,
    pub humidity: Option<MetricStats>,
}

impl HistoryStats {
    pub fn from_snapshots(rows: &[Snapshot]) -> Self {
        Self {
            total_records: rows.len() as i64,
            aqi: MetricStats::from_values(rows.iter().map(|r| r.aqi as f64)),
            pm25: MetricStats::from_values(rows.iter().map(|r| r.pm25)),
            pm10: MetricStats::from_values(rows.iter().map(|r| r.pm10)),
            temperature: MetricStats::from_values(rows.iter().filter_map(|r| r.temperature)),
            humidity: MetricStats::from_values(rows.iter().filter_map(|r| r.humidity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(pm25: f64) -> Reading {
        Reading {
            pollutants: Pollutants {
                pm25,
                pm10: -4.0,
                no2: 20.0,
                so2: f64::NAN,
                co: 300.0,
                o3: 40.0,
            },
            timestamp: Utc::now(),
            source: DataSource::Primary,
            weather: None,
        }
    }

    #[test]
    fn test_new_snapshot_clamps_and_derives_aqi() {
        let snapshot = NewSnapshot::from_reading(2, &reading(35.4));
        assert_eq!(snapshot.district_id(), 2);
        assert_eq!(snapshot.pollutants.pm10, 0.0);
        assert_eq!(snapshot.pollutants.so2, 0.0);
        assert_eq!(snapshot.aqi().value, 100);
        assert_eq!(snapshot.aqi().category, AqiCategory::Moderate);
        assert_eq!(snapshot.weather, WeatherConditions::default());
        assert_eq!(Snapshot::from_new(1, &snapshot).category(), AqiCategory::Moderate);
    }

    #[test]
    fn test_negative_pm25_yields_zero_aqi() {
        let snapshot = NewSnapshot::from_reading(1, &reading(-10.0));
        assert_eq!(snapshot.pollutants.pm25, 0.0);
        assert_eq!(snapshot.aqi().value, 0);
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("1h".parse::<Period>().unwrap(), Period::Hour);
        assert_eq!("24h".parse::<Period>().unwrap(), Period::Day);
        assert_eq!(" 7d ".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Month);
        assert!(matches!("12h".parse::<Period>(), Err(AppError::Validation(_))));
        assert_eq!(Period::Week.duration(), Duration::days(7));
    }

    #[test]
    fn test_stats_from_snapshots() {
        let mut rows: Vec<Snapshot> = [10.0, 20.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, pm25)| {
                Snapshot::from_new(i as i64, &NewSnapshot::from_reading(1, &reading(*pm25)))
            })
            .collect();
        rows[0].temperature = Some(4.0);

        let stats = HistoryStats::from_snapshots(&rows);
        assert_eq!(stats.total_records, 3);
        let pm25 = stats.pm25.unwrap();
        assert_eq!((pm25.min, pm25.max), (10.0, 30.0));
        assert!((pm25.avg - 20.0).abs() < 1e-9);
        assert_eq!(stats.temperature.unwrap().avg, 4.0);
        assert!(stats.humidity.is_none());
    }

    #[test]
    fn test_stats_empty() {
        let stats = HistoryStats::from_snapshots(&[]);
        assert_eq!(stats.total_records, 0);
        assert!(stats.aqi.is_none());
    }
}
