//! Provides a synthetic data provider for generating plausible air quality readings.
//!
//! This is the terminal link of the provider chain: it never fails and makes no network
//! calls. Values are derived from the district's traffic, green-space and industrial
//! attributes with a bounded ±20% random jitter, and are tagged `source = "mock"`.

use crate::models::{DataSource, District, Pollutants, Reading, WeatherConditions};
use chrono::{Datelike, Local, Utc};
use rand::{thread_rng, Rng};
use serde::Serialize;
use tracing::debug;

/// Baseline concentrations (µg/m³) before district modifiers.
const BASE_PM25: f64 = 15.0;
const BASE_PM10: f64 = 30.0;
const BASE_NO2: f64 = 40.0;
const BASE_SO2: f64 = 8.0;
const BASE_CO: f64 = 300.0;
const BASE_O3: f64 = 50.0;

/// Bounds of the random multiplier applied to every value.
const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

/// Inclusive `(min, max)` range of each pollutant the generator can produce for a district.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyntheticEnvelope {
    pub pm25: (f64, f64),
    pub pm10: (f64, f64),
    pub no2: (f64, f64),
    pub so2: (f64, f64),
    pub co: (f64, f64),
    pub o3: (f64, f64),
}

impl SyntheticEnvelope {
    pub fn contains(&self, p: &Pollutants) -> bool {
        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        within(p.pm25, self.pm25)
            && within(p.pm10, self.pm10)
            && within(p.no2, self.no2)
            && within(p.so2, self.so2)
            && within(p.co, self.co)
            && within(p.o3, self.o3)
    }
}

/// Per-district multipliers derived from static land-use attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Modifiers {
    /// 1.0 at traffic level 70 or below, rising to 1.3 at 100.
    traffic: f64,
    /// 1.0 at 25% tree coverage or below, falling to 0.7 at 55% and above.
    green: f64,
    /// +5% per industrial zone, capped at five zones.
    industrial: f64,
}

impl Modifiers {
    fn for_district(district: &District) -> Self {
        let traffic = 1.0 + 0.3 * ((district.traffic_level - 70.0) / 30.0).clamp(0.0, 1.0);
        let green = 1.0 - 0.3 * ((district.tree_coverage_percent - 25.0) / 30.0).clamp(0.0, 1.0);
        let industrial = 1.0 + 0.05 * district.industrial_zones.min(5) as f64;
        Self {
            traffic,
            green,
            industrial,
        }
    }

    /// Expected value of each pollutant before jitter.
    fn centers(&self) -> Pollutants {
        Pollutants {
            pm25: BASE_PM25 * self.traffic * self.green,
            pm10: BASE_PM10 * self.traffic * self.green,
            no2: BASE_NO2 * self.traffic * self.green * self.industrial,
            so2: BASE_SO2 * self.industrial,
            co: BASE_CO * self.traffic,
            o3: BASE_O3,
        }
    }
}

/// Generates synthetic readings. Stateless; the random source is the thread-local RNG.
#[derive(Debug, Default, Clone)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }

    /// The documented range of values this provider produces for `district`.
    pub fn envelope(district: &District) -> SyntheticEnvelope {
        let c = Modifiers::for_district(district).centers();
        let range = |v: f64| (v * JITTER_MIN, v * JITTER_MAX);
        SyntheticEnvelope {
            pm25: range(c.pm25),
            pm10: range(c.pm10),
            no2: range(c.no2),
            so2: range(c.so2),
            co: range(c.co),
            o3: range(c.o3),
        }
    }

    /// Produces one reading using the supplied random source.
    pub fn generate_with(&self, district: &District, rng: &mut impl Rng) -> Reading {
        let c = Modifiers::for_district(district).centers();
        let mut jitter = |v: f64| v * rng.gen_range(JITTER_MIN..=JITTER_MAX);

        let pollutants = Pollutants {
            pm25: jitter(c.pm25),
            pm10: jitter(c.pm10),
            no2: jitter(c.no2),
            so2: jitter(c.so2),
            co: jitter(c.co),
            o3: jitter(c.o3),
        };
        let weather = Self::seasonal_weather(Local::now().month(), rng);

        debug!(
            "Generated synthetic reading for {}: pm25={:.1}",
            district.name, pollutants.pm25
        );

        Reading {
            pollutants,
            timestamp: Utc::now(),
            source: DataSource::Mock,
            weather: Some(weather),
        }
    }

    /// Always succeeds.
    pub fn generate(&self, district: &District) -> Reading {
        self.generate_with(district, &mut thread_rng())
    }

    /// Temperature ranges by season (°C) and 50-90% humidity.
    fn seasonal_weather(month: u32, rng: &mut impl Rng) -> WeatherConditions {
        let (low, span) = match month {
            12 | 1 | 2 => (-2.0, 8.0),
            3..=5 => (5.0, 15.0),
            6..=9 => (15.0, 15.0),
            _ => (5.0, 10.0),
        };
        let temperature = low + rng.gen_range(0.0..=span);
        WeatherConditions {
            temperature: Some((temperature * 10.0_f64).round() / 10.0),
            humidity: Some(rng.gen_range(50..=90) as f64),
            pressure: None,
            wind_speed: None,
        }
    }
}
