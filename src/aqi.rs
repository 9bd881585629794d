//! US EPA air quality index computed from PM2.5 concentration (µg/m³).
//!
//! The index is a piecewise-linear interpolation over six concentration bands. Bands are
//! contiguous (each starts where the previous one ends), so the result is monotonically
//! non-decreasing in the concentration. The last band keeps its slope past its nominal
//! ceiling and the result is capped at 500.

use serde::{Deserialize, Serialize};

/// Upper bound of the index scale.
pub const AQI_MAX: i32 = 500;

/// `(c_low, c_high, i_low, i_high)` for each band.
const PM25_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 12.0, 0.0, 50.0),
    (12.0, 35.4, 50.0, 100.0),
    (35.4, 55.4, 100.0, 150.0),
    (55.4, 150.4, 150.0, 200.0),
    (150.4, 250.4, 200.0, 300.0),
    (250.4, 500.4, 300.0, 500.0),
];

/// PM10 bands, same layout as [`PM25_BREAKPOINTS`].
const PM10_BREAKPOINTS: [(f64, f64, f64, f64); 6] = [
    (0.0, 54.0, 0.0, 50.0),
    (54.0, 154.0, 50.0, 100.0),
    (154.0, 254.0, 100.0, 150.0),
    (254.0, 354.0, 150.0, 200.0),
    (354.0, 424.0, 200.0, 300.0),
    (424.0, 604.0, 300.0, 500.0),
];

/// Health category derived from an index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthySensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Maps an index value onto its category using the same six thresholds as the bands.
    pub fn from_index(aqi: i32) -> Self {
        match aqi {
            i32::MIN..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthySensitive,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    /// Human-readable label, as stored in the `aqi_status` column.
    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthySensitive => "Unhealthy for Sensitive",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Display colour for UI consumers.
    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::Good => "#10b981",
            AqiCategory::Moderate => "#f59e0b",
            AqiCategory::UnhealthySensitive => "#f97316",
            AqiCategory::Unhealthy => "#ef4444",
            AqiCategory::VeryUnhealthy => "#9333ea",
            AqiCategory::Hazardous => "#7f1d1d",
        }
    }

    /// Parses a stored label back into a category.
    pub fn from_label(label: &str) -> Option<Self> {
        [
            AqiCategory::Good,
            AqiCategory::Moderate,
            AqiCategory::UnhealthySensitive,
            AqiCategory::Unhealthy,
            AqiCategory::VeryUnhealthy,
            AqiCategory::Hazardous,
        ]
        .into_iter()
        .find(|c| c.label() == label)
    }
}

/// An index value together with its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aqi {
    pub value: i32,
    pub category: AqiCategory,
}

/// Computes the index for a PM2.5 concentration.
///
/// Total over `f64`: negative and NaN inputs are treated as 0.
pub fn aqi_from_pm25(pm25: f64) -> Aqi {
    let c = if pm25.is_nan() { 0.0 } else { pm25.max(0.0) };

    let (c_low, c_high, i_low, i_high) = PM25_BREAKPOINTS
        .iter()
        .copied()
        .find(|(_, c_high, _, _)| c <= *c_high)
        .unwrap_or(PM25_BREAKPOINTS[PM25_BREAKPOINTS.len() - 1]);

    let raw = (i_high - i_low) / (c_high - c_low) * (c - c_low) + i_low;
    let value = (raw.round() as i32).clamp(0, AQI_MAX);

    Aqi {
        value,
        category: AqiCategory::from_index(value),
    }
}

fn invert(breakpoints: &[(f64, f64, f64, f64); 6], aqi: f64) -> f64 {
    let i = if aqi.is_nan() {
        0.0
    } else {
        aqi.clamp(0.0, AQI_MAX as f64)
    };

    let (c_low, c_high, i_low, i_high) = breakpoints
        .iter()
        .copied()
        .find(|(_, _, _, i_high)| i <= *i_high)
        .unwrap_or(breakpoints[breakpoints.len() - 1]);

    (c_high - c_low) / (i_high - i_low) * (i - i_low) + c_low
}

/// Inverse of [`aqi_from_pm25`]: the PM2.5 concentration at which the given index is reached.
///
/// Used to recover a concentration when a provider only reports an index.
pub fn concentration_for_index(aqi: f64) -> f64 {
    invert(&PM25_BREAKPOINTS, aqi)
}

/// PM10 concentration (µg/m³) at which the PM10 sub-index reaches `aqi`.
pub fn pm10_for_index(aqi: f64) -> f64 {
    invert(&PM10_BREAKPOINTS, aqi)
}
