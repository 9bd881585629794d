//! Provides clients and utilities for obtaining air quality readings.
//!
//! Includes:
//! - `openweather`: Primary provider (discrete 1-5 index plus components) and weather enrichment.
//! - `waqi`: Secondary provider (continuous index plus components).
//! - `synthetic`: Always-succeeding generator driven by district land-use attributes.
//! - `chain`: Ordered fallback across the above with per-call timeouts.

mod chain;
mod openweather;
mod synthetic;
mod waqi;

pub use chain::*;
pub use openweather::*;
pub use synthetic::*;
pub use waqi::*;

use crate::models::{District, Reading};
use async_trait::async_trait;
use thiserror::Error;

/// Per-call failure of one provider. Absorbed by [`ProviderChain`].
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("credentials not configured")]
    MissingCredentials,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A source of one reading per district.
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, district: &District) -> Result<Reading, ProviderError>;
}
