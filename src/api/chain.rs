//! Ordered provider fallback.
//!
//! Each network link is tried in turn under a bounded timeout; the first success wins. Any
//! error (timeout, non-2xx, malformed payload, missing credentials) advances to the next
//! link. The synthetic provider terminates the chain, so [`ProviderChain::fetch`] is
//! infallible.

use super::{AirQualityProvider, OpenWeatherClient, ProviderError, SyntheticProvider, WaqiClient};
use crate::config::Config;
use crate::models::{District, Reading};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ProviderChain {
    links: Vec<Arc<dyn AirQualityProvider>>,
    fallback: SyntheticProvider,
    weather: Option<Arc<OpenWeatherClient>>,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(links: Vec<Arc<dyn AirQualityProvider>>, timeout: Duration) -> Self {
        Self {
            links,
            fallback: SyntheticProvider::new(),
            weather: None,
            timeout,
        }
    }

    /// OpenWeather → WAQI → synthetic, with OpenWeather weather enrichment.
    pub fn from_config(config: &Config) -> Self {
        let primary = Arc::new(OpenWeatherClient::new(
            config.openweather_api_key.clone(),
            &config.primary_base_url,
            config.provider_timeout,
        ));
        let secondary = Arc::new(WaqiClient::new(
            config.waqi_token.clone(),
            &config.secondary_base_url,
            config.provider_timeout,
        ));
        Self::new(
            vec![primary.clone() as Arc<dyn AirQualityProvider>, secondary],
            config.provider_timeout,
        )
        .with_weather(primary)
    }

    /// Enables best-effort weather enrichment for readings from network providers.
    pub fn with_weather(mut self, weather: Arc<OpenWeatherClient>) -> Self {
        self.weather = Some(weather);
        self
    }

    /// Returns one reading for the district. Never fails.
    pub async fn fetch(&self, district: &District) -> Reading {
        for link in &self.links {
            let attempt = match tokio::time::timeout(self.timeout, link.fetch(district)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };
            match attempt {
                Ok(mut reading) => {
                    info!(
                        "{}: reading from {} (pm25={:.1})",
                        district.name,
                        link.name(),
                        reading.pollutants.pm25
                    );
                    if reading.weather.is_none() {
                        reading.weather = self.enrich(district).await;
                    }
                    return reading;
                },
                Err(e) => {
                    warn!("{}: provider {} failed: {}", district.name, link.name(), e);
                },
            }
        }

        info!("{}: all providers failed, using synthetic data", district.name);
        self.fallback.generate(district)
    }

    async fn enrich(&self, district: &District) -> Option<crate::models::WeatherConditions> {
        let weather = self.weather.as_ref()?;
        match tokio::time::timeout(self.timeout, weather.fetch_weather(district)).await {
            Ok(Ok(conditions)) => Some(conditions),
            Ok(Err(e)) => {
                debug!("{}: weather enrichment failed: {}", district.name, e);
                None
            },
            Err(_) => {
                debug!("{}: weather enrichment timed out", district.name);
                None
            },
        }
    }
}
