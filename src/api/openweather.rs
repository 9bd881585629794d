//! Client for the OpenWeather air pollution and current weather APIs.

use super::{AirQualityProvider, ProviderError};
use crate::models::{
    DataSource, District, OpenWeatherAirResponse, OpenWeatherCurrentResponse, Pollutants,
    Reading, WeatherConditions,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Representative PM2.5 concentration (µg/m³) for each OpenWeather 1-5 category.
const CATEGORY_PM25_MIDPOINTS: [f64; 5] = [5.0, 17.5, 37.5, 62.5, 100.0];

/// Maps the coarse OpenWeather category onto a PM2.5 midpoint.
pub fn pm25_for_category(category: u8) -> Option<f64> {
    match category {
        1..=5 => Some(CATEGORY_PM25_MIDPOINTS[(category - 1) as usize]),
        _ => None,
    }
}

/// Asynchronous client for OpenWeather. Serves as the primary air quality provider and as
/// the source of weather enrichment.
pub struct OpenWeatherClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: Option<String>, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        district: &District,
        extra: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials)?;
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", district.latitude.to_string()),
                ("lon", district.longitude.to_string()),
                ("appid", api_key.to_string()),
            ])
            .query(extra)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                error!("OpenWeather rejected the API key (401). Check OPENWEATHER_API_KEY.");
            }
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidPayload(e.to_string()))
    }

    /// Fetches current weather for the district, in metric units.
    pub async fn fetch_weather(
        &self,
        district: &District,
    ) -> Result<WeatherConditions, ProviderError> {
        let current: OpenWeatherCurrentResponse = self
            .get("weather", district, &[("units", "metric")])
            .await?;
        Ok(WeatherConditions {
            temperature: Some((current.main.temp * 10.0).round() / 10.0),
            humidity: Some(current.main.humidity),
            pressure: Some(current.main.pressure),
            wind_speed: current.wind.map(|w| w.speed),
        })
    }
}

#[async_trait]
impl AirQualityProvider for OpenWeatherClient {
    fn name(&self) -> &'static str {
        "openweather"
    }

    async fn fetch(&self, district: &District) -> Result<Reading, ProviderError> {
        let response: OpenWeatherAirResponse = self.get("air_pollution", district, &[]).await?;
        let entry = response
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidPayload("empty list".to_string()))?;

        let c = &entry.components;
        let pm25 = match c.pm2_5 {
            Some(v) => v,
            None => {
                let midpoint = pm25_for_category(entry.main.aqi).ok_or_else(|| {
                    ProviderError::InvalidPayload(format!(
                        "aqi category {} out of range",
                        entry.main.aqi
                    ))
                })?;
                debug!(
                    "No pm2_5 component for {}, using category {} midpoint {}",
                    district.name, entry.main.aqi, midpoint
                );
                midpoint
            },
        };
        let timestamp = DateTime::<Utc>::from_timestamp(entry.dt, 0).unwrap_or_else(Utc::now);

        Ok(Reading {
            pollutants: Pollutants {
                pm25,
                pm10: c.pm10.unwrap_or(0.0),
                no2: c.no2.unwrap_or(0.0),
                so2: c.so2.unwrap_or(0.0),
                co: c.co.unwrap_or(0.0),
                o3: c.o3.unwrap_or(0.0),
            }
            .clamped(),
            timestamp,
            source: DataSource::Primary,
            weather: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lviv_districts;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server, key: Option<&str>) -> OpenWeatherClient {
        OpenWeatherClient::new(key.map(str::to_string), &server.url(), Duration::from_secs(5))
    }

    #[test]
    fn test_category_midpoints() {
        assert_eq!(pm25_for_category(1), Some(5.0));
        assert_eq!(pm25_for_category(3), Some(37.5));
        assert_eq!(pm25_for_category(5), Some(100.0));
        assert_eq!(pm25_for_category(0), None);
        assert_eq!(pm25_for_category(6), None);
    }

    #[tokio::test]
    async fn test_fetch_uses_components() {
        let mut server = mockito::Server::new_async().await;
        let district = lviv_districts().remove(0);
        let _m = server
            .mock("GET", "/air_pollution")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lat".into(), district.latitude.to_string()),
                Matcher::UrlEncoded("lon".into(), district.longitude.to_string()),
                Matcher::UrlEncoded("appid".into(), "key".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"list": [{
                    "main": {"aqi": 2},
                    "components": {
                        "pm2_5": 14.2, "pm10": 20.0, "no2": 9.1, "so2": 1.2,
                        "co": 230.0, "o3": 61.0, "nh3": 0.4
                    },
                    "dt": 1_700_000_000
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let reading = client(&server, Some("key")).fetch(&district).await.unwrap();
        assert_eq!(reading.source, DataSource::Primary);
        assert_eq!(reading.pollutants.pm25, 14.2);
        assert_eq!(reading.pollutants.o3, 61.0);
        assert_eq!(reading.timestamp.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_fetch_maps_category_when_pm25_missing() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"list": [{
                    "main": {"aqi": 4},
                    "components": {"pm10": 40.0},
                    "dt": 1_700_000_000
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let reading = client(&server, Some("key"))
            .fetch(&lviv_districts()[1])
            .await
            .unwrap();
        assert_eq!(reading.pollutants.pm25, 62.5);
        assert_eq!(reading.pollutants.no2, 0.0);
    }

    #[tokio::test]
    async fn test_fetch_errors() {
        let mut server = mockito::Server::new_async().await;
        let district = lviv_districts().remove(0);

        let missing = client(&server, None).fetch(&district).await;
        assert!(matches!(missing, Err(ProviderError::MissingCredentials)));

        let m = server
            .mock("GET", "/air_pollution")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"cod":401}"#)
            .create_async()
            .await;
        let unauthorized = client(&server, Some("bad")).fetch(&district).await;
        assert!(matches!(unauthorized, Err(ProviderError::Status(401))));
        m.remove_async().await;

        let _m = server
            .mock("GET", "/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"list": []}"#)
            .create_async()
            .await;
        let empty = client(&server, Some("key")).fetch(&district).await;
        assert!(matches!(empty, Err(ProviderError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_fetch_weather() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/weather")
            .match_query(Matcher::UrlEncoded("units".into(), "metric".into()))
            .with_status(200)
            .with_body(
                json!({
                    "main": {"temp": 12.34, "humidity": 71, "pressure": 1013},
                    "wind": {"speed": 3.5}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let weather = client(&server, Some("key"))
            .fetch_weather(&lviv_districts()[0])
            .await
            .unwrap();
        assert_eq!(weather.temperature, Some(12.3));
        assert_eq!(weather.humidity, Some(71.0));
        assert_eq!(weather.pressure, Some(1013.0));
        assert_eq!(weather.wind_speed, Some(3.5));
    }
}
