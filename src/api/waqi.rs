//! Client for the World Air Quality Index (WAQI) geo feed.

use super::{AirQualityProvider, ProviderError};
use crate::aqi::{concentration_for_index, pm10_for_index};
use crate::models::{DataSource, District, Pollutants, Reading, WaqiFeed, WaqiResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Secondary air quality provider.
///
/// The feed reports a continuous index plus per-pollutant EPA sub-indices (`iaqi.*.v`), not
/// concentrations. PM2.5 and PM10 are converted back through their breakpoint tables; the gas
/// sub-indices have no concentration counterpart here and are stored as 0.
pub struct WaqiClient {
    client: Client,
    token: Option<String>,
    base_url: String,
}

impl WaqiClient {
    pub fn new(token: Option<String>, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn parse_feed(district: &District, response: WaqiResponse) -> Result<Reading, ProviderError> {
        if response.status != "ok" {
            return Err(ProviderError::InvalidPayload(format!(
                "status '{}': {}",
                response.status, response.data
            )));
        }
        let feed: WaqiFeed = serde_json::from_value(response.data)
            .map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;

        let index = feed.aqi.as_f64();
        let c = &feed.iaqi;
        let pm25 = match (c.pm25.as_ref(), index) {
            (Some(sub), _) => concentration_for_index(sub.v),
            (None, Some(index)) => {
                let recovered = concentration_for_index(index);
                debug!(
                    "No pm25 sub-index for {}, recovered {:.1} from index {}",
                    district.name, recovered, index
                );
                recovered
            },
            (None, None) => {
                return Err(ProviderError::InvalidPayload(format!(
                    "no usable index ({}) and no pm25 component",
                    feed.aqi
                )))
            },
        };
        let pm10 = c.pm10.as_ref().map(|sub| pm10_for_index(sub.v)).unwrap_or(0.0);
        let timestamp = feed
            .time
            .and_then(|t| t.iso)
            .and_then(|iso| DateTime::parse_from_rfc3339(&iso).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Reading {
            pollutants: Pollutants {
                pm25,
                pm10,
                ..Pollutants::default()
            }
            .clamped(),
            timestamp,
            source: DataSource::Secondary,
            weather: None,
        })
    }
}

#[async_trait]
impl AirQualityProvider for WaqiClient {
    fn name(&self) -> &'static str {
        "waqi"
    }

    async fn fetch(&self, district: &District) -> Result<Reading, ProviderError> {
        let token = self.token.as_deref().ok_or(ProviderError::MissingCredentials)?;
        let url = format!(
            "{}/feed/geo:{};{}/",
            self.base_url, district.latitude, district.longitude
        );

        let response = self
            .client
            .get(&url)
            .query(&[("token", token)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        let parsed: WaqiResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::InvalidPayload(e.to_string()))?;

        Self::parse_feed(district, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::{aqi_from_pm25, AqiCategory};
    use crate::models::{lviv_districts, NewSnapshot};
    use mockito::Matcher;
    use serde_json::json;

    fn feed_path(district: &District) -> String {
        format!("/feed/geo:{};{}/", district.latitude, district.longitude)
    }

    #[tokio::test]
    async fn test_fetch_with_components() {
        let mut server = mockito::Server::new_async().await;
        let district = lviv_districts().remove(2);
        let _m = server
            .mock("GET", feed_path(&district).as_str())
            .match_query(Matcher::UrlEncoded("token".into(), "tok".into()))
            .with_status(200)
            .with_body(
                json!({"status": "ok", "data": {
                    "aqi": 57,
                    "iaqi": {"pm25": {"v": 57}, "pm10": {"v": 75}, "o3": {"v": 30.5}},
                    "time": {"iso": "2024-03-10T12:00:00+02:00"}
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let client = WaqiClient::new(Some("tok".into()), &server.url(), Duration::from_secs(5));
        let reading = client.fetch(&district).await.unwrap();
        assert_eq!(reading.source, DataSource::Secondary);
        assert_eq!(aqi_from_pm25(reading.pollutants.pm25).value, 57);
        assert!((reading.pollutants.pm10 - 104.0).abs() < 1e-9);
        assert_eq!(reading.pollutants.o3, 0.0);
        assert_eq!(reading.pollutants.so2, 0.0);
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-03-10T10:00:00+00:00");
    }

    #[test]
    fn test_pm25_recovered_from_index() {
        let district = lviv_districts().remove(0);
        let response = WaqiResponse {
            status: "ok".to_string(),
            data: json!({"aqi": 100, "iaqi": {}}),
        };
        let reading = WaqiClient::parse_feed(&district, response).unwrap();
        assert!((reading.pollutants.pm25 - 35.4).abs() < 1e-9);
        assert_eq!(aqi_from_pm25(reading.pollutants.pm25).value, 100);
    }

    #[test]
    fn test_pm25_sub_index_keeps_reported_aqi() {
        let district = lviv_districts().remove(0);
        let response = WaqiResponse {
            status: "ok".to_string(),
            data: json!({"aqi": 57, "iaqi": {"pm25": {"v": 57}}}),
        };
        let reading = WaqiClient::parse_feed(&district, response).unwrap();
        let snapshot = NewSnapshot::from_reading(district.id, &reading);
        assert_eq!(snapshot.aqi().value, 57);
        assert_eq!(snapshot.aqi().category, AqiCategory::Moderate);
    }

    #[test]
    fn test_error_status_and_unusable_index() {
        let district = lviv_districts().remove(0);
        let error = WaqiResponse {
            status: "error".to_string(),
            data: json!("Invalid key"),
        };
        assert!(matches!(
            WaqiClient::parse_feed(&district, error),
            Err(ProviderError::InvalidPayload(_))
        ));

        let dash = WaqiResponse {
            status: "ok".to_string(),
            data: json!({"aqi": "-", "iaqi": {}}),
        };
        assert!(matches!(
            WaqiClient::parse_feed(&district, dash),
            Err(ProviderError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = WaqiClient::new(None, "http://127.0.0.1:1", Duration::from_secs(5));
        let result = client.fetch(&lviv_districts()[0]).await;
        assert!(matches!(result, Err(ProviderError::MissingCredentials)));
    }
}
