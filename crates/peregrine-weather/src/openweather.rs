//! OpenWeather HTTP client.
//!
//! Three calls per lookup against the same API root: geocoding
//! (`/geo/1.0/direct`), current conditions (`/data/2.5/weather`), and the
//! free-tier five-day forecast (`/data/2.5/forecast`). Responses are
//! deserialized into the typed observation structs from [`crate::report`]
//! before anything leaves this module.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ForecastProvider, ForecastQuery, WeatherError, WeatherResult};
use crate::report::{self, CurrentConditions, ForecastSlot};

/// Configuration for [`OpenWeatherClient`].
#[derive(Clone, Debug)]
pub struct OpenWeatherConfig {
    /// API root, e.g. `https://api.openweathermap.org`.
    pub base_url: String,
    /// OpenWeather API key.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GeoEntry {
    name: String,
    #[serde(default)]
    country: Option<String>,
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct WireMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: f64,
}

#[derive(Deserialize)]
struct WireCondition {
    description: String,
}

#[derive(Deserialize)]
struct WireWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Deserialize)]
struct WireCurrent {
    main: WireMain,
    weather: Vec<WireCondition>,
    #[serde(default)]
    wind: Option<WireWind>,
}

#[derive(Deserialize)]
struct WireForecast {
    list: Vec<WireForecastSlot>,
}

#[derive(Deserialize)]
struct WireForecastSlot {
    dt: i64,
    main: WireMain,
    weather: Vec<WireCondition>,
    #[serde(default)]
    wind: Option<WireWind>,
    #[serde(default)]
    rain: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<WireCurrent> for CurrentConditions {
    fn from(w: WireCurrent) -> Self {
        Self {
            temp_c: w.main.temp,
            feels_like_c: w.main.feels_like,
            humidity_pct: w.main.humidity,
            wind_mps: w.wind.map_or(0.0, |wind| wind.speed),
            description: w
                .weather
                .into_iter()
                .next()
                .map_or_else(String::new, |c| c.description),
        }
    }
}

impl From<WireForecastSlot> for ForecastSlot {
    fn from(w: WireForecastSlot) -> Self {
        Self {
            at: DateTime::<Utc>::from_timestamp(w.dt, 0).unwrap_or_default(),
            temp_c: w.main.temp,
            humidity_pct: w.main.humidity,
            wind_mps: w.wind.map_or(0.0, |wind| wind.speed),
            description: w
                .weather
                .into_iter()
                .next()
                .map_or_else(String::new, |c| c.description),
            rain: w.rain.is_some_and(|volumes| !volumes.is_empty()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the OpenWeather REST API.
pub struct OpenWeatherClient {
    config: OpenWeatherConfig,
    client: reqwest::Client,
}

impl OpenWeatherClient {
    /// Create a client from configuration.
    pub fn new(config: OpenWeatherConfig) -> WeatherResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// One-shot connectivity probe: geocodes a known city.
    pub async fn test_connection(&self) -> WeatherResult<()> {
        self.geocode("London, GB").await.map(|_| ())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> WeatherResult<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.config.base_url))
            .query(params)
            .query(&[("appid", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn geocode(&self, location: &str) -> WeatherResult<GeoEntry> {
        let entries: Vec<GeoEntry> = self
            .get_json("/geo/1.0/direct", &[("q", location), ("limit", "1")])
            .await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::LocationNotFound {
                location: location.to_owned(),
            })
    }

    async fn current(&self, lat: f64, lon: f64) -> WeatherResult<CurrentConditions> {
        let wire: WireCurrent = self
            .get_json(
                "/data/2.5/weather",
                &[
                    ("lat", lat.to_string().as_str()),
                    ("lon", lon.to_string().as_str()),
                    ("units", "metric"),
                ],
            )
            .await?;
        Ok(wire.into())
    }

    async fn five_day(&self, lat: f64, lon: f64) -> WeatherResult<Vec<ForecastSlot>> {
        let wire: WireForecast = self
            .get_json(
                "/data/2.5/forecast",
                &[
                    ("lat", lat.to_string().as_str()),
                    ("lon", lon.to_string().as_str()),
                    ("units", "metric"),
                ],
            )
            .await?;
        Ok(wire.list.into_iter().map(ForecastSlot::from).collect())
    }
}

#[async_trait::async_trait]
impl ForecastProvider for OpenWeatherClient {
    async fn forecast(&self, query: &ForecastQuery) -> WeatherResult<String> {
        let geo = self.geocode(&query.location).await?;
        let display_name = match &geo.country {
            Some(country) => format!("{}, {country}", geo.name),
            None => geo.name.clone(),
        };
        debug!(
            location = %query.location,
            resolved = %display_name,
            "location geocoded"
        );

        let current = self.current(geo.lat, geo.lon).await?;

        let parsed_range = (
            NaiveDate::parse_from_str(&query.start_date, "%Y-%m-%d"),
            NaiveDate::parse_from_str(&query.end_date, "%Y-%m-%d"),
        );
        let (start, end) = match parsed_range {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                warn!(
                    start = %query.start_date,
                    end = %query.end_date,
                    "unparseable date range, degrading to current conditions"
                );
                return Ok(report::render_current_only(&display_name, &current));
            }
        };

        let slots = self.five_day(geo.lat, geo.lon).await?;
        Ok(report::render_report(
            &display_name,
            start,
            end,
            &current,
            &slots,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> OpenWeatherClient {
        OpenWeatherClient::new(OpenWeatherConfig {
            base_url,
            api_key: "ow-test".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn geo_body() -> serde_json::Value {
        serde_json::json!([{"name": "Barcelona", "country": "ES", "lat": 41.38, "lon": 2.17}])
    }

    fn current_body() -> serde_json::Value {
        serde_json::json!({
            "main": {"temp": 22.5, "feels_like": 23.0, "humidity": 60},
            "weather": [{"description": "few clouds"}],
            "wind": {"speed": 2.5}
        })
    }

    fn forecast_body(dt: i64) -> serde_json::Value {
        serde_json::json!({
            "list": [
                {
                    "dt": dt,
                    "main": {"temp": 20.0, "feels_like": 19.0, "humidity": 65},
                    "weather": [{"description": "light rain"}],
                    "wind": {"speed": 4.0},
                    "rain": {"3h": 0.4}
                },
                {
                    "dt": dt + 10_800,
                    "main": {"temp": 24.0, "feels_like": 24.0, "humidity": 50},
                    "weather": [{"description": "clear sky"}],
                    "wind": {"speed": 3.0}
                }
            ]
        })
    }

    async fn mount_happy_path(server: &MockServer, dt: i64) {
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "Barcelona, Spain"))
            .respond_with(ResponseTemplate::new(200).set_body_json(geo_body()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(dt)))
            .mount(server)
            .await;
    }

    fn query_for(day: &str) -> ForecastQuery {
        ForecastQuery {
            location: "Barcelona, Spain".into(),
            start_date: day.into(),
            end_date: day.into(),
        }
    }

    #[tokio::test]
    async fn full_lookup_renders_report() {
        let server = MockServer::start().await;
        // 2026-09-10 09:00 UTC
        let dt = DateTime::parse_from_rfc3339("2026-09-10T09:00:00Z")
            .unwrap()
            .timestamp();
        mount_happy_path(&server, dt).await;

        let report = client(server.uri())
            .forecast(&query_for("2026-09-10"))
            .await
            .unwrap();

        assert!(report.contains("Weather forecast for Barcelona, ES"));
        assert!(report.contains("Current conditions:"));
        assert!(report.contains("Temperature: 22.5°C"));
        assert!(report.contains("Rain: 50% chance of precipitation"));
        assert!(report.contains("Trip overview:"));
        // raw wire fields never leak
        assert!(!report.contains("feels_like"));
        assert!(!report.contains('{'));
    }

    #[tokio::test]
    async fn unknown_location_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .forecast(&ForecastQuery {
                location: "Atlantis".into(),
                start_date: "2026-09-10".into(),
                end_date: "2026-09-11".into(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, WeatherError::LocationNotFound { location } if location == "Atlantis");
    }

    #[tokio::test]
    async fn api_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .test_connection()
            .await
            .unwrap_err();
        assert_matches!(err, WeatherError::Api { status: 401, .. });
    }

    #[tokio::test]
    async fn bad_dates_degrade_to_current_conditions() {
        let server = MockServer::start().await;
        mount_happy_path(&server, 0).await;

        let report = client(server.uri())
            .forecast(&query_for("next week"))
            .await
            .unwrap();
        assert!(report.contains("current conditions only"));
        assert!(!report.contains("Daily forecast breakdown"));
    }

    #[tokio::test]
    async fn requests_carry_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("appid", "ow-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(geo_body()))
            .expect(1)
            .mount(&server)
            .await;

        client(server.uri()).test_connection().await.unwrap();
    }
}
