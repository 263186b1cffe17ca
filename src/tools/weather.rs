//! Client for the weatherapi.com current-conditions endpoint.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const BASE_URL: &str = "http://api.weatherapi.com/v1/current.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Current conditions for the configured city.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub region: String,
    pub temperature_c: f64,
    pub wind_kph: f64,
}

#[derive(Deserialize)]
struct ApiResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Deserialize)]
struct ApiLocation {
    name: String,
}

#[derive(Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    wind_kph: f64,
}

pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    city: String,
}

impl WeatherClient {
    pub fn new(api_key: String, city: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build weather HTTP client")?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            api_key,
            city,
        })
    }

    pub async fn current(&self) -> Result<WeatherReport> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", self.city.as_str()),
                ("aqi", "no"),
            ])
            .send()
            .await
            .context("Weather request failed")?
            .error_for_status()
            .context("Weather service returned an error status")?;

        let body: ApiResponse = resp
            .json()
            .await
            .context("Failed to parse weather response")?;

        debug!(region = %body.location.name, temp_c = body.current.temp_c, "weather fetched");
        Ok(WeatherReport {
            region: body.location.name,
            temperature_c: body.current.temp_c,
            wind_kph: body.current.wind_kph,
        })
    }
}
