//! `weather-plugin`: current conditions from OpenWeatherMap.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::warn;

use crate::plugin::{ConfigField, FieldType, HookInput, HookKind, Plugin, PluginManifest};

pub const ID: &str = "weather-plugin";
pub const DEFAULT_LOCATION: &str = "Beijing,CN";
const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct OwmResponse {
    pub name: String,
    pub weather: Vec<OwmCondition>,
    pub main: OwmMain,
}

#[derive(Debug, Deserialize)]
pub struct OwmCondition {
    pub main: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct OwmMain {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: f64,
}

pub struct WeatherPlugin {
    manifest: PluginManifest,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl WeatherPlugin {
    pub fn new(api_key: Option<String>) -> Self {
        let manifest = PluginManifest::new(ID, "Weather")
            .with_description("Current weather to help plan outdoor tasks")
            .with_author("tempo")
            .with_hooks(&[HookKind::DataProvider])
            .with_field("apiKey", ConfigField::new(FieldType::String, "Weather API key").required())
            .with_field(
                "location",
                ConfigField::new(FieldType::String, "Default location").with_default(json!(DEFAULT_LOCATION)),
            );
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            manifest,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Point requests at another host (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, api_key: &str, location: &str) -> Result<OwmResponse> {
        let url = format!("{}/data/2.5/weather", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[("q", location), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .context("weather request")?;

        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("weather error: {status} {txt}");
        }

        resp.json().await.context("parse weather response")
    }
}

/// Shape served as plugin data.
pub fn summarize(w: &OwmResponse) -> Result<Value> {
    let condition = w.weather.first().context("weather response has no conditions")?;
    Ok(json!({
        "location": w.name,
        "condition": condition.main,
        "description": condition.description,
        "temperature": w.main.temp,
        "feelsLike": w.main.feels_like,
        "humidity": w.main.humidity,
        "summary": format!(
            "Weather in {} is {}, {}°C, humidity {}%",
            w.name, condition.description, w.main.temp, w.main.humidity
        ),
    }))
}

#[async_trait]
impl Plugin for WeatherPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn initial_config(&self) -> Map<String, Value> {
        let mut config = self.manifest.default_config();
        config.insert("apiKey".into(), json!(self.api_key.clone().unwrap_or_default()));
        config
    }

    async fn call(&self, _hook: HookKind, input: &HookInput) -> Result<Value> {
        let location = input
            .context_str("location")
            .or_else(|| input.config_str("location"))
            .unwrap_or(DEFAULT_LOCATION);

        let result = match input.config_str("apiKey") {
            Some(key) => self.fetch(key, location).await.and_then(|w| summarize(&w)),
            None => Err(anyhow::anyhow!("no apiKey configured")),
        };

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(location, error = %format!("{e:#}"), "weather-plugin: fetch failed");
                Ok(json!({
                    "error": "Unable to fetch weather data",
                    "details": format!("{e:#}"),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OwmResponse {
        serde_json::from_value(json!({
            "name": "Paris",
            "weather": [{"main": "Clouds", "description": "broken clouds", "icon": "04d"}],
            "main": {"temp": 21.0, "feels_like": 20.5, "humidity": 60, "pressure": 1012}
        }))
        .unwrap()
    }

    #[test]
    fn test_summarize_maps_response_fields() {
        let v = summarize(&sample()).unwrap();
        assert_eq!(v["location"], json!("Paris"));
        assert_eq!(v["condition"], json!("Clouds"));
        assert_eq!(v["temperature"], json!(21.0));
        assert_eq!(v["feelsLike"], json!(20.5));
        assert_eq!(v["summary"], json!("Weather in Paris is broken clouds, 21°C, humidity 60%"));
    }

    #[test]
    fn test_summarize_rejects_empty_conditions() {
        let mut w = sample();
        w.weather.clear();
        assert!(summarize(&w).is_err());
    }

    #[test]
    fn test_initial_config_carries_key_and_default_location() {
        let p = WeatherPlugin::new(Some("k".into()));
        let config = p.initial_config();
        assert_eq!(config["apiKey"], json!("k"));
        assert_eq!(config["location"], json!(DEFAULT_LOCATION));
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_as_data() {
        let p = WeatherPlugin::new(None);
        let input = HookInput {
            context: json!({}),
            config: p.initial_config(),
        };
        let v = p.call(HookKind::DataProvider, &input).await.unwrap();
        assert_eq!(v["error"], json!("Unable to fetch weather data"));
        assert!(v["details"].as_str().unwrap().contains("apiKey"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_reported_as_data() {
        let p = WeatherPlugin::new(Some("k".into())).with_base_url("http://127.0.0.1:9/");
        let input = HookInput {
            context: json!({"location": "Paris,FR"}),
            config: p.initial_config(),
        };
        let v = p.call(HookKind::DataProvider, &input).await.unwrap();
        assert_eq!(v["error"], json!("Unable to fetch weather data"));
        assert!(v["details"].as_str().unwrap().starts_with("weather request"));
    }
}
