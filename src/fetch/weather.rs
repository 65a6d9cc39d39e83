use reqwest::{Client, Response};
use tracing::info;
use url::Url;

use super::ensure_success;
use crate::config::{DateWindow, WeatherConfig};
use crate::error::{PipelineError, Result};

/// Object name for one window of hourly observations.
pub fn weather_filename(window: &DateWindow) -> String {
    format!(
        "weather_{}_{}.json",
        window.start.format("%Y%m%d"),
        window.end.format("%Y%m%d")
    )
}

/// Request hourly point observations for `window`. The response body is
/// left unread so the caller can stream it onward.
pub async fn fetch_hourly(client: &Client, cfg: &WeatherConfig, window: &DateWindow) -> Result<Response> {
    let api_key = cfg.api_key.as_deref().ok_or_else(|| {
        PipelineError::Configuration("weather API key missing (set METEO_API_KEY)".into())
    })?;
    let endpoint = Url::parse(&cfg.endpoint)
        .map_err(|e| PipelineError::Configuration(format!("weather endpoint: {}", e)))?;

    let start = window.start.format("%Y-%m-%d").to_string();
    let end = window.end.format("%Y-%m-%d").to_string();
    info!(%start, %end, "requesting hourly weather");

    let resp = client
        .get(endpoint.clone())
        .header("x-rapidapi-key", api_key)
        .header("x-rapidapi-host", &cfg.api_host)
        .query(&[
            ("lat", cfg.lat.as_str()),
            ("lon", cfg.lon.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("tz", cfg.tz.as_str()),
        ])
        .send()
        .await;
    ensure_success(&endpoint, resp)
}
