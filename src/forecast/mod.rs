pub mod models;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike, Utc};
use reqwest::{Client, Url};
use tracing::{debug, error, info};

use crate::error::UpstreamError;

use self::models::ForecastResponse;

pub use self::models::{ForecastPoint, ForecastWindow};

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Only points within this many hours of the current hour are scanned.
pub const FORECAST_HORIZON_HOURS: i64 = 24;

pub const FORECAST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ForecastClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
}

/// Location-local forecast points plus the location's current local time.
struct HourlyForecast {
    points: Vec<ForecastPoint>,
    local_now: NaiveDateTime,
}

impl ForecastClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.to_owned(),
            }),
        }
    }

    /// Fetch the hourly forecast and reduce it to the next 24 hours.
    ///
    /// Returns `None` on any network or parse failure; callers skip the
    /// forecast-based part of the evaluation for this cycle.
    pub async fn get_forecast(
        &self,
        latitude: f64,
        longitude: f64,
        freeze_threshold_f: f64,
        heat_threshold_f: f64,
    ) -> Option<ForecastWindow> {
        info!(latitude, longitude, "Checking forecast");
        match self.fetch(latitude, longitude).await {
            Ok(hourly) => {
                let window = summarize(
                    &hourly.points,
                    hourly.local_now,
                    freeze_threshold_f,
                    heat_threshold_f,
                );
                info!(
                    low = ?window.low.map(|p| p.temperature_f),
                    high = ?window.high.map(|p| p.temperature_f),
                    freeze_warning = window.freeze_warning,
                    heat_warning = window.heat_warning,
                    "Forecast summarised"
                );
                Some(window)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to fetch forecast");
                None
            }
        }
    }

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<HourlyForecast> {
        let url = Url::parse_with_params(
            &self.inner.base_url,
            &[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("hourly", "temperature_2m".to_owned()),
                ("temperature_unit", "fahrenheit".to_owned()),
                ("timezone", "auto".to_owned()),
            ],
        )
        .context("invalid forecast URL")?;
        debug!(url = %url, "Requesting forecast");

        // Open-Meteo reports bad parameters as HTTP 400 with a JSON reason,
        // so the body is decoded before the status is checked.
        let resp = self
            .inner
            .http
            .get(url)
            .timeout(FORECAST_TIMEOUT)
            .send()
            .await
            .context("Forecast request failed")?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .context("Failed to read forecast response body")?;

        let parsed = serde_json::from_slice::<ForecastResponse>(&body);
        if let Ok(ForecastResponse { error: true, reason, .. }) = &parsed {
            return Err(UpstreamError::OpenMeteo {
                reason: reason.clone().unwrap_or_else(|| "(no reason)".to_owned()),
            }
            .into());
        }
        if !status.is_success() {
            anyhow::bail!("Forecast endpoint returned error status {status}");
        }
        let parsed = parsed.context("Failed to deserialize forecast response")?;

        let points = parsed.hourly.map(|h| h.points()).unwrap_or_default();
        if points.is_empty() {
            anyhow::bail!("Forecast response contained no hourly data");
        }

        let offset = chrono::Duration::seconds(i64::from(parsed.utc_offset_seconds));
        Ok(HourlyForecast {
            points,
            local_now: Utc::now().naive_utc() + offset,
        })
    }
}

/// Reduce an hourly series to min/max over the 24 hours starting at the hour
/// containing `now`.
///
/// The window is bounded by time, so gaps in the series never pull later
/// hours in. Ties keep the first occurrence. If no point is at or after the
/// current hour, the 24 hours from the first point are used instead.
pub fn summarize(
    points: &[ForecastPoint],
    now: NaiveDateTime,
    freeze_threshold_f: f64,
    heat_threshold_f: f64,
) -> ForecastWindow {
    let hour_start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let start = match points.first() {
        Some(first) if !points.iter().any(|p| p.time >= hour_start) => first.time,
        _ => hour_start,
    };
    let end = start + chrono::Duration::hours(FORECAST_HORIZON_HOURS);
    let window: Vec<ForecastPoint> = points
        .iter()
        .filter(|p| p.time >= start && p.time < end)
        .copied()
        .collect();

    let mut low: Option<ForecastPoint> = None;
    let mut high: Option<ForecastPoint> = None;
    for p in &window {
        if low.map_or(true, |l| p.temperature_f < l.temperature_f) {
            low = Some(*p);
        }
        if high.map_or(true, |h| p.temperature_f > h.temperature_f) {
            high = Some(*p);
        }
    }

    ForecastWindow {
        current_outdoor: window.first().map(|p| p.temperature_f),
        low,
        high,
        freeze_warning: low.is_some_and(|l| l.temperature_f < freeze_threshold_f),
        heat_warning: high.is_some_and(|h| h.temperature_f > heat_threshold_f),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
