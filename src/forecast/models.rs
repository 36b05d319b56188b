use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Open-Meteo wire types : GET /v1/forecast?hourly=temperature_2m&...
//
// Success:
//   { "utc_offset_seconds": -18000,
//     "hourly": { "time": ["2026-01-10T00:00", ...], "temperature_2m": [31.4, ...] } }
//
// Failure (HTTP 400):
//   { "error": true, "reason": "Latitude must be in range of -90 to 90°." }
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub error: bool,
    pub reason: Option<String>,
    #[serde(default)]
    pub utc_offset_seconds: i32,
    pub hourly: Option<Hourly>,
}

#[derive(Debug, Deserialize)]
pub struct Hourly {
    #[serde(default)]
    pub time: Vec<String>,
    /// Parallel to `time`; gaps come back as `null`.
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
}

/// Open-Meteo's `iso8601` time format without seconds or offset.
pub const FORECAST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

impl Hourly {
    /// Zip the parallel arrays, dropping points with a null temperature or an
    /// unparseable timestamp.
    pub fn points(&self) -> Vec<ForecastPoint> {
        self.time
            .iter()
            .zip(&self.temperature_2m)
            .filter_map(|(t, temp)| {
                let time = NaiveDateTime::parse_from_str(t, FORECAST_TIME_FORMAT).ok()?;
                Some(ForecastPoint {
                    time,
                    temperature_f: (*temp)?,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// One hourly forecast value, in the forecast location's local time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ForecastPoint {
    #[schema(value_type = String, example = "2026-01-10T03:00:00")]
    pub time: NaiveDateTime,
    pub temperature_f: f64,
}

/// Next-24h summary of the hourly forecast. Built fresh on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastWindow {
    pub current_outdoor: Option<f64>,
    pub low: Option<ForecastPoint>,
    pub high: Option<ForecastPoint>,
    pub freeze_warning: bool,
    pub heat_warning: bool,
}
