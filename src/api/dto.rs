use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::history::{Extreme, HistorySnapshot};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorTemperatureDto {
    /// Friendly sensor name.
    pub name: String,
    /// Degrees Fahrenheit
    pub temperature_f: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtremeDto {
    pub timestamp: DateTime<Utc>,
    /// Degrees Fahrenheit
    pub temperature_f: f64,
}

impl From<Extreme> for ExtremeDto {
    fn from(e: Extreme) -> Self {
        Self {
            timestamp: e.timestamp,
            temperature_f: e.temperature_f,
        }
    }
}

/// Low and high of one sensor over the last 24 hours.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorHistoryDto {
    pub name: String,
    pub low: ExtremeDto,
    pub high: ExtremeDto,
}

impl From<HistorySnapshot> for SensorHistoryDto {
    fn from(s: HistorySnapshot) -> Self {
        Self {
            name: s.sensor_name,
            low: s.low.into(),
            high: s.high.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorNameDto {
    pub name: String,
    /// Gateway channel, e.g. `Channel 7`.
    pub raw_name: String,
}

/// Response for `GET /sensors`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SensorInfoDto {
    /// Configured sensors in display order.
    pub sensors: Vec<SensorNameDto>,
    pub freeze_threshold_f: f64,
    pub heat_threshold_f: f64,
}
