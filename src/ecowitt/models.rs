use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::UpstreamError,
    sensors::Channel,
    units::{to_fahrenheit, TemperatureUnit},
};

// ---------------------------------------------------------------------------
// RawValue
//
// Both the gateway and the cloud API send numbers as JSON strings most of the
// time ("21.4"), but numeric literals have been observed too. The untagged
// enum accepts either; `Number` must come first so real numbers don't get
// routed through string parsing.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => Some(*v),
            RawValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Convert a raw value + optional unit label into Fahrenheit.
fn fahrenheit(value: &RawValue, unit: Option<&str>) -> anyhow::Result<f64> {
    let v = value
        .as_f64()
        .with_context(|| format!("temperature value is not numeric: {value:?}"))?;
    Ok(to_fahrenheit(v, TemperatureUnit::from_label(unit)?))
}

// ---------------------------------------------------------------------------
// LAN gateway : GET http://<gateway>/get_livedata_info
//
//   {
//     "common_list": [ { "id": "0x02", "val": "45.3", "unit": "F" }, ... ],
//     "wh25":        [ { "intemp": "70.2", "unit": "F", "inhumi": "40%" } ],
//     "ch_aisle":    [ { "channel": "1", "name": "", "temp": "20.1", "unit": "C" } ]
//   }
// ---------------------------------------------------------------------------

/// `common_list` id carrying the outdoor temperature.
pub const OUTDOOR_TEMP_ID: &str = "0x02";

#[derive(Debug, Deserialize)]
pub struct LiveData {
    #[serde(default)]
    pub common_list: Vec<CommonItem>,
    #[serde(default)]
    pub wh25: Vec<IndoorItem>,
    #[serde(default)]
    pub ch_aisle: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
pub struct CommonItem {
    pub id: String,
    pub val: Option<RawValue>,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndoorItem {
    pub intemp: Option<RawValue>,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelItem {
    pub channel: RawValue,
    pub temp: Option<RawValue>,
    pub unit: Option<String>,
}

impl LiveData {
    /// Every temperature present in the payload, normalised to Fahrenheit.
    ///
    /// Channels absent from the payload are simply missing from the result;
    /// entries that cannot be parsed are logged and skipped.
    pub fn temperatures(&self) -> Vec<(Channel, f64)> {
        let mut out = Vec::new();

        for item in &self.wh25 {
            if let Some(v) = &item.intemp {
                push_converted(&mut out, Channel::Indoor, v, item.unit.as_deref());
            }
        }

        for item in self.common_list.iter().filter(|i| i.id == OUTDOOR_TEMP_ID) {
            if let Some(v) = &item.val {
                push_converted(&mut out, Channel::Outdoor, v, item.unit.as_deref());
            }
        }

        for item in &self.ch_aisle {
            let Some(temp) = &item.temp else { continue };
            let channel = item
                .channel
                .as_f64()
                .filter(|n| n.fract() == 0.0)
                .and_then(|n| Channel::aux(n as u8));
            match channel {
                Some(channel) => push_converted(&mut out, channel, temp, item.unit.as_deref()),
                None => warn!(channel = ?item.channel, "Ignoring gateway channel with unusable number"),
            }
        }

        out
    }
}

fn push_converted(out: &mut Vec<(Channel, f64)>, channel: Channel, value: &RawValue, unit: Option<&str>) {
    match fahrenheit(value, unit) {
        Ok(f) => out.push((channel, f)),
        Err(e) => warn!(channel = %channel, error = %e, "Skipping unreadable temperature"),
    }
}

// ---------------------------------------------------------------------------
// Cloud envelope
//
// Success:  { "code": 0, "msg": "success", "time": "1700000000", "data": {...} }
// Failure:  { "code": 40010, "msg": "Illegal Application_Key Parameter", "data": [] }
//
// `data` is an object on success but has been seen as an empty array when
// the device has nothing to report, so it is kept as a raw JSON value.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EcowittResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EcowittResponse {
    /// Map `code != 0` to [`UpstreamError::Ecowitt`] and return the `data` object.
    pub fn into_result(self) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
        if self.code != 0 {
            return Err(UpstreamError::Ecowitt {
                code: self.code,
                msg: self.msg,
            }
            .into());
        }
        match self.data {
            serde_json::Value::Object(map) => Ok(map),
            serde_json::Value::Array(a) if a.is_empty() => Ok(Default::default()),
            serde_json::Value::Null => Ok(Default::default()),
            other => Err(anyhow!("Ecowitt response: unexpected data shape: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud real-time : GET device/real_time?call_back=all
//
//   "indoor":               { "temperature": { "time": "...", "unit": "℉", "value": "70.2" } }
//   "outdoor":              { "temperature": { ... } }
//   "temp_and_humidity_ch1": { "temperature": { ... }, "humidity": { ... } }
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SensorBlock {
    pub temperature: Option<TemperatureValue>,
}

#[derive(Debug, Deserialize)]
pub struct TemperatureValue {
    pub value: RawValue,
    pub unit: Option<String>,
}

/// Extract all channel temperatures from a real-time `data` object.
pub fn realtime_temperatures(data: &serde_json::Map<String, serde_json::Value>) -> Vec<(Channel, f64)> {
    let mut out = Vec::new();
    for channel in Channel::all() {
        let Some(raw) = channel.cloud_realtime_keys().iter().find_map(|k| data.get(k.as_str())) else {
            continue;
        };
        let block: SensorBlock = match serde_json::from_value(raw.clone()) {
            Ok(b) => b,
            Err(e) => {
                warn!(channel = %channel, error = %e, "Skipping malformed cloud sensor block");
                continue;
            }
        };
        if let Some(t) = block.temperature {
            push_converted(&mut out, channel, &t.value, t.unit.as_deref());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Cloud history : GET device/history?call_back=<sensor type>
//
//   "indoor": { "temperature": { "unit": "℉", "list": { "1700000000": "70.2", ... } } }
//
// Depending on the sensor type the block sits under the call_back key or
// directly at the root of `data`.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryBlock {
    pub temperature: Option<HistorySeries>,
}

#[derive(Debug, Deserialize)]
pub struct HistorySeries {
    pub unit: Option<String>,
    #[serde(default)]
    pub list: HashMap<String, RawValue>,
}

impl HistorySeries {
    /// Points converted to Fahrenheit, sorted by timestamp. Unparseable
    /// entries are dropped.
    pub fn points(&self) -> Vec<(DateTime<Utc>, f64)> {
        let mut points: Vec<_> = self
            .list
            .iter()
            .filter_map(|(ts, value)| {
                let secs: i64 = ts.trim().parse().ok()?;
                let at = DateTime::from_timestamp(secs, 0)?;
                let f = fahrenheit(value, self.unit.as_deref()).ok()?;
                Some((at, f))
            })
            .collect();
        points.sort_by_key(|(at, _)| *at);
        points
    }
}

/// Extract the history series for `key` from a history `data` object.
pub fn history_series(
    data: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> anyhow::Result<Option<HistorySeries>> {
    let raw = match data.get(key) {
        Some(nested) => nested.clone(),
        None => serde_json::Value::Object(data.clone()),
    };
    let block: HistoryBlock =
        serde_json::from_value(raw).context("Failed to deserialize Ecowitt history block")?;
    Ok(block.temperature)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
