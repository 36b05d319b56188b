use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;

use crate::{
    alerts::DEFAULT_NTFY_URL,
    control::SlotTimes,
    discovery::GATEWAY_PORT,
    forecast::DEFAULT_FORECAST_URL,
    sensors::SensorNames,
};

pub const DEFAULT_ECOWITT_API_BASE: &str = "https://api.ecowitt.net/api/v3";

// ---------------------------------------------------------------------------
// SensorSourceKind
// ---------------------------------------------------------------------------

/// Where current readings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSourceKind {
    Lan,
    Cloud,
}

impl FromStr for SensorSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lan" => Ok(Self::Lan),
            "cloud" => Ok(Self::Cloud),
            other => Err(anyhow::anyhow!("unknown sensor source: {other:?}")),
        }
    }
}

/// Ecowitt cloud account credentials, sent as query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudCredentials {
    pub application_key: String,
    pub api_key: String,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Lan {
        /// Skips discovery when set.
        gateway: Option<SocketAddr>,
        failure_limit: u32,
    },
    Cloud {
        api_base: String,
        credentials: CloudCredentials,
    },
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub latitude: f64,
    pub longitude: f64,
    pub freeze_threshold_f: f64,
    pub heat_threshold_f: f64,
    pub ntfy_topic: String,
    pub ntfy_base_url: String,
    /// Format: `"Indoor:Living Room,Channel 7:Basement"`. Order is display order.
    pub sensor_names: SensorNames,
    pub source: SourceConfig,
    pub forecast_base_url: String,
    pub slots: SlotTimes,
    /// History polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Scheduler tick in seconds.
    pub tick_interval_secs: u64,
    pub trigger_port: u16,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("missing required env var: {key}"))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_owned())
        };

        let source = match optional("SENSOR_SOURCE", "lan")
            .parse::<SensorSourceKind>()
            .context("SENSOR_SOURCE must be 'lan' or 'cloud'")?
        {
            SensorSourceKind::Lan => SourceConfig::Lan {
                gateway: lookup("GATEWAY_IP")
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| parse_gateway_addr(&v))
                    .transpose()?,
                failure_limit: optional("GATEWAY_FAILURE_LIMIT", "3")
                    .parse()
                    .context("GATEWAY_FAILURE_LIMIT must be a positive integer")?,
            },
            SensorSourceKind::Cloud => SourceConfig::Cloud {
                api_base: optional("ECOWITT_API_BASE", DEFAULT_ECOWITT_API_BASE),
                credentials: CloudCredentials {
                    application_key: required("ECOWITT_APPLICATION_KEY")?,
                    api_key: required("ECOWITT_API_KEY")?,
                    mac: required("ECOWITT_MAC")?,
                },
            },
        };

        let slots = SlotTimes {
            morning: parse_slot_time(&optional("MORNING_SLOT", "09:40"))
                .context("MORNING_SLOT must be HH:MM")?,
            evening: parse_slot_time(&optional("EVENING_SLOT", "20:15"))
                .context("EVENING_SLOT must be HH:MM")?,
        };
        if slots.morning == slots.evening {
            bail!("MORNING_SLOT and EVENING_SLOT must differ");
        }

        Ok(Self {
            latitude: required("LATITUDE")?
                .trim()
                .parse()
                .context("LATITUDE must be a number")?,
            longitude: required("LONGITUDE")?
                .trim()
                .parse()
                .context("LONGITUDE must be a number")?,
            freeze_threshold_f: optional("FREEZE_THRESHOLD_F", "60")
                .trim()
                .parse()
                .context("FREEZE_THRESHOLD_F must be a number")?,
            heat_threshold_f: optional("HEAT_THRESHOLD_F", "70")
                .trim()
                .parse()
                .context("HEAT_THRESHOLD_F must be a number")?,
            ntfy_topic: required("NTFY_TOPIC")?,
            ntfy_base_url: optional("NTFY_BASE_URL", DEFAULT_NTFY_URL),
            sensor_names: SensorNames::parse(&optional("SENSOR_NAMES", ""))?,
            source,
            forecast_base_url: optional("FORECAST_BASE_URL", DEFAULT_FORECAST_URL),
            slots,
            poll_interval_secs: optional("POLL_INTERVAL_SECS", "300")
                .parse()
                .context("POLL_INTERVAL_SECS must be a positive integer")?,
            tick_interval_secs: optional("TICK_INTERVAL_SECS", "10")
                .parse()
                .context("TICK_INTERVAL_SECS must be a positive integer")?,
            trigger_port: optional("TRIGGER_PORT", "65432")
                .parse()
                .context("TRIGGER_PORT must be a valid port number")?,
            server_host: optional("SERVER_HOST", "127.0.0.1"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
        })
    }
}

/// Parse a local time-of-day `"HH:MM"`.
fn parse_slot_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("invalid time of day: {raw:?}"))
}

/// Parse `"192.168.1.20"` or `"192.168.1.20:8080"`; the port defaults to 80.
fn parse_gateway_addr(raw: &str) -> Result<SocketAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip = raw
        .parse::<IpAddr>()
        .with_context(|| format!("GATEWAY_IP must be an IP address, got: {raw:?}"))?;
    Ok(SocketAddr::new(ip, GATEWAY_PORT))
}
