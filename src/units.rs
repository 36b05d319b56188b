use std::str::FromStr;

use anyhow::anyhow;

/// Temperature unit as reported by the gateway or cloud API.
///
/// The LAN gateway reports `"C"`/`"F"`, the cloud API uses `"℃"`/`"℉"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    Celsius,
    #[default]
    Fahrenheit,
}

impl FromStr for TemperatureUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().trim_start_matches('°').to_ascii_uppercase().as_str() {
            "C" | "℃" => Ok(Self::Celsius),
            "F" | "℉" => Ok(Self::Fahrenheit),
            other => Err(anyhow!("unknown temperature unit: {other:?}")),
        }
    }
}

impl TemperatureUnit {
    /// Parse an optional unit label, treating a missing label as Fahrenheit.
    pub fn from_label(label: Option<&str>) -> anyhow::Result<Self> {
        label.map_or(Ok(Self::default()), str::parse)
    }
}

/// Normalise `value` to Fahrenheit. Fahrenheit input is returned untouched.
pub fn to_fahrenheit(value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => value * 9.0 / 5.0 + 32.0,
        TemperatureUnit::Fahrenheit => value,
    }
}
