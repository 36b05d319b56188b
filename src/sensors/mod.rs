pub mod service;

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{anyhow, Context, Result};

pub use service::{SensorService, SensorSource};

/// Current temperatures keyed by friendly sensor name, in °F.
pub type Readings = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Raw gateway channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Indoor,
    Outdoor,
    /// Numbered auxiliary probe, `1..=MAX_AUX_CHANNEL`.
    Aux(u8),
}

pub const MAX_AUX_CHANNEL: u8 = 8;

impl Channel {
    /// Validated constructor for auxiliary channels.
    pub fn aux(n: u8) -> Option<Self> {
        (1..=MAX_AUX_CHANNEL).contains(&n).then_some(Self::Aux(n))
    }

    /// Every channel the gateway can report, in natural order.
    pub fn all() -> impl Iterator<Item = Channel> {
        [Channel::Indoor, Channel::Outdoor]
            .into_iter()
            .chain((1..=MAX_AUX_CHANNEL).map(Channel::Aux))
    }

    /// Default display name when the operator configured none.
    pub fn raw_name(&self) -> String {
        self.to_string()
    }

    /// Keys under which the cloud real-time endpoint reports this channel.
    pub fn cloud_realtime_keys(&self) -> Vec<String> {
        match self {
            Channel::Indoor => vec!["indoor".to_owned()],
            Channel::Outdoor => vec!["outdoor".to_owned()],
            Channel::Aux(n) => vec![format!("temp_and_humidity_ch{n}"), format!("temp_ch{n}")],
        }
    }

    /// `call_back` value for the cloud history endpoint.
    pub fn cloud_history_key(&self) -> String {
        match self {
            Channel::Indoor => "indoor".to_owned(),
            Channel::Outdoor => "outdoor".to_owned(),
            Channel::Aux(n) => format!("temp_and_humidity_ch{n}"),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Indoor => f.write_str("Indoor"),
            Channel::Outdoor => f.write_str("Outdoor"),
            Channel::Aux(n) => write!(f, "Channel {n}"),
        }
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("indoor") {
            return Ok(Self::Indoor);
        }
        if s.eq_ignore_ascii_case("outdoor") {
            return Ok(Self::Outdoor);
        }
        let number = s
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("channel"))
            .map(|_| s[7..].trim())
            .ok_or_else(|| anyhow!("unknown channel: {s:?}"))?;
        let n: u8 = number
            .parse()
            .with_context(|| format!("channel number must be an integer, got: {s:?}"))?;
        Self::aux(n).ok_or_else(|| anyhow!("channel number out of range 1..={MAX_AUX_CHANNEL}: {s:?}"))
    }
}

// ---------------------------------------------------------------------------
// SensorNames
// ---------------------------------------------------------------------------

/// Operator-configured channel → friendly-name mapping.
///
/// Entry order is the preferred display order in alerts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorNames {
    entries: Vec<(Channel, String)>,
}

impl SensorNames {
    pub fn new(entries: Vec<(Channel, String)>) -> Self {
        Self { entries }
    }

    /// Parse `"Indoor:Living Room,Channel 7:Basement"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let entries = raw
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|entry| {
                let (channel, name) = entry.split_once(':').with_context(|| {
                    format!("SENSOR_NAMES entry must be 'channel:name', got: {entry:?}")
                })?;
                let channel = channel
                    .parse::<Channel>()
                    .with_context(|| format!("invalid channel in SENSOR_NAMES entry {entry:?}"))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(anyhow!("empty friendly name in SENSOR_NAMES entry {entry:?}"));
                }
                Ok((channel, name.to_owned()))
            })
            .collect::<Result<_>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(Channel, String)] {
        &self.entries
    }

    /// Configured name for `channel`, or its raw name.
    pub fn friendly_name(&self, channel: Channel) -> String {
        self.entries
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| channel.raw_name())
    }

    /// Sort friendly names into display order: configured names first in
    /// configuration order, everything else alphabetically after them.
    pub fn display_order<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<&'a String> {
        let mut names: Vec<_> = names.into_iter().collect();
        names.sort_by_key(|name| {
            let rank = self
                .entries
                .iter()
                .position(|(_, n)| n == *name)
                .unwrap_or(usize::MAX);
            (rank, (*name).clone())
        });
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_from_str_accepts_all_forms() {
        assert_eq!("Indoor".parse::<Channel>().unwrap(), Channel::Indoor);
        assert_eq!("outdoor".parse::<Channel>().unwrap(), Channel::Outdoor);
        assert_eq!("Channel 7".parse::<Channel>().unwrap(), Channel::Aux(7));
        assert_eq!("channel3".parse::<Channel>().unwrap(), Channel::Aux(3));
    }

    #[test]
    fn channel_from_str_rejects_out_of_range_and_junk() {
        assert!("Channel 0".parse::<Channel>().is_err());
        assert!("Channel 9".parse::<Channel>().is_err());
        assert!("Attic".parse::<Channel>().is_err());
        assert!("Channel x".parse::<Channel>().is_err());
    }

    #[test]
    fn channel_display_roundtrips() {
        for c in Channel::all() {
            assert_eq!(c.raw_name().parse::<Channel>().unwrap(), c);
        }
        assert_eq!(Channel::all().count(), 2 + MAX_AUX_CHANNEL as usize);
    }

    #[test]
    fn parse_sensor_names_empty() {
        assert!(SensorNames::parse("").unwrap().entries().is_empty());
    }

    #[test]
    fn parse_sensor_names_keeps_order() {
        let names = SensorNames::parse("Channel 7:Basement, Indoor:Living Room").unwrap();
        assert_eq!(
            names.entries(),
            &[
                (Channel::Aux(7), "Basement".to_owned()),
                (Channel::Indoor, "Living Room".to_owned()),
            ]
        );
    }

    #[test]
    fn parse_sensor_names_missing_colon_errors() {
        let err = SensorNames::parse("Basement").unwrap_err();
        assert!(err.to_string().contains("channel:name"));
    }

    #[test]
    fn parse_sensor_names_unknown_channel_errors() {
        let err = SensorNames::parse("Garage:Car").unwrap_err();
        assert!(err.to_string().contains("invalid channel"));
    }

    #[test]
    fn unconfigured_channel_falls_back_to_raw_name() {
        let names = SensorNames::parse("Channel 7:Basement").unwrap();
        assert_eq!(names.friendly_name(Channel::Aux(7)), "Basement");
        assert_eq!(names.friendly_name(Channel::Aux(2)), "Channel 2");
        assert_eq!(names.friendly_name(Channel::Outdoor), "Outdoor");
    }

    #[test]
    fn display_order_puts_configured_names_first() {
        let names = SensorNames::parse("Channel 7:Basement,Indoor:Living Room").unwrap();
        let present = vec![
            "Channel 2".to_owned(),
            "Living Room".to_owned(),
            "Attic".to_owned(),
            "Basement".to_owned(),
        ];
        let ordered: Vec<&str> = names
            .display_order(&present)
            .into_iter()
            .map(String::as_str)
            .collect();
        assert_eq!(ordered, vec!["Basement", "Living Room", "Attic", "Channel 2"]);
    }
}
