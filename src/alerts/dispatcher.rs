use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    history::{Extreme, HistorySnapshot},
    sensors::{Readings, SensorNames},
};

use super::{Notifier, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Freeze,
    Heat,
}

impl AlertKind {
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Freeze => "Freeze Warning",
            AlertKind::Heat => "Heat Warning",
        }
    }

    /// Which extreme the alert is about: the forecast low for freezes, the
    /// high for heat.
    fn extreme_label(&self) -> &'static str {
        match self {
            AlertKind::Freeze => "Low",
            AlertKind::Heat => "High",
        }
    }

    fn pick(&self, snapshot: &HistorySnapshot) -> Extreme {
        match self {
            AlertKind::Freeze => snapshot.low,
            AlertKind::Heat => snapshot.high,
        }
    }
}

/// Everything an alert message needs. Built per evaluation, never stored.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub trigger_temp: f64,
    /// Forecast-local time of the triggering extreme.
    pub trigger_time: NaiveDateTime,
    pub readings: Readings,
    pub history: BTreeMap<String, HistorySnapshot>,
}

/// Formats alert events and hands them to the notifier. No dedup, no retry.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    notifier: Notifier,
    names: SensorNames,
}

impl AlertDispatcher {
    pub fn new(notifier: Notifier, names: SensorNames) -> Self {
        Self { notifier, names }
    }

    /// Title and body for `event`, with history times shown in local time.
    pub fn compose(&self, event: &AlertEvent) -> (&'static str, String) {
        self.compose_in(event, &Local)
    }

    pub fn compose_in<Tz: TimeZone>(&self, event: &AlertEvent, tz: &Tz) -> (&'static str, String) {
        let kind = event.kind;
        let mut body = format!(
            "Forecast {}: {:.1}F @ {}",
            kind.extreme_label(),
            event.trigger_temp,
            day_hour_label(event.trigger_time)
        );

        for name in self.names.display_order(event.readings.keys()) {
            let current = event.readings[name];
            body.push_str(&format!("\n{name}: {current:.1}F"));
            if let Some(snapshot) = event.history.get(name) {
                let extreme = kind.pick(snapshot);
                let at = extreme.timestamp.with_timezone(tz).time();
                body.push_str(&format!(
                    " ({}: {:.1}F @ {})",
                    kind.extreme_label(),
                    extreme.temperature_f,
                    clock_label(at)
                ));
            }
        }

        (kind.title(), body)
    }

    /// Send `event` at high priority. One attempt; returns delivery success.
    pub async fn send(&self, event: &AlertEvent) -> bool {
        let (title, body) = self.compose(event);
        info!(title = %title, body = %body, "Sending alert");
        self.notifier.send(title, &body, Priority::High).await
    }
}

/// `"3am"`, `"3:15pm"`, `"12pm"`.
pub fn clock_label(t: NaiveTime) -> String {
    let (pm, hour) = t.hour12();
    let suffix = if pm { "pm" } else { "am" };
    match t.minute() {
        0 => format!("{hour}{suffix}"),
        m => format!("{hour}:{m:02}{suffix}"),
    }
}

/// `"Mon 3am"`: abbreviated weekday plus the hour.
pub fn day_hour_label(dt: NaiveDateTime) -> String {
    let (pm, hour) = dt.hour12();
    let suffix = if pm { "pm" } else { "am" };
    format!("{} {hour}{suffix}", dt.format("%a"))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, h, m, 0).unwrap()
    }

    fn snapshot(name: &str, low: (DateTime<Utc>, f64), high: (DateTime<Utc>, f64)) -> HistorySnapshot {
        HistorySnapshot {
            sensor_name: name.to_owned(),
            low: Extreme {
                timestamp: low.0,
                temperature_f: low.1,
            },
            high: Extreme {
                timestamp: high.0,
                temperature_f: high.1,
            },
        }
    }

    fn dispatcher() -> AlertDispatcher {
        AlertDispatcher::new(
            Notifier::new("http://127.0.0.1:9", "unused"),
            SensorNames::parse("Channel 7:Basement,Indoor:Living Room").unwrap(),
        )
    }

    fn event(kind: AlertKind) -> AlertEvent {
        let readings: Readings = [
            ("Attic".to_owned(), 40.0),
            ("Living Room".to_owned(), 66.5),
            ("Basement".to_owned(), 52.0),
        ]
        .into();
        let history = BTreeMap::from([
            ("Basement".to_owned(), snapshot("Basement", (at(3, 15), 49.5), (at(15, 0), 56.0))),
            ("Living Room".to_owned(), snapshot("Living Room", (at(5, 0), 64.0), (at(18, 30), 71.0))),
        ]);
        AlertEvent {
            kind,
            trigger_temp: 28.0,
            trigger_time: NaiveDate::from_ymd_opt(2026, 1, 12)
                .unwrap()
                .and_hms_opt(4, 0, 0)
                .unwrap(),
            readings,
            history,
        }
    }

    #[test]
    fn clock_labels() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(clock_label(t(3, 0)), "3am");
        assert_eq!(clock_label(t(15, 15)), "3:15pm");
        assert_eq!(clock_label(t(0, 5)), "12:05am");
        assert_eq!(clock_label(t(12, 0)), "12pm");
    }

    #[test]
    fn day_hour_labels() {
        let dt = NaiveDate::from_ymd_opt(2026, 1, 12)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        assert_eq!(day_hour_label(dt), "Mon 4pm");
    }

    #[test]
    fn freeze_body_lists_sensors_in_display_order_with_lows() {
        let (title, body) = dispatcher().compose_in(&event(AlertKind::Freeze), &Utc);
        assert_eq!(title, "Freeze Warning");
        assert_eq!(
            body,
            "Forecast Low: 28.0F @ Mon 4am\n\
             Basement: 52.0F (Low: 49.5F @ 3:15am)\n\
             Living Room: 66.5F (Low: 64.0F @ 5am)\n\
             Attic: 40.0F"
        );
    }

    #[test]
    fn heat_body_annotates_highs() {
        let mut e = event(AlertKind::Heat);
        e.trigger_temp = 91.0;
        let (title, body) = dispatcher().compose_in(&e, &Utc);
        assert_eq!(title, "Heat Warning");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Forecast High: 91.0F @ Mon 4am");
        assert_eq!(lines[1], "Basement: 52.0F (High: 56.0F @ 3pm)");
        assert_eq!(lines[2], "Living Room: 66.5F (High: 71.0F @ 6:30pm)");
    }

    #[test]
    fn body_without_readings_is_just_the_forecast_line() {
        let mut e = event(AlertKind::Freeze);
        e.readings.clear();
        let (_, body) = dispatcher().compose_in(&e, &Utc);
        assert_eq!(body, "Forecast Low: 28.0F @ Mon 4am");
    }

    #[tokio::test]
    async fn send_reports_transport_failure() {
        assert!(!dispatcher().send(&event(AlertKind::Freeze)).await);
    }
}
