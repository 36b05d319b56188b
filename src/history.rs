use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::sensors::Readings;

/// Length of the rolling window kept per sensor.
pub const HISTORY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor_name: String,
    pub timestamp: DateTime<Utc>,
    pub temperature_f: f64,
}

/// One end of a low/high pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extreme {
    pub timestamp: DateTime<Utc>,
    pub temperature_f: f64,
}

/// Low/high over the live window of one sensor. Computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub sensor_name: String,
    pub low: Extreme,
    pub high: Extreme,
}

/// Timestamp-ordered readings for one sensor.
#[derive(Debug, Default)]
struct SensorHistory {
    points: Vec<Extreme>,
}

impl SensorHistory {
    /// Insert keeping timestamp order; late arrivals from retries slot in
    /// behind any existing point with the same timestamp.
    fn insert(&mut self, point: Extreme) {
        let idx = self
            .points
            .partition_point(|p| p.timestamp <= point.timestamp);
        self.points.insert(idx, point);
    }

    /// Drop everything at or before `cutoff`. Idempotent.
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        let stale = self.points.partition_point(|p| p.timestamp <= cutoff);
        self.points.drain(..stale);
    }

    /// Points strictly newer than `cutoff`.
    fn live(&self, cutoff: DateTime<Utc>) -> &[Extreme] {
        let start = self.points.partition_point(|p| p.timestamp <= cutoff);
        &self.points[start..]
    }
}

/// Rolling 24h history of readings per sensor name.
///
/// Cheap to clone; every clone shares the same store. A single lock guards
/// the whole map: writes happen once per poll, reads once per evaluation.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    inner: Arc<RwLock<HashMap<String, SensorHistory>>>,
    window: Duration,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            window: Duration::hours(HISTORY_WINDOW_HOURS),
        }
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one reading per sensor at `at`, then prune every touched
    /// sensor relative to `at`.
    pub async fn record(&self, readings: &Readings, at: DateTime<Utc>) {
        let cutoff = at - self.window;
        let mut guard = self.inner.write().await;
        for (name, &temperature_f) in readings {
            let history = guard.entry(name.clone()).or_default();
            history.insert(Extreme {
                timestamp: at,
                temperature_f,
            });
            history.prune(cutoff);
        }
    }

    /// Merge pre-existing series (e.g. cloud history) into the store, pruning
    /// relative to `now`.
    pub async fn backfill(&self, series: &HashMap<String, Vec<Reading>>, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let mut guard = self.inner.write().await;
        for (name, readings) in series {
            let history = guard.entry(name.clone()).or_default();
            for r in readings {
                history.insert(Extreme {
                    timestamp: r.timestamp,
                    temperature_f: r.temperature_f,
                });
            }
            history.prune(cutoff);
        }
    }

    /// Low/high for every sensor with at least one reading in the last 24h.
    pub async fn snapshot_all(&self) -> BTreeMap<String, HistorySnapshot> {
        self.snapshot_all_at(Utc::now()).await
    }

    /// [`snapshot_all`](Self::snapshot_all) against an explicit clock.
    ///
    /// The window bound is applied here as well as on write, so a sensor that
    /// stopped reporting never leaks readings older than the window.
    pub async fn snapshot_all_at(&self, now: DateTime<Utc>) -> BTreeMap<String, HistorySnapshot> {
        let cutoff = now - self.window;
        self.inner
            .read()
            .await
            .iter()
            .filter_map(|(name, history)| summarize(name, history.live(cutoff)))
            .map(|s| (s.sensor_name.clone(), s))
            .collect()
    }

    /// Live readings for one sensor, oldest first.
    pub async fn readings_at(&self, sensor_name: &str, now: DateTime<Utc>) -> Vec<Reading> {
        let cutoff = now - self.window;
        self.inner
            .read()
            .await
            .get(sensor_name)
            .map(|h| {
                h.live(cutoff)
                    .iter()
                    .map(|p| Reading {
                        sensor_name: sensor_name.to_owned(),
                        timestamp: p.timestamp,
                        temperature_f: p.temperature_f,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Argmin/argmax with strict comparisons: the earliest extreme wins ties.
fn summarize(name: &str, points: &[Extreme]) -> Option<HistorySnapshot> {
    let (first, rest) = points.split_first()?;
    let (mut low, mut high) = (*first, *first);
    for p in rest {
        if p.temperature_f < low.temperature_f {
            low = *p;
        }
        if p.temperature_f > high.temperature_f {
            high = *p;
        }
    }
    Some(HistorySnapshot {
        sensor_name: name.to_owned(),
        low,
        high,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
    }

    fn readings(pairs: &[(&str, f64)]) -> Readings {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    #[tokio::test]
    async fn empty_store_has_no_snapshots() {
        let store = HistoryStore::new();
        assert!(store.snapshot_all_at(t0()).await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reports_low_and_high_with_times() {
        let store = HistoryStore::new();
        store.record(&readings(&[("Basement", 55.0)]), t0()).await;
        store
            .record(&readings(&[("Basement", 52.5)]), t0() + Duration::hours(1))
            .await;
        store
            .record(&readings(&[("Basement", 58.0)]), t0() + Duration::hours(2))
            .await;

        let snaps = store.snapshot_all_at(t0() + Duration::hours(2)).await;
        let s = &snaps["Basement"];
        assert_eq!(s.low.temperature_f, 52.5);
        assert_eq!(s.low.timestamp, t0() + Duration::hours(1));
        assert_eq!(s.high.temperature_f, 58.0);
        assert_eq!(s.high.timestamp, t0() + Duration::hours(2));
    }

    #[tokio::test]
    async fn ties_resolve_to_the_earliest_reading() {
        let store = HistoryStore::new();
        for h in 0..3 {
            store
                .record(&readings(&[("Attic", 50.0)]), t0() + Duration::hours(h))
                .await;
        }
        let snaps = store.snapshot_all_at(t0() + Duration::hours(3)).await;
        assert_eq!(snaps["Attic"].low.timestamp, t0());
        assert_eq!(snaps["Attic"].high.timestamp, t0());
    }

    #[tokio::test]
    async fn snapshot_never_returns_readings_older_than_the_window() {
        let store = HistoryStore::new();
        // 30 hours of 10-minute readings; the coldest ones are the oldest.
        for i in 0..180 {
            let at = t0() + Duration::minutes(10 * i);
            store.record(&readings(&[("Garage", i as f64)]), at).await;
        }
        let now = t0() + Duration::minutes(10 * 179);
        let cutoff = now - Duration::hours(HISTORY_WINDOW_HOURS);

        let snaps = store.snapshot_all_at(now).await;
        let s = &snaps["Garage"];
        assert!(s.low.timestamp > cutoff);
        assert!(s.high.timestamp > cutoff);
        assert!(store
            .readings_at("Garage", now)
            .await
            .iter()
            .all(|r| r.timestamp > cutoff));
    }

    #[tokio::test]
    async fn idle_sensor_ages_out_on_read() {
        let store = HistoryStore::new();
        store.record(&readings(&[("Shed", 40.0)]), t0()).await;
        store
            .record(&readings(&[("Kitchen", 68.0)]), t0() + Duration::hours(23))
            .await;

        // The shed never reported again; its reading is stale at +25h even
        // though no write has pruned it.
        let snaps = store.snapshot_all_at(t0() + Duration::hours(25)).await;
        assert!(!snaps.contains_key("Shed"));
        assert!(snaps.contains_key("Kitchen"));
    }

    #[tokio::test]
    async fn out_of_order_reading_is_inserted_in_order() {
        let store = HistoryStore::new();
        store
            .record(&readings(&[("Porch", 30.0)]), t0() + Duration::hours(2))
            .await;
        store.record(&readings(&[("Porch", 10.0)]), t0()).await;

        let rs = store.readings_at("Porch", t0() + Duration::hours(3)).await;
        assert_eq!(rs.len(), 2);
        assert!(rs[0].timestamp < rs[1].timestamp);
        assert_eq!(rs[0].temperature_f, 10.0);
    }

    #[tokio::test]
    async fn partial_readings_leave_other_sensors_untouched() {
        let store = HistoryStore::new();
        store
            .record(&readings(&[("A", 60.0), ("B", 61.0)]), t0())
            .await;
        store
            .record(&readings(&[("A", 59.0)]), t0() + Duration::minutes(5))
            .await;

        let now = t0() + Duration::minutes(5);
        assert_eq!(store.readings_at("A", now).await.len(), 2);
        assert_eq!(store.readings_at("B", now).await.len(), 1);
    }

    #[tokio::test]
    async fn backfill_merges_and_prunes() {
        let store = HistoryStore::new();
        let now = t0() + Duration::hours(30);
        let series = HashMap::from([(
            "Basement".to_owned(),
            vec![
                Reading {
                    sensor_name: "Basement".to_owned(),
                    timestamp: t0(),
                    temperature_f: 20.0,
                },
                Reading {
                    sensor_name: "Basement".to_owned(),
                    timestamp: now - Duration::hours(1),
                    temperature_f: 55.0,
                },
            ],
        )]);
        store.backfill(&series, now).await;

        let rs = store.readings_at("Basement", now).await;
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].temperature_f, 55.0);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = HistoryStore::new();
        let clone = store.clone();
        store.record(&readings(&[("Den", 66.0)]), t0()).await;
        assert!(clone.snapshot_all_at(t0()).await.contains_key("Den"));
    }

    #[tokio::test]
    async fn concurrent_writers_and_readers_do_not_tear() {
        let store = HistoryStore::new();
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.spawn(async move {
                store
                    .record(
                        &readings(&[("A", i as f64), ("B", i as f64)]),
                        t0() + Duration::minutes(i),
                    )
                    .await;
                store.snapshot_all_at(t0() + Duration::hours(1)).await
            });
        }
        while let Some(snaps) = tasks.join_next().await {
            let snaps = snaps.unwrap();
            // A and B are always written together under one lock.
            assert_eq!(snaps.contains_key("A"), snaps.contains_key("B"));
        }
        assert_eq!(store.readings_at("A", t0() + Duration::hours(1)).await.len(), 20);
    }
}
