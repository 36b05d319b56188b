use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::{
    config::{Config, SourceConfig},
    discovery::DeviceLocator,
    ecowitt::{CloudClient, GatewayClient},
    history::{HistoryStore, Reading, HISTORY_WINDOW_HOURS},
};

use super::{Channel, Readings, SensorNames};

/// Where current readings come from.
#[derive(Debug, Clone)]
pub enum SensorSource {
    /// The LAN gateway, found by subnet discovery or pinned by config.
    Lan {
        gateway: GatewayClient,
        locator: DeviceLocator,
    },
    /// The vendor cloud API. Also serves history.
    Cloud(CloudClient),
}

impl SensorSource {
    pub fn from_config(config: &SourceConfig) -> Self {
        match config {
            SourceConfig::Lan {
                gateway: pinned,
                failure_limit,
            } => {
                let gateway = GatewayClient::new();
                let locator = DeviceLocator::new(gateway.clone(), *pinned, *failure_limit);
                Self::Lan { gateway, locator }
            }
            SourceConfig::Cloud {
                api_base,
                credentials,
            } => Self::Cloud(CloudClient::new(api_base, credentials.clone())),
        }
    }
}

/// Sensor reads, friendly naming and the history write path.
///
/// Cheap to clone; the scheduler, trigger listener and query API all hold one.
#[derive(Debug, Clone)]
pub struct SensorService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    source: SensorSource,
    names: SensorNames,
    store: HistoryStore,
}

impl SensorService {
    pub fn new(source: SensorSource, names: SensorNames, store: HistoryStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                names,
                store,
            }),
        }
    }

    pub fn from_config(config: &Config, store: HistoryStore) -> Self {
        Self::new(
            SensorSource::from_config(&config.source),
            config.sensor_names.clone(),
            store,
        )
    }

    pub fn names(&self) -> &SensorNames {
        &self.inner.names
    }

    pub fn store(&self) -> &HistoryStore {
        &self.inner.store
    }

    /// Current temperature per friendly name, in °F.
    ///
    /// Never fails: an unreachable gateway, a bad payload or an API error all
    /// yield an empty map and a log line. Channels the source did not report
    /// are absent.
    pub async fn read_current(&self) -> Readings {
        match &self.inner.source {
            SensorSource::Lan { gateway, locator } => {
                let Some(addr) = locator.locate().await else {
                    warn!("No gateway address; skipping sensor read");
                    return Readings::new();
                };
                match gateway.read_current(addr).await {
                    Ok(raw) => {
                        locator.report_success();
                        self.name_readings(raw)
                    }
                    Err(e) => {
                        error!(gateway = %addr, error = %format!("{e:#}"), "Failed to read gateway");
                        locator.report_failure().await;
                        Readings::new()
                    }
                }
            }
            SensorSource::Cloud(cloud) => match cloud.read_current().await {
                Ok(raw) => self.name_readings(raw),
                Err(e) => {
                    error!(error = %format!("{e:#}"), "Failed to read cloud sensors");
                    Readings::new()
                }
            },
        }
    }

    /// Stored readings per friendly name between `start` and `end`, oldest
    /// first. The LAN gateway keeps no history, so it yields an empty map.
    pub async fn read_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HashMap<String, Vec<Reading>> {
        let SensorSource::Cloud(cloud) = &self.inner.source else {
            return HashMap::new();
        };

        let mut out = HashMap::new();
        for channel in Channel::all() {
            match cloud.read_history(channel, start, end).await {
                Ok(points) if !points.is_empty() => {
                    let name = self.inner.names.friendly_name(channel);
                    let readings = points
                        .into_iter()
                        .map(|(timestamp, temperature_f)| Reading {
                            sensor_name: name.clone(),
                            timestamp,
                            temperature_f,
                        })
                        .collect();
                    out.insert(name, readings);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(channel = %channel, error = %format!("{e:#}"), "Failed to read channel history")
                }
            }
        }
        out
    }

    /// Read current temperatures and record them into the history store.
    pub async fn poll(&self) -> Readings {
        let readings = self.read_current().await;
        if readings.is_empty() {
            warn!("Poll returned no readings");
        } else {
            self.inner.store.record(&readings, Utc::now()).await;
            info!(sensors = readings.len(), "Polled temperatures");
        }
        readings
    }

    /// Seed the history store with the source's last 24h, when it has any.
    pub async fn backfill(&self) {
        let now = Utc::now();
        let series = self
            .read_history(now - Duration::hours(HISTORY_WINDOW_HOURS), now)
            .await;
        if series.is_empty() {
            return;
        }
        let points: usize = series.values().map(Vec::len).sum();
        self.inner.store.backfill(&series, now).await;
        info!(sensors = series.len(), points, "Backfilled history");
    }

    fn name_readings(&self, raw: Vec<(Channel, f64)>) -> Readings {
        raw.into_iter()
            .map(|(channel, temperature_f)| (self.inner.names.friendly_name(channel), temperature_f))
            .collect()
    }
}
