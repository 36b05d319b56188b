use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    alerts::{AlertDispatcher, AlertEvent, AlertKind},
    forecast::{ForecastClient, ForecastWindow},
    sensors::SensorService,
};

/// What one evaluation decided.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    ForecastUnavailable,
    WithinRange,
    AlertSent { kind: AlertKind },
    AlertFailed { kind: AlertKind },
    /// A manual evaluation was already running; this request was dropped.
    AlreadyRunning,
}

/// Thresholds and coordinates an evaluation checks against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSettings {
    pub latitude: f64,
    pub longitude: f64,
    pub freeze_threshold_f: f64,
    pub heat_threshold_f: f64,
}

/// Reads sensors, updates history, fetches the forecast and alerts when a
/// threshold is crossed. Shared by the scheduler, the trigger listener and
/// the query API.
#[derive(Clone)]
pub struct EvaluationService {
    inner: Arc<Inner>,
}

struct Inner {
    sensors: SensorService,
    forecast: ForecastClient,
    dispatcher: AlertDispatcher,
    settings: EvaluationSettings,
    /// One permit: manual evaluations are single-flight.
    manual: Semaphore,
}

impl EvaluationService {
    pub fn new(
        sensors: SensorService,
        forecast: ForecastClient,
        dispatcher: AlertDispatcher,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sensors,
                forecast,
                dispatcher,
                settings,
                manual: Semaphore::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &EvaluationSettings {
        &self.inner.settings
    }

    pub fn sensors(&self) -> &SensorService {
        &self.inner.sensors
    }

    /// Fetch the forecast window for the configured location and thresholds.
    pub async fn forecast(&self) -> Option<ForecastWindow> {
        let s = &self.inner.settings;
        self.inner
            .forecast
            .get_forecast(s.latitude, s.longitude, s.freeze_threshold_f, s.heat_threshold_f)
            .await
    }

    /// Run one full evaluation. Never fails; every component error has
    /// already been logged and folded into the outcome.
    pub async fn evaluate(&self) -> EvaluationOutcome {
        info!("Running evaluation");
        let sensors = &self.inner.sensors;

        // An outage still gets the forecast check; the alert then carries
        // only the forecast line.
        let readings = sensors.read_current().await;
        if readings.is_empty() {
            warn!("No current readings; checking forecast only");
        } else {
            // Current readings take part in the low/high annotation.
            sensors.store().record(&readings, Utc::now()).await;
        }
        let history = sensors.store().snapshot_all().await;

        for (name, t) in &readings {
            info!(sensor = %name, temperature_f = t, "Current temperature");
        }

        let Some(window) = self.forecast().await else {
            warn!("Forecast unavailable; skipping alert check");
            return EvaluationOutcome::ForecastUnavailable;
        };

        let trigger = if window.freeze_warning {
            window.low.map(|p| (AlertKind::Freeze, p))
        } else if window.heat_warning {
            window.high.map(|p| (AlertKind::Heat, p))
        } else {
            None
        };
        let Some((kind, point)) = trigger else {
            info!(
                low = ?window.low.map(|p| p.temperature_f),
                high = ?window.high.map(|p| p.temperature_f),
                "Temperature is within normal range; no alert needed"
            );
            return EvaluationOutcome::WithinRange;
        };

        let event = AlertEvent {
            kind,
            trigger_temp: point.temperature_f,
            trigger_time: point.time,
            readings,
            history,
        };
        if self.inner.dispatcher.send(&event).await {
            EvaluationOutcome::AlertSent { kind }
        } else {
            EvaluationOutcome::AlertFailed { kind }
        }
    }

    /// [`evaluate`](Self::evaluate) for externally requested runs: if one is
    /// already in progress the request is dropped instead of queued.
    pub async fn evaluate_manual(&self) -> EvaluationOutcome {
        let Ok(_permit) = self.inner.manual.try_acquire() else {
            info!("Manual evaluation already running; ignoring trigger");
            return EvaluationOutcome::AlreadyRunning;
        };
        self.evaluate().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use axum::{extract::State, http::HeaderMap, routing::{get, post}, Json, Router};
    use chrono::{Duration as ChronoDuration, Timelike};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        alerts::Notifier,
        discovery::DeviceLocator,
        ecowitt::GatewayClient,
        forecast::models::FORECAST_TIME_FORMAT,
        history::HistoryStore,
        sensors::{SensorNames, SensorSource},
        test_support::spawn_mock,
    };

    /// Gateway, forecast and ntfy doubles behind one mock server.
    pub(crate) struct Upstreams {
        pub addr: SocketAddr,
        pub alerts: Arc<std::sync::Mutex<Vec<(String, String)>>>,
    }

    #[derive(Clone)]
    struct MockState {
        gateway: Value,
        hourly: Vec<f64>,
        alerts: Arc<std::sync::Mutex<Vec<(String, String)>>>,
        gateway_delay: Duration,
        gateway_hits: Arc<AtomicUsize>,
    }

    /// Hourly temperatures starting at the current UTC hour.
    fn forecast_body(temps: &[f64]) -> Value {
        let start = Utc::now()
            .naive_utc()
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .unwrap();
        let time: Vec<String> = (0..temps.len())
            .map(|i| {
                (start + ChronoDuration::hours(i as i64))
                    .format(FORECAST_TIME_FORMAT)
                    .to_string()
            })
            .collect();
        json!({
            "utc_offset_seconds": 0,
            "hourly": {"time": time, "temperature_2m": temps}
        })
    }

    pub(crate) async fn upstreams(gateway: Value, hourly: Vec<f64>) -> Upstreams {
        upstreams_with_delay(gateway, hourly, Duration::ZERO, Arc::default()).await
    }

    async fn upstreams_with_delay(
        gateway: Value,
        hourly: Vec<f64>,
        gateway_delay: Duration,
        gateway_hits: Arc<AtomicUsize>,
    ) -> Upstreams {
        let alerts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let state = MockState {
            gateway,
            hourly,
            alerts: Arc::clone(&alerts),
            gateway_delay,
            gateway_hits,
        };
        let router = Router::new()
            .route(
                "/get_livedata_info",
                get(|State(s): State<MockState>| async move {
                    s.gateway_hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(s.gateway_delay).await;
                    Json(s.gateway)
                }),
            )
            .route(
                "/v1/forecast",
                get(|State(s): State<MockState>| async move { Json(forecast_body(&s.hourly)) }),
            )
            .route(
                "/alerts",
                post(|State(s): State<MockState>, headers: HeaderMap, body: String| async move {
                    let title = headers
                        .get("Title")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_owned();
                    s.alerts.lock().unwrap().push((title, body));
                    "ok"
                }),
            )
            .with_state(state);
        Upstreams {
            addr: spawn_mock(router).await,
            alerts,
        }
    }

    pub(crate) fn gateway_payload() -> Value {
        json!({
            "common_list": [{"id": "0x02", "val": "35.0"}],
            "wh25": [{"intemp": "68.0"}],
            "ch_aisle": [{"channel": "1", "temp": "52.0"}]
        })
    }

    pub(crate) fn service_for(up: &Upstreams) -> EvaluationService {
        let names = SensorNames::parse("Indoor:Living Room,Outdoor:Outdoor,Channel 1:Basement").unwrap();
        let gateway = GatewayClient::new();
        let locator = DeviceLocator::new(gateway.clone(), Some(up.addr), 3);
        let sensors = SensorService::new(
            SensorSource::Lan { gateway, locator },
            names.clone(),
            HistoryStore::new(),
        );
        EvaluationService::new(
            sensors,
            ForecastClient::new(&format!("http://{}/v1/forecast", up.addr)),
            AlertDispatcher::new(Notifier::new(&format!("http://{}", up.addr), "alerts"), names),
            EvaluationSettings {
                latitude: 40.7,
                longitude: -74.0,
                freeze_threshold_f: 60.0,
                heat_threshold_f: 70.0,
            },
        )
    }

    #[tokio::test]
    async fn freeze_forecast_sends_one_freeze_alert() {
        let up = upstreams(gateway_payload(), vec![55.0, 48.0, 50.0, 62.0]).await;
        let service = service_for(&up);

        let outcome = service.evaluate().await;
        assert_eq!(outcome, EvaluationOutcome::AlertSent { kind: AlertKind::Freeze });

        let alerts = up.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "Freeze Warning");
        let lines: Vec<&str> = alerts[0].1.lines().collect();
        assert!(lines[0].starts_with("Forecast Low: 48.0F @ "));
        assert!(lines[1].starts_with("Living Room: 68.0F (Low: 68.0F @ "));
        assert!(lines[2].starts_with("Outdoor: 35.0F"));
        assert!(lines[3].starts_with("Basement: 52.0F"));
    }

    #[tokio::test]
    async fn freeze_takes_precedence_over_heat() {
        let up = upstreams(gateway_payload(), vec![55.0, 80.0]).await;
        let outcome = service_for(&up).evaluate().await;
        assert_eq!(outcome, EvaluationOutcome::AlertSent { kind: AlertKind::Freeze });
    }

    #[tokio::test]
    async fn heat_forecast_sends_heat_alert() {
        let up = upstreams(gateway_payload(), vec![65.0, 75.0, 68.0]).await;
        let outcome = service_for(&up).evaluate().await;
        assert_eq!(outcome, EvaluationOutcome::AlertSent { kind: AlertKind::Heat });
        assert_eq!(up.alerts.lock().unwrap()[0].0, "Heat Warning");
    }

    #[tokio::test]
    async fn mild_forecast_sends_nothing() {
        let up = upstreams(gateway_payload(), vec![62.0, 65.0, 69.0]).await;
        assert_eq!(service_for(&up).evaluate().await, EvaluationOutcome::WithinRange);
        assert!(up.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn evaluation_records_current_readings_first() {
        let up = upstreams(gateway_payload(), vec![62.0]).await;
        let service = service_for(&up);
        service.evaluate().await;

        let snaps = service.sensors().store().snapshot_all().await;
        assert_eq!(snaps["Basement"].low.temperature_f, 52.0);
        assert_eq!(snaps.len(), 3);
    }

    #[tokio::test]
    async fn sensor_outage_still_sends_forecast_alert() {
        let up = upstreams(json!({"common_list": []}), vec![10.0, 12.0]).await;
        let service = service_for(&up);
        assert_eq!(
            service.evaluate().await,
            EvaluationOutcome::AlertSent { kind: AlertKind::Freeze }
        );

        let alerts = up.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "Freeze Warning");
        assert_eq!(alerts[0].1.lines().count(), 1);
        assert!(alerts[0].1.starts_with("Forecast Low: 10.0F @ "));
        drop(alerts);
        assert!(service.sensors().store().snapshot_all().await.is_empty());
    }

    #[tokio::test]
    async fn sensor_outage_with_mild_forecast_sends_nothing() {
        let up = upstreams(json!({"common_list": []}), vec![62.0]).await;
        assert_eq!(service_for(&up).evaluate().await, EvaluationOutcome::WithinRange);
        assert!(up.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_forecast_is_unavailable() {
        let up = upstreams(gateway_payload(), vec![]).await;
        assert_eq!(
            service_for(&up).evaluate().await,
            EvaluationOutcome::ForecastUnavailable
        );
    }

    #[tokio::test]
    async fn concurrent_manual_triggers_are_single_flight() {
        let hits = Arc::new(AtomicUsize::new(0));
        let up = upstreams_with_delay(
            gateway_payload(),
            vec![62.0],
            Duration::from_millis(300),
            Arc::clone(&hits),
        )
        .await;
        let service = service_for(&up);

        let (a, b) = tokio::join!(service.evaluate_manual(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            service.evaluate_manual().await
        });
        assert_eq!(a, EvaluationOutcome::WithinRange);
        assert_eq!(b, EvaluationOutcome::AlreadyRunning);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The permit is released once the first run finishes.
        assert_eq!(service.evaluate_manual().await, EvaluationOutcome::WithinRange);
    }
}
