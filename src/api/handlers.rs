use axum::{extract::State, Json};
use utoipa::OpenApi;

use super::{
    dto::{ExtremeDto, SensorHistoryDto, SensorInfoDto, SensorNameDto, SensorTemperatureDto},
    AppState,
};
use crate::{
    alerts::AlertKind,
    control::EvaluationOutcome,
    forecast::{ForecastPoint, ForecastWindow},
    sensors::{Channel, Readings, SensorNames},
};

/// Readings as a list in display order.
fn ordered(names: &SensorNames, readings: &Readings) -> Vec<SensorTemperatureDto> {
    names
        .display_order(readings.keys())
        .into_iter()
        .map(|name| SensorTemperatureDto {
            name: name.clone(),
            temperature_f: readings[name],
        })
        .collect()
}

/// Current readings minus the outdoor sensor.
async fn indoor_readings(state: &AppState) -> Readings {
    let sensors = state.evaluator.sensors();
    let outdoor = sensors.names().friendly_name(Channel::Outdoor);
    let mut readings = sensors.read_current().await;
    readings.remove(&outdoor);
    readings
}

// ---------------------------------------------------------------------------
// Temperatures
// ---------------------------------------------------------------------------

/// Live temperature of every reachable sensor.
#[utoipa::path(
    get,
    path = "/temperatures/current",
    responses(
        (status = 200, description = "Current temperatures in display order; empty when the source is unreachable", body = Vec<SensorTemperatureDto>),
    ),
    tag = "temperatures"
)]
pub async fn get_current_temperatures(State(state): State<AppState>) -> Json<Vec<SensorTemperatureDto>> {
    let sensors = state.evaluator.sensors();
    let readings = sensors.read_current().await;
    Json(ordered(sensors.names(), &readings))
}

/// 24-hour low and high per sensor from the in-memory history.
#[utoipa::path(
    get,
    path = "/temperatures/history",
    responses(
        (status = 200, description = "Rolling 24h low/high per sensor", body = Vec<SensorHistoryDto>),
    ),
    tag = "temperatures"
)]
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<SensorHistoryDto>> {
    let sensors = state.evaluator.sensors();
    let mut snapshots = sensors.store().snapshot_all().await;
    let order: Vec<String> = sensors
        .names()
        .display_order(snapshots.keys())
        .into_iter()
        .cloned()
        .collect();
    Json(
        order
            .iter()
            .filter_map(|name| snapshots.remove(name))
            .map(Into::into)
            .collect(),
    )
}

/// Coldest indoor sensor right now.
#[utoipa::path(
    get,
    path = "/temperatures/coldest",
    responses(
        (status = 200, description = "Coldest indoor sensor, or null without data", body = Option<SensorTemperatureDto>),
    ),
    tag = "temperatures"
)]
pub async fn get_coldest(State(state): State<AppState>) -> Json<Option<SensorTemperatureDto>> {
    let readings = indoor_readings(&state).await;
    Json(
        readings
            .into_iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, temperature_f)| SensorTemperatureDto {
                name,
                temperature_f,
            }),
    )
}

/// Warmest indoor sensor right now.
#[utoipa::path(
    get,
    path = "/temperatures/warmest",
    responses(
        (status = 200, description = "Warmest indoor sensor, or null without data", body = Option<SensorTemperatureDto>),
    ),
    tag = "temperatures"
)]
pub async fn get_warmest(State(state): State<AppState>) -> Json<Option<SensorTemperatureDto>> {
    let readings = indoor_readings(&state).await;
    Json(
        readings
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, temperature_f)| SensorTemperatureDto {
                name,
                temperature_f,
            }),
    )
}

// ---------------------------------------------------------------------------
// Forecast & evaluation
// ---------------------------------------------------------------------------

/// Next-24h forecast summary against the configured thresholds.
#[utoipa::path(
    get,
    path = "/forecast",
    responses(
        (status = 200, description = "Forecast window, or null when the forecast is unavailable", body = Option<ForecastWindow>),
    ),
    tag = "forecast"
)]
pub async fn get_forecast(State(state): State<AppState>) -> Json<Option<ForecastWindow>> {
    Json(state.evaluator.forecast().await)
}

/// Run an evaluation now, sending an alert if a threshold is crossed.
#[utoipa::path(
    post,
    path = "/evaluate",
    responses(
        (status = 200, description = "Outcome of the evaluation", body = EvaluationOutcome),
    ),
    tag = "forecast"
)]
pub async fn evaluate(State(state): State<AppState>) -> Json<EvaluationOutcome> {
    Json(state.evaluator.evaluate_manual().await)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configured sensor names and alert thresholds.
#[utoipa::path(
    get,
    path = "/sensors",
    responses(
        (status = 200, description = "Sensor configuration", body = SensorInfoDto),
    ),
    tag = "system"
)]
pub async fn get_sensor_info(State(state): State<AppState>) -> Json<SensorInfoDto> {
    let settings = state.evaluator.settings();
    Json(SensorInfoDto {
        sensors: state
            .evaluator
            .sensors()
            .names()
            .entries()
            .iter()
            .map(|(channel, name)| SensorNameDto {
                name: name.clone(),
                raw_name: channel.raw_name(),
            })
            .collect(),
        freeze_threshold_f: settings.freeze_threshold_f,
        heat_threshold_f: settings.heat_threshold_f,
    })
}

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_current_temperatures,
        get_history,
        get_coldest,
        get_warmest,
        get_forecast,
        evaluate,
        get_sensor_info,
        health
    ),
    components(schemas(
        SensorTemperatureDto,
        SensorHistoryDto,
        ExtremeDto,
        SensorInfoDto,
        SensorNameDto,
        ForecastWindow,
        ForecastPoint,
        EvaluationOutcome,
        AlertKind
    )),
    tags(
        (name = "temperatures", description = "Live and 24h sensor temperatures"),
        (name = "forecast", description = "Forecast summary and on-demand evaluation"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Temperature Alert API",
        version = "0.1.0",
        description = "Read-only view of home temperatures, history and forecast"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
