pub mod dto;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::control::EvaluationService;

use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub evaluator: EvaluationService,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/temperatures/current", get(handlers::get_current_temperatures))
        .route("/temperatures/history", get(handlers::get_history))
        .route("/temperatures/coldest", get(handlers::get_coldest))
        .route("/temperatures/warmest", get(handlers::get_warmest))
        .route("/forecast", get(handlers::get_forecast))
        .route("/evaluate", post(handlers::evaluate))
        .route("/sensors", get(handlers::get_sensor_info))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
