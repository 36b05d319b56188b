use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use temperature_alert_service::{
    alerts::{AlertDispatcher, Notifier},
    api::{self, AppState},
    config::{Config, SourceConfig},
    control::{EvaluationService, EvaluationSettings, Scheduler},
    forecast::ForecastClient,
    history::HistoryStore,
    sensors::SensorService,
    trigger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(
        latitude = config.latitude,
        longitude = config.longitude,
        freeze_threshold_f = config.freeze_threshold_f,
        heat_threshold_f = config.heat_threshold_f,
        "Starting temperature alert service"
    );

    // Rolling 24h history shared by polling, evaluations and the API
    let store = HistoryStore::new();
    let sensors = SensorService::from_config(&config, store);

    let evaluator = EvaluationService::new(
        sensors.clone(),
        ForecastClient::new(&config.forecast_base_url),
        AlertDispatcher::new(
            Notifier::new(&config.ntfy_base_url, &config.ntfy_topic),
            config.sensor_names.clone(),
        ),
        EvaluationSettings {
            latitude: config.latitude,
            longitude: config.longitude,
            freeze_threshold_f: config.freeze_threshold_f,
            heat_threshold_f: config.heat_threshold_f,
        },
    );

    // The cloud API keeps history; seed the window so the first alert has lows
    if matches!(config.source, SourceConfig::Cloud { .. }) {
        sensors.backfill().await;
    }

    // Manual trigger listener; the daemon keeps running without it
    match trigger::bind(config.trigger_port).await {
        Ok(listener) => {
            let evaluator = evaluator.clone();
            tokio::spawn(trigger::serve(listener, move || {
                let evaluator = evaluator.clone();
                async move {
                    let outcome = evaluator.evaluate_manual().await;
                    info!(outcome = ?outcome, "Manual evaluation finished");
                }
            }));
        }
        Err(e) => error!(error = %format!("{e:#}"), "Manual triggers disabled"),
    }

    // Poll + scheduled-evaluation loop
    {
        let scheduler = Scheduler::new(
            evaluator.clone(),
            config.slots,
            config.poll_interval_secs,
            config.tick_interval_secs,
        );
        tokio::spawn(scheduler.run());
    }

    // Query API
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(AppState { evaluator }))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
