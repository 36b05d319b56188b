//! Loopback "evaluate now" endpoint. Any accepted connection is a trigger;
//! nothing is read or written.

use std::{future::Future, net::Ipv4Addr, time::Duration};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, time};
use tracing::{info, warn};

/// Pause after a failed accept (e.g. fd exhaustion) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

pub async fn bind(port: u16) -> Result<TcpListener> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .await
        .with_context(|| format!("Failed to bind trigger listener on 127.0.0.1:{port}"))
}

/// Accept connections forever, spawning `on_trigger()` for each one.
/// Spawn this via `tokio::spawn`.
pub async fn serve<F, Fut>(listener: TcpListener, on_trigger: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Listening for manual triggers");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                drop(stream);
                info!(peer = %peer, "Manual trigger received");
                tokio::spawn(on_trigger());
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept trigger connection");
                time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
