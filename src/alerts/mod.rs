pub mod dispatcher;

use std::{fmt, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, error, info};

pub use dispatcher::{AlertDispatcher, AlertEvent, AlertKind};

pub const DEFAULT_NTFY_URL: &str = "https://ntfy.sh";
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// ntfy message priority, sent verbatim in the `Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Min,
    Low,
    Default,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Push-notification transport: one POST per message to a topic URL.
#[derive(Debug, Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    topic_url: String,
}

impl Notifier {
    pub fn new(base_url: &str, topic: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                topic_url: format!("{}/{}", base_url.trim_end_matches('/'), topic),
            }),
        }
    }

    /// Deliver one message. Single attempt; failures are logged and reported
    /// as `false`.
    pub async fn send(&self, title: &str, body: &str, priority: Priority) -> bool {
        match self.try_send(title, body, priority).await {
            Ok(()) => {
                info!(title = %title, "Notification sent");
                true
            }
            Err(e) => {
                error!(title = %title, error = %format!("{e:#}"), "Failed to send notification");
                false
            }
        }
    }

    async fn try_send(&self, title: &str, body: &str, priority: Priority) -> Result<()> {
        debug!(url = %self.inner.topic_url, %priority, "Posting notification");
        self.inner
            .http
            .post(&self.inner.topic_url)
            .header("Title", title)
            .header("Priority", priority.to_string())
            .body(body.to_owned())
            .timeout(NOTIFY_TIMEOUT)
            .send()
            .await
            .context("Notification request failed")?
            .error_for_status()
            .context("Notification endpoint returned error status")?;
        Ok(())
    }
}
