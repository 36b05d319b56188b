pub mod models;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::{config::CloudCredentials, sensors::Channel};

use self::models::{history_series, realtime_temperatures, EcowittResponse, LiveData};

/// Status path served by the LAN gateway.
pub const GATEWAY_STATUS_PATH: &str = "/get_livedata_info";

/// Substring that identifies a genuine gateway status response.
pub const GATEWAY_MARKER: &str = "common_list";

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
pub const GATEWAY_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const CLOUD_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// LAN gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GatewayClient {
    http: Client,
}

impl GatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn status_url(addr: SocketAddr) -> String {
        format!("http://{addr}{GATEWAY_STATUS_PATH}")
    }

    /// Short-timeout probe used by discovery: `true` only for an HTTP 200
    /// whose body carries [`GATEWAY_MARKER`].
    pub async fn is_gateway(&self, addr: SocketAddr) -> bool {
        let resp = match self
            .http
            .get(Self::status_url(addr))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status() == StatusCode::OK => resp,
            _ => return false,
        };
        resp.text()
            .await
            .map(|body| body.contains(GATEWAY_MARKER))
            .unwrap_or(false)
    }

    /// Fetch the live snapshot from the gateway at `addr`.
    pub async fn read_current(&self, addr: SocketAddr) -> Result<Vec<(Channel, f64)>> {
        let url = Self::status_url(addr);
        debug!(url = %url, "Fetching gateway live data");

        let live = self
            .http
            .get(&url)
            .timeout(GATEWAY_READ_TIMEOUT)
            .send()
            .await
            .context("Gateway live data request failed")?
            .error_for_status()
            .context("Gateway returned error status")?
            .json::<LiveData>()
            .await
            .context("Failed to deserialize gateway live data")?;

        Ok(live.temperatures())
    }
}

// ---------------------------------------------------------------------------
// Cloud API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CloudClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    credentials: CloudCredentials,
}

impl CloudClient {
    pub fn new(base_url: &str, credentials: CloudCredentials) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: base_url.trim_end_matches('/').to_owned(),
                credentials,
            }),
        }
    }

    /// Perform a signed-by-query-string GET and unwrap the `{code, msg, data}`
    /// envelope.
    async fn request(
        &self,
        endpoint: &str,
        extra: &[(&str, String)],
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let creds = &self.inner.credentials;
        let mut params: Vec<(&str, String)> = vec![
            ("application_key", creds.application_key.clone()),
            ("api_key", creds.api_key.clone()),
            ("mac", creds.mac.clone()),
        ];
        params.extend(extra.iter().cloned());

        let url = Url::parse_with_params(&format!("{}/{}", self.inner.base_url, endpoint), &params)
            .with_context(|| format!("invalid Ecowitt URL for endpoint {endpoint}"))?;
        debug!(endpoint = %endpoint, "Calling Ecowitt cloud API");

        self.inner
            .http
            .get(url)
            .timeout(CLOUD_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Ecowitt {endpoint} request failed"))?
            .error_for_status()
            .with_context(|| format!("Ecowitt {endpoint} returned error status"))?
            .json::<EcowittResponse>()
            .await
            .with_context(|| format!("Failed to deserialize Ecowitt {endpoint} response"))?
            .into_result()
            .with_context(|| format!("Ecowitt {endpoint} API call failed"))
    }

    /// Current temperatures for every channel the account reports.
    pub async fn read_current(&self) -> Result<Vec<(Channel, f64)>> {
        let data = self
            .request("device/real_time", &[("call_back", "all".to_owned())])
            .await?;
        Ok(realtime_temperatures(&data))
    }

    /// Temperature history for one channel between `start` and `end`.
    ///
    /// The endpoint rejects `call_back=all`, so each channel is its own call.
    pub async fn read_history(
        &self,
        channel: Channel,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let key = channel.cloud_history_key();
        let data = self
            .request(
                "device/history",
                &[
                    ("start_date", format_cloud_time(start)),
                    ("end_date", format_cloud_time(end)),
                    ("call_back", key.clone()),
                ],
            )
            .await?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(history_series(&data, &key)?
            .map(|series| series.points())
            .unwrap_or_default())
    }
}

/// The cloud API takes local wall-clock time as `YYYY-MM-DD HH:MM:SS`.
fn format_cloud_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
