//! LAN gateway discovery.
//!
//! The locator sweeps the host's /24 with bounded concurrency and caches the
//! first address that answers like a gateway. The cache is dropped after a
//! run of consecutive failed reads so a DHCP-renumbered gateway is found
//! again on the next cycle.

use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use anyhow::{bail, Context, Result};
use tokio::{
    net::UdpSocket,
    sync::{Mutex, RwLock, Semaphore},
    task::JoinSet,
};
use tracing::{info, warn};

use crate::ecowitt::GatewayClient;

/// Upper bound on probes in flight during a sweep.
pub const MAX_IN_FLIGHT_PROBES: usize = 50;

/// Gateways serve their status page on plain HTTP.
pub const GATEWAY_PORT: u16 = 80;

#[derive(Debug, Clone)]
pub struct DeviceLocator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    gateway: GatewayClient,
    /// Operator-supplied address; never invalidated.
    pinned: Option<SocketAddr>,
    cached: RwLock<Option<SocketAddr>>,
    /// Serialises sweeps so a manual trigger racing the poll doesn't scan twice.
    sweep_lock: Mutex<()>,
    consecutive_failures: AtomicU32,
    failure_limit: u32,
}

impl DeviceLocator {
    pub fn new(gateway: GatewayClient, pinned: Option<SocketAddr>, failure_limit: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                pinned,
                cached: RwLock::new(None),
                sweep_lock: Mutex::new(()),
                consecutive_failures: AtomicU32::new(0),
                failure_limit: failure_limit.max(1),
            }),
        }
    }

    /// Currently cached (or pinned) gateway address, without scanning.
    pub async fn cached(&self) -> Option<SocketAddr> {
        match self.inner.pinned {
            Some(addr) => Some(addr),
            None => *self.inner.cached.read().await,
        }
    }

    /// Return the gateway address, sweeping the local subnet if none is
    /// cached. `None` is transient: the caller retries next cycle.
    pub async fn locate(&self) -> Option<SocketAddr> {
        if let Some(addr) = self.cached().await {
            return Some(addr);
        }

        let _sweep = self.inner.sweep_lock.lock().await;
        // Another task may have finished a sweep while we waited.
        if let Some(addr) = *self.inner.cached.read().await {
            return Some(addr);
        }

        let local = match local_ipv4().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(error = %e, "Cannot determine local subnet; skipping discovery");
                return None;
            }
        };

        info!(local_ip = %local, "Scanning subnet for gateway");
        let gateway = self.inner.gateway.clone();
        let found = sweep(subnet_hosts(local), MAX_IN_FLIGHT_PROBES, move |addr| {
            let gateway = gateway.clone();
            async move { gateway.is_gateway(addr).await }
        })
        .await;

        match found {
            Some(addr) => {
                info!(gateway = %addr, "Found gateway");
                *self.inner.cached.write().await = Some(addr);
                self.inner.consecutive_failures.store(0, Ordering::Relaxed);
            }
            None => warn!("No gateway found on local subnet"),
        }
        found
    }

    pub fn report_success(&self) {
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failed read; once `failure_limit` is reached in a row the
    /// cached address is dropped so the next cycle rediscovers.
    pub async fn report_failure(&self) {
        let failures = self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.inner.pinned.is_some() || failures < self.inner.failure_limit {
            return;
        }
        if let Some(stale) = self.inner.cached.write().await.take() {
            warn!(gateway = %stale, failures, "Dropping cached gateway address after repeated read failures");
        }
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
    }
}

/// Probe `candidates` with at most `max_in_flight` concurrent probes and
/// return the first address whose probe succeeds.
///
/// Returns as soon as one probe succeeds; unfinished probes are aborted when
/// the join set is dropped.
pub async fn sweep<I, F, Fut>(candidates: I, max_in_flight: usize, probe: F) -> Option<SocketAddr>
where
    I: IntoIterator<Item = SocketAddr>,
    F: Fn(SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let probe = Arc::new(probe);
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut probes = JoinSet::new();

    for addr in candidates {
        let probe = Arc::clone(&probe);
        let permits = Arc::clone(&permits);
        probes.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            probe(addr).await.then_some(addr)
        });
    }

    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(Some(addr)) => return Some(addr),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Discovery probe task failed"),
        }
    }
    None
}

/// Every host address in the /24 containing `ip`, on the gateway port.
pub fn subnet_hosts(ip: Ipv4Addr) -> impl Iterator<Item = SocketAddr> {
    let [a, b, c, _] = ip.octets();
    (1..=254u8).map(move |d| SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), GATEWAY_PORT))
}

/// Address of the interface the OS would route outbound traffic through.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
async fn local_ipv4() -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .context("Failed to bind UDP socket")?;
    socket
        .connect((Ipv4Addr::new(10, 255, 255, 255), 1))
        .await
        .context("No outbound route")?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
        other => bail!("no usable IPv4 LAN address (got {other})"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
