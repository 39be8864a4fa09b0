//! Application state and the admin API's per-address request budget.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use lure_storage::MemoryStorage;
use lure_tracker::ResultTracker;
use tokio::sync::Mutex;

use crate::config::TrackingConfig;

/// Requests seen from one address since `started`.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    requests: u64,
}

/// Fixed-window request budget per client address.
///
/// Windows that have run out are dropped on every check, so the map only
/// holds addresses seen within the last `period`.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    limit: u64,
    period: Duration,
}

impl RateLimiter {
    pub(crate) fn new(limit: u64, period: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            period,
        }
    }

    pub(crate) fn per_minute(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit
    }

    /// Count a request from `ip`. `Err` carries the seconds until the
    /// address's window reopens.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < self.period);

        let window = windows.entry(ip).or_insert(Window {
            started: now,
            requests: 0,
        });
        window.requests += 1;
        if window.requests <= self.limit {
            return Ok(());
        }
        let left = self.period.saturating_sub(now.duration_since(window.started));
        Err(left.as_secs().max(1))
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) tracker: ResultTracker<MemoryStorage>,
    pub(crate) rate_limiter: RateLimiter,
    /// Optional API key for the admin API. None = no auth required.
    pub(crate) api_key: Option<String>,
    pub(crate) tracking: TrackingConfig,
    pub(crate) trust_forwarded_for: bool,
    /// Where the store is flushed periodically and on shutdown.
    pub(crate) data_file: Option<PathBuf>,
}

impl AppState {
    /// Source address of a hit: the peer, or the first `X-Forwarded-For`
    /// entry when the server sits behind a trusted proxy.
    pub(crate) fn client_ip(&self, peer: SocketAddr, headers: &HeaderMap) -> String {
        if self.trust_forwarded_for {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }
        peer.ip().to_string()
    }
}
