use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use url::Url;

use crate::core::estimate::{SpeedEstimate, SpeedEstimator};

/// How long a failure keeps a host marked as recently failed.
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(300);

// Weight of the previous estimate when a new sample arrives.
const SMOOTHING: f64 = 0.75;

#[derive(Debug, Default, Clone, Copy)]
struct HostRecord {
    speed:     f64,
    failed_at: Option<Instant>,
}

/// In-memory per-host throughput estimates.
///
/// Hosts are keyed by `host:port`, so mirrors on the same server share a record.
/// Nothing is persisted; a fresh process starts with every host untested.
#[derive(Debug)]
pub struct HostTimings {
    hosts:          Mutex<HashMap<String, HostRecord>>,
    failure_window: Duration,
}

impl Default for HostTimings {
    fn default() -> Self { Self::new() }
}

impl HostTimings {
    pub fn new() -> Self { Self::with_failure_window(DEFAULT_FAILURE_WINDOW) }

    pub fn with_failure_window(failure_window: Duration) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            failure_window,
        }
    }

    fn hosts(&self) -> MutexGuard<'_, HashMap<String, HostRecord>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn host_key(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| {
                let host = u.host_str()?.to_ascii_lowercase();
                Some(match u.port_or_known_default() {
                    Some(port) => format!("{host}:{port}"),
                    None => host,
                })
            })
            .unwrap_or_else(|| url.to_string())
    }

    /// Fold one completed transfer into the host's speed estimate and clear its failure mark.
    pub fn record_success(&self, url: &str, bytes: u64, elapsed: Duration) {
        let secs = elapsed.as_secs_f64().max(1e-3);
        let sample = bytes as f64 / secs;

        let mut hosts = self.hosts();
        let record = hosts.entry(Self::host_key(url)).or_default();
        record.speed = if record.speed > 0.0 {
            record.speed * SMOOTHING + sample * (1.0 - SMOOTHING)
        } else {
            sample
        };
        record.failed_at = None;
    }

    pub fn record_failure(&self, url: &str) {
        self.hosts().entry(Self::host_key(url)).or_default().failed_at = Some(Instant::now());
    }
}

impl SpeedEstimator for HostTimings {
    fn estimate(&self, url: &str) -> SpeedEstimate {
        let hosts = self.hosts();
        let Some(record) = hosts.get(&Self::host_key(url)) else {
            return SpeedEstimate::default();
        };
        SpeedEstimate {
            speed:           record.speed,
            recently_failed: record
                .failed_at
                .is_some_and(|at| at.elapsed() < self.failure_window),
        }
    }
}
