//! Single-shot HTTP probe.
//!
//! [`HttpProber::probe`] performs exactly one GET against the target and
//! always returns a [`ProbeResult`]: transport errors, timeouts and non-2xx
//! statuses are recorded as `success = false`, never raised. There are no
//! retries here.

pub mod mock;

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::warn;

use crate::storage::model::ProbeResult;

/// Hard upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Something that can check the target once.
pub trait Probe: Send + Sync {
    fn probe(&self) -> impl Future<Output = ProbeResult> + Send;
}

/// Why a probe was classified as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// No response within the probe bound.
    Timeout,
    /// Connection, TLS or protocol error.
    Transport(String),
    /// The target answered with a non-2xx status.
    Status(u16),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timed out"),
            ProbeFailure::Transport(msg) => write!(f, "transport error: {}", msg),
            ProbeFailure::Status(code) => write!(f, "HTTP status {}", code),
        }
    }
}

impl std::error::Error for ProbeFailure {}

impl From<reqwest::Error> for ProbeFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeFailure::Timeout
        } else {
            ProbeFailure::Transport(err.to_string())
        }
    }
}

/// Probes `target_url + health_path` with a bounded GET.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(target_url: &str, health_path: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: join_url(target_url, health_path),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Probe for HttpProber {
    async fn probe(&self) -> ProbeResult {
        let instant = Utc::now();
        let started = Instant::now();

        let sent = tokio::time::timeout(
            self.timeout,
            self.client
                .get(&self.url)
                .header(ACCEPT, "application/json")
                .send(),
        )
        .await;

        // Headers received (or bound hit); the body is never read.
        let bound_ms = self.timeout.as_millis() as u64;
        let latency_ms = (started.elapsed().as_millis() as u64).min(bound_ms);

        let (status_code, outcome) = match sent {
            Err(_) => (None, Err(ProbeFailure::Timeout)),
            Ok(Err(e)) => (None, Err(ProbeFailure::from(e))),
            Ok(Ok(response)) => {
                let status = response.status();
                let code = status.as_u16();
                if status.is_success() {
                    (Some(code), Ok(()))
                } else {
                    (Some(code), Err(ProbeFailure::Status(code)))
                }
            }
        };

        if let Err(failure) = &outcome {
            warn!("Probe {} failed after {}ms: {}", self.url, latency_ms, failure);
        }

        ProbeResult {
            instant,
            success: outcome.is_ok(),
            latency_ms,
            status_code,
        }
    }
}

/// Joins a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
