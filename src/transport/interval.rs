//! Per-host minimum interval between requests.
//!
//! Sites declare a `(min, max)` interval; each request to a host waits until
//! a random delay in that range has passed since the previous request to the
//! same host. The first request to a host proceeds immediately.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Per-host request pacing, shareable across tasks behind an `Arc`.
#[derive(Debug)]
pub struct RequestInterval {
    min: Duration,
    max: Duration,
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl RequestInterval {
    /// Creates an interval drawing delays uniformly from `min..=max`.
    ///
    /// `max` below `min` is raised to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            hosts: DashMap::new(),
        }
    }

    /// Creates a fixed interval.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Creates an interval from fractional seconds, as sites declare them.
    #[must_use]
    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(
            Duration::from_secs_f64(min.max(0.0)),
            Duration::from_secs_f64(max.max(0.0)),
        )
    }

    /// Returns the configured bounds.
    #[must_use]
    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    /// Waits until a request to `url`'s host is allowed.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.max.is_zero() {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", &host);

        // Clone the Arc so the DashMap shard lock is released before awaiting.
        let slot = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let wait = self.draw().saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                debug!(host = %host, delay_ms = wait.as_millis(), "pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn draw(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
