//! Per-client token-bucket rate limiting.
//!
//! Flow Overview:
//! 1) Each client key owns a bucket holding at most `burst` tokens, refilled at
//!    `requests_per_second`.
//! 2) A request consumes one token; an empty bucket yields `Limited` with the
//!    time until the next token.
//! 3) A janitor task evicts clients idle longer than `idle_timeout`, keeping the
//!    table bounded under churn of distinct keys.
//!
//! All table operations go through one mutex. The lock is never held across an
//! `.await`, so store calls later in the pipeline never serialize other clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, trace};

const DEFAULT_REQUESTS_PER_SECOND: f64 = 2.0;
const DEFAULT_BURST: u32 = 4;
const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RateLimitConfigError {
    #[error("requests per second must be a positive number, got {0}")]
    InvalidRate(f64),
    #[error("burst must be at least 1")]
    ZeroBurst,
    #[error("janitor interval must be greater than zero")]
    ZeroJanitorInterval,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    requests_per_second: f64,
    burst: u32,
    enabled: bool,
    janitor_interval: Duration,
    idle_timeout: Duration,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst: DEFAULT_BURST,
            enabled: true,
            janitor_interval: DEFAULT_JANITOR_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_janitor_interval(mut self, interval: Duration) -> Self {
        self.janitor_interval = interval;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    #[must_use]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn janitor_interval(&self) -> Duration {
        self.janitor_interval
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// # Errors
    /// Returns an error if the rate is not a finite positive number, the burst
    /// is zero, or the janitor interval is zero.
    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(RateLimitConfigError::InvalidRate(self.requests_per_second));
        }
        if self.burst == 0 {
            return Err(RateLimitConfigError::ZeroBurst);
        }
        if self.janitor_interval.is_zero() {
            return Err(RateLimitConfigError::ZeroJanitorInterval);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    /// A disabled limiter is skipped entirely, including client key derivation.
    fn is_enabled(&self) -> bool {
        true
    }

    fn check(&self, key: &str) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn is_enabled(&self) -> bool {
        false
    }

    fn check(&self, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug)]
struct ClientState {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Process-local limiter holding one bucket per client key.
#[derive(Debug)]
pub struct ClientRateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, ClientState>>,
}

impl ClientRateLimiter {
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clients: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<String, ClientState>> {
        // Buckets are updated field by field; a poisoned table is still usable.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check `key` as of `now`. Clients first seen start with a full bucket.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed;
        }

        let rate = self.config.requests_per_second;
        let capacity = f64::from(self.config.burst);

        let mut clients = self.clients();
        let state = clients.entry(key.to_string()).or_insert_with(|| ClientState {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        });

        state.last_seen = now;
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            RateLimitDecision::Allowed
        } else {
            // Very small rates put the next token beyond what a Duration holds.
            let retry_after = Duration::try_from_secs_f64((1.0 - state.tokens) / rate)
                .unwrap_or(Duration::MAX);
            RateLimitDecision::Limited { retry_after }
        }
    }

    /// Drop clients idle longer than the configured timeout as of `now`.
    /// Returns how many were evicted.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, state| now.saturating_duration_since(state.last_seen) <= idle_timeout);
        before - clients.len()
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients().len()
    }

    /// Spawn the periodic eviction task. It runs until [`JanitorHandle::stop`]
    /// is called or the handle is dropped.
    #[must_use]
    pub fn start_janitor(self: &Arc<Self>) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let limiter = Arc::clone(self);
        let period = self.config.janitor_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle_at(Instant::now());
                        if evicted > 0 {
                            debug!(evicted, remaining = limiter.tracked_clients(), "evicted idle rate limit clients");
                        } else {
                            trace!("rate limit janitor found no idle clients");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            debug!("rate limit janitor stopped");
        });

        JanitorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl RateLimiter for ClientRateLimiter {
    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }
}

/// Owner of a running janitor task.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// Signal the janitor and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            debug!("rate limit janitor ended abnormally: {err}");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
