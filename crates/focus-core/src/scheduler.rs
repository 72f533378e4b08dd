//! Rate-limited request scheduler.
//!
//! Every outbound classification call goes through [`RequestScheduler`],
//! which
//!
//! 1. spaces calls at least `min_interval` apart across all callers,
//! 2. retries throttled (HTTP 429) responses, honoring `Retry-After`,
//! 3. retries transport errors and other non-2xx responses with a shorter
//!    backoff,
//! 4. gives up with [`SchedulerError::ExhaustedRetries`] at the attempt
//!    ceiling.
//!
//! Callers are ordered by a single shared "next free slot" instant. Each
//! caller reserves its slot under a short lock and then sleeps outside it, so
//! concurrent callers queue up by construction without holding a lock across
//! the wait.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::notifications::{Notice, SilentNotifier, UserNotifier};

/// Minimum spacing between outbound calls.
pub const MIN_INTERVAL: Duration = Duration::from_secs(2);

/// Default attempt ceiling (first call included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Longest server `Retry-After` hint that is honored as given.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP status used by the classifier to signal throttling.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between calls.
    pub min_interval: Duration,
    /// Maximum attempts per scheduled call.
    pub max_attempts: u32,
    /// Backoff base after a 429 without `Retry-After`.
    pub throttle_backoff: Duration,
    /// Backoff base after a transient error.
    pub error_backoff: Duration,
    /// Upper bound applied to `Retry-After` hints.
    pub max_retry_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval: MIN_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            throttle_backoff: Duration::from_secs(2),
            error_backoff: Duration::from_secs(1),
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }
}

/// Raw response of a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    /// Server-provided retry hint.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl RemoteResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for HTTP 429.
    pub fn is_throttled(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }
}

/// Network-level failure of a single call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Scheduler failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    /// Every attempt failed.
    #[error("exhausted {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: String,
        /// Whether the last failure was a 429.
        throttled: bool,
    },
}

impl SchedulerError {
    /// Returns true if the final failure was throttling.
    pub fn was_throttled(&self) -> bool {
        match self {
            SchedulerError::ExhaustedRetries { throttled, .. } => *throttled,
        }
    }
}

/// Serializes outbound calls and retries failures.
pub struct RequestScheduler {
    /// Instant at which the most recently reserved call is issued.
    last_call: Mutex<Option<Instant>>,
    config: SchedulerConfig,
    notifier: Arc<dyn UserNotifier>,
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("last_call", &*self.last_call.lock())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for RequestScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), Arc::new(SilentNotifier))
    }
}

impl RequestScheduler {
    /// Creates a scheduler with no prior call recorded.
    pub fn new(config: SchedulerConfig, notifier: Arc<dyn UserNotifier>) -> Self {
        Self {
            last_call: Mutex::new(None),
            config,
            notifier,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Reserves the next free call slot and returns when it starts.
    fn reserve_slot(&self) -> Instant {
        let mut last = self.last_call.lock();
        let now = Instant::now();
        let slot = match *last {
            Some(prev) => now.max(prev + self.config.min_interval),
            None => now,
        };
        *last = Some(slot);
        slot
    }

    fn backoff(base: Duration, attempt: u32) -> Duration {
        base.saturating_mul(1u32 << attempt.min(16))
    }

    /// Runs `call` under the spacing and retry policy.
    pub async fn schedule<F, Fut>(&self, mut call: F) -> Result<RemoteResponse, SchedulerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RemoteResponse, TransportError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();
        let mut throttled = false;

        for attempt in 0..max_attempts {
            let slot = self.reserve_slot();
            let wait = slot.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limiting: waiting before call");
            }
            tokio::time::sleep_until(slot).await;

            let is_last = attempt + 1 == max_attempts;
            let wait = match call().await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.is_throttled() => {
                    throttled = true;
                    last_error = format!("HTTP {}", response.status);
                    let wait = match response.retry_after {
                        Some(hint) => hint.min(self.config.max_retry_after),
                        None => Self::backoff(self.config.throttle_backoff, attempt),
                    };
                    if !is_last {
                        tracing::warn!(
                            wait_ms = wait.as_millis() as u64,
                            attempt = attempt + 1,
                            max_attempts,
                            "Rate limited (429), backing off"
                        );
                        if attempt == 0 {
                            self.notifier.notify(&Notice::Throttled { wait });
                        }
                    }
                    wait
                }
                Ok(response) => {
                    throttled = false;
                    last_error = format!(
                        "HTTP {}: {}",
                        response.status,
                        response.body.chars().take(200).collect::<String>()
                    );
                    Self::backoff(self.config.error_backoff, attempt)
                }
                Err(e) => {
                    throttled = false;
                    last_error = e.to_string();
                    Self::backoff(self.config.error_backoff, attempt)
                }
            };

            if is_last {
                break;
            }
            if !throttled {
                tracing::debug!(error = %last_error, wait_ms = wait.as_millis() as u64, "Call failed, retrying");
            }
            tokio::time::sleep(wait).await;
        }

        Err(SchedulerError::ExhaustedRetries {
            attempts: max_attempts,
            last_error,
            throttled,
        })
    }
}
