//! Non-blocking user notifications.
//!
//! Notices are surfaced when the remote classifier is throttled or when the
//! pipeline degrades to keyword matching. Delivery is best-effort and
//! rate-limited so a burst of failing pages does not produce a notification
//! storm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Minimum time between notifications (60 seconds).
const RATE_LIMIT_DURATION: Duration = Duration::from_secs(60);

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The classifier answered 429; the call is retried after `wait`.
    Throttled { wait: Duration },
    /// Classification fell back to keywords because of rate limits.
    FallbackRateLimited,
    /// Classification fell back to keywords because of an API error.
    FallbackApiError,
}

impl Notice {
    /// Notification title.
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Throttled { .. } | Notice::FallbackRateLimited => "Focus Guard - Rate Limited",
            Notice::FallbackApiError => "Focus Guard - API Error",
        }
    }

    /// Notification body.
    pub fn body(&self) -> String {
        match self {
            Notice::Throttled { wait } => format!(
                "Too many requests. Waiting {}s before retry...",
                wait.as_secs_f64().round() as u64
            ),
            Notice::FallbackRateLimited => "Using keyword matching due to rate limits.".to_string(),
            Notice::FallbackApiError => {
                "Using keyword matching. Check API key in settings.".to_string()
            }
        }
    }
}

/// Sink for user-visible notices. Implementations must not block.
pub trait UserNotifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl UserNotifier for SilentNotifier {
    fn notify(&self, _notice: &Notice) {}
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Whether notifications are enabled.
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Result of attempting to send a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Notification was sent successfully.
    Sent,
    /// Notification was rate-limited (too soon after last one).
    RateLimited,
    /// Notifications are disabled.
    Disabled,
    /// Failed to send notification.
    Failed(String),
}

impl NotificationResult {
    /// Returns true if the notification was sent.
    pub fn was_sent(&self) -> bool {
        matches!(self, NotificationResult::Sent)
    }
}

#[derive(Debug, Default)]
struct RateLimitState {
    last_notification: Option<Instant>,
}

/// Desktop notifier with rate limiting.
#[derive(Debug, Clone, Default)]
pub struct NotificationManager {
    settings: Arc<RwLock<NotificationSettings>>,
    rate_limit: Arc<RwLock<RateLimitState>>,
}

impl NotificationManager {
    /// Creates a new notification manager with default settings (enabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new notification manager with the given settings.
    pub fn with_settings(settings: NotificationSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            rate_limit: Arc::new(RwLock::new(RateLimitState::default())),
        }
    }

    /// Returns whether notifications are enabled.
    pub fn is_enabled(&self) -> bool {
        self.settings.read().enabled
    }

    /// Sets whether notifications are enabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.settings.write().enabled = enabled;
    }

    /// Returns the time until the next notification can be sent.
    ///
    /// Returns `None` if a notification can be sent now.
    pub fn time_until_next(&self) -> Option<Duration> {
        let state = self.rate_limit.read();
        let elapsed = state.last_notification?.elapsed();
        (elapsed < RATE_LIMIT_DURATION).then(|| RATE_LIMIT_DURATION - elapsed)
    }

    /// Sends `notice` unless disabled or rate-limited.
    pub fn send(&self, notice: &Notice) -> NotificationResult {
        if !self.is_enabled() {
            return NotificationResult::Disabled;
        }
        if self.time_until_next().is_some() {
            return NotificationResult::RateLimited;
        }

        let result = self.show(notice);
        if result.was_sent() {
            self.rate_limit.write().last_notification = Some(Instant::now());
        }
        result
    }

    #[cfg(feature = "notifications")]
    fn show(&self, notice: &Notice) -> NotificationResult {
        use notify_rust::Notification;

        match Notification::new()
            .summary(notice.title())
            .body(&notice.body())
            .appname("Focus Guard")
            .timeout(notify_rust::Timeout::Milliseconds(5000))
            .show()
        {
            Ok(_) => NotificationResult::Sent,
            Err(e) => NotificationResult::Failed(e.to_string()),
        }
    }

    #[cfg(not(feature = "notifications"))]
    fn show(&self, _notice: &Notice) -> NotificationResult {
        NotificationResult::Sent
    }
}

impl UserNotifier for NotificationManager {
    fn notify(&self, notice: &Notice) {
        match self.send(notice) {
            NotificationResult::Failed(e) => {
                tracing::debug!(error = %e, "Notification failed (ignored)");
            }
            other => tracing::trace!(result = ?other, title = notice.title(), "Notification"),
        }
    }
}
