//! Focus Guard Core - Sessions, page relevance, and network rules.
//!
//! This crate holds the engine behind a focus session:
//!
//! - Domain normalization and list matching
//! - Rate-limited scheduling of remote classifier calls
//! - Two-tier relevance cache (task + domain)
//! - Classification pipeline with keyword fallback
//! - Network block rule synchronization
//! - Session lifecycle with end timer and daily quota
//! - Navigation routing for tab events
//!
//! # Example
//!
//! ```no_run
//! use focus_core::domain;
//!
//! assert_eq!(domain::normalize("https://www.Reddit.com/r/all").as_deref(), Some("reddit.com"));
//! ```

pub mod cache;
pub mod classifier;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod network_rules;
pub mod notifications;
pub mod scheduler;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheConfig, RelevanceCache};
pub use classifier::{
    ClassificationPipeline, Decision, DecisionSource, HttpClassifier, PageElement, PageSnapshot,
    RemoteClassifier,
};
pub use dispatch::{BroadcastDispatcher, DispatchTarget, Envelope, TabDispatcher, TabId, TabMessage};
pub use engine::{FocusEngine, NavigationVerdict};
pub use network_rules::{BlockRule, NetworkRuleSync, RuleStore, RuleStoreError, RuleSyncError};
pub use notifications::{Notice, NotificationManager, SilentNotifier, UserNotifier};
pub use scheduler::{RequestScheduler, SchedulerConfig};
pub use session::{
    EndOutcome, Entitlements, Plan, RestoreOutcome, Session, SessionAnalytics, SessionDeps,
    SessionError, SessionManager, SessionStore, StoreError, Subscription,
};
pub use settings::{Settings, SettingsError, SettingsSource};
