//! In-memory fakes shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::classifier::{ClassificationPipeline, RemoteClassifier};
use crate::dispatch::{DispatchTarget, TabDispatcher, TabMessage};
use crate::engine::FocusEngine;
use crate::network_rules::{InMemoryRuleStore, NetworkRuleSync};
use crate::notifications::{Notice, UserNotifier};
use crate::scheduler::{RemoteResponse, RequestScheduler, SchedulerConfig, TransportError};
use crate::session::{
    Entitlements, Session, SessionAnalytics, SessionDeps, SessionManager, SessionStore,
    StoreError, Subscription,
};
use crate::settings::{InMemorySettings, Settings, SettingsSource};

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl UserNotifier for RecordingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}

/// Scripted remote classifier.
#[derive(Debug)]
pub struct FakeRemote {
    reply: Result<RemoteResponse, TransportError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::replying(RemoteResponse::ok(
            r#"{"text":"{\"action\":\"allow\",\"score\":90,\"reason\":\"relevant\"}"}"#,
        ))
    }
}

impl FakeRemote {
    pub fn replying(response: RemoteResponse) -> Self {
        Self {
            reply: Ok(response),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(TransportError("connection refused".into())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replies with `response` after `delay`.
    pub fn delayed(response: RemoteResponse, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying(response)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClassifier for FakeRemote {
    async fn send(
        &self,
        _settings: &Settings,
        _prompt: &str,
        _max_output_tokens: u32,
    ) -> Result<RemoteResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
    failing: AtomicBool,
}

impl MemorySessionStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_from_now();
        store
    }

    pub fn fail_from_now(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    pub fn put(&self, session: Session) {
        *self.session.lock() = Some(session);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>, StoreError> {
        self.check()?;
        Ok(self.get())
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.check()?;
        self.put(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        *self.session.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeEntitlements {
    subscription: Mutex<Subscription>,
    today: AtomicU32,
}

impl FakeEntitlements {
    pub fn set_subscription(&self, subscription: Subscription) {
        *self.subscription.lock() = subscription;
    }

    pub fn set_sessions_today(&self, count: u32) {
        self.today.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Entitlements for FakeEntitlements {
    async fn subscription(&self) -> Result<Subscription, StoreError> {
        Ok(self.subscription.lock().clone())
    }

    async fn sessions_today(&self, _now: DateTime<Utc>) -> Result<u32, StoreError> {
        Ok(self.today.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default)]
pub struct FakeAnalytics {
    starts: AtomicUsize,
    ends: AtomicUsize,
    failing: AtomicBool,
}

impl FakeAnalytics {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }

    pub fn fail_from_now(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionAnalytics for FakeAnalytics {
    async fn record_start(&self, _session: &Session) -> Result<(), StoreError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_end(&self, _session: &Session, _ended_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError("analytics unavailable".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<(DispatchTarget, TabMessage)>>,
}

impl RecordingDispatcher {
    pub fn messages(&self) -> Vec<(DispatchTarget, TabMessage)> {
        self.messages.lock().clone()
    }
}

impl TabDispatcher for RecordingDispatcher {
    fn dispatch(&self, target: DispatchTarget, message: TabMessage) {
        self.messages.lock().push((target, message));
    }
}

/// Fully wired core with in-memory collaborators.
pub struct Fixture {
    pub sessions: SessionManager,
    pub engine: Arc<FocusEngine>,
    pub settings: Arc<InMemorySettings>,
    pub store: Arc<MemorySessionStore>,
    pub entitlements: Arc<FakeEntitlements>,
    pub analytics: Arc<FakeAnalytics>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub remote: Arc<FakeRemote>,
    pub pipeline: Arc<ClassificationPipeline>,
    pub rules: Arc<NetworkRuleSync>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(MemorySessionStore::default(), FakeRemote::default())
    }

    pub fn with_store(store: MemorySessionStore) -> Self {
        Self::build(store, FakeRemote::default())
    }

    pub fn with_remote(remote: FakeRemote) -> Self {
        Self::build(MemorySessionStore::default(), remote)
    }

    fn build(store: MemorySessionStore, remote: FakeRemote) -> Self {
        let settings = Arc::new(InMemorySettings::new(Settings {
            api_key: Some("test-key".into()),
            always_block: vec!["reddit.com".into()],
            ..Default::default()
        }));
        let settings_source: Arc<dyn SettingsSource> = settings.clone();
        let store = Arc::new(store);
        let entitlements = Arc::new(FakeEntitlements::default());
        let analytics = Arc::new(FakeAnalytics::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let remote = Arc::new(remote);
        let rules = Arc::new(NetworkRuleSync::new(Arc::new(InMemoryRuleStore::new())));

        let scheduler = Arc::new(RequestScheduler::new(
            SchedulerConfig::default(),
            notifier.clone(),
        ));
        let pipeline = Arc::new(ClassificationPipeline::new(
            settings_source.clone(),
            remote.clone(),
            scheduler,
            notifier.clone(),
        ));

        let sessions = SessionManager::new(SessionDeps {
            store: store.clone(),
            entitlements: entitlements.clone(),
            analytics: analytics.clone(),
            settings: settings_source.clone(),
            rules: rules.clone(),
            pipeline: pipeline.clone(),
            dispatcher: dispatcher.clone(),
        });
        let engine = Arc::new(FocusEngine::new(
            sessions.clone(),
            pipeline.clone(),
            rules.clone(),
            settings_source,
            dispatcher.clone(),
        ));

        Self {
            sessions,
            engine,
            settings,
            store,
            entitlements,
            analytics,
            dispatcher,
            notifier,
            remote,
            pipeline,
            rules,
        }
    }

    /// Hostnames of the installed managed rules.
    pub async fn rule_hosts(&self) -> Vec<String> {
        self.rules
            .rules()
            .await
            .map(|rules| rules.into_iter().map(|r| r.hostname).collect())
            .unwrap_or_default()
    }
}
