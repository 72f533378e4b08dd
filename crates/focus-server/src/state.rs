//! Application state for the API server.

use std::sync::Arc;

use focus_core::{
    BroadcastDispatcher, ClassificationPipeline, FocusEngine, NetworkRuleSync, RelevanceCache,
    RemoteClassifier, RequestScheduler, SchedulerConfig, SessionDeps, SessionManager,
    UserNotifier,
};
use focus_storage::Database;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Arc<Database>,
    /// Navigation routing, sessions, and classification.
    pub engine: Arc<FocusEngine>,
    /// Tab message outbox streamed on `/api/events`.
    pub outbox: BroadcastDispatcher,
}

impl AppState {
    /// Wires the engine on top of `db`.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteClassifier>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self::with_config(db, remote, notifier, SchedulerConfig::default(), RelevanceCache::default())
    }

    /// Like [`AppState::new`] with explicit scheduler and cache tuning.
    pub fn with_config(
        db: Database,
        remote: Arc<dyn RemoteClassifier>,
        notifier: Arc<dyn UserNotifier>,
        scheduler: SchedulerConfig,
        cache: RelevanceCache,
    ) -> Self {
        let db = Arc::new(db);
        let outbox = BroadcastDispatcher::default();
        let dispatcher = Arc::new(outbox.clone());
        let rules = Arc::new(NetworkRuleSync::new(db.clone()));

        let scheduler = Arc::new(RequestScheduler::new(scheduler, notifier.clone()));
        let pipeline = Arc::new(
            ClassificationPipeline::new(db.clone(), remote, scheduler, notifier).with_cache(cache),
        );

        let sessions = SessionManager::new(SessionDeps {
            store: db.clone(),
            entitlements: db.clone(),
            analytics: db.clone(),
            settings: db.clone(),
            rules: rules.clone(),
            pipeline: pipeline.clone(),
            dispatcher: dispatcher.clone(),
        });
        let engine = Arc::new(FocusEngine::new(sessions, pipeline, rules, db.clone(), dispatcher));

        Self { db, engine, outbox }
    }
}
