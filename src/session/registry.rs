//! Per-client session state and the registry that owns it
//!
//! Sessions are opened on first sight of a client id and evicted once idle
//! for longer than the configured TTL. The registry refuses new sessions
//! while at capacity.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::demo::DemoBackend;
use crate::data::provider::{DataLayerContext, ProviderFactory, SharedServices};
use crate::store::storage::{FileStore, KeyValueStore, MemoryStore, StorageError};

use super::demo_session::DemoSession;
use super::guard::{NavigationOutcome, SessionEntryGuard, StoragePurge};
use super::path_memory::PathMemory;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("session capacity of {0} reached")]
    AtCapacity(usize),
}

/// Bounds on how many sessions the registry holds and for how long
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// A session untouched for longer than this is evicted
    pub idle_ttl: Duration,
    /// Upper bound on open sessions
    pub max_sessions: usize,
    /// How often the background sweep runs
    pub sweep_interval: std::time::Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::minutes(30),
            max_sessions: 10_000,
            sweep_interval: std::time::Duration::from_secs(60),
        }
    }
}

/// Everything one client (browser tab) owns
pub struct ClientSession {
    id: Uuid,
    short_lived: Arc<MemoryStore>,
    persisted: Arc<FileStore>,
    demo_session: Arc<DemoSession>,
    demo_data: Arc<DemoBackend>,
    guard: SessionEntryGuard,
    data: Arc<DataLayerContext>,
    path_memory: PathMemory,
    last_seen: Mutex<DateTime<Utc>>,
}

impl ClientSession {
    /// Open the session `id`, loading its persisted store from `data_dir`
    pub fn open(id: Uuid, data_dir: &Path, shared: SharedServices) -> Result<Self, StorageError> {
        let opened_at = shared.clock.now();
        let short_lived = Arc::new(MemoryStore::new());
        let persisted = Arc::new(FileStore::open(data_dir.join(format!("{}.json", id)))?);
        let demo_session = Arc::new(DemoSession::new());
        let demo_data = Arc::new(DemoBackend::seeded());
        let data = Arc::new(DataLayerContext::new(ProviderFactory::new(
            shared,
            demo_data.clone(),
            demo_session.clone(),
        )));

        let guard = SessionEntryGuard::new(vec![
            demo_session.clone(),
            demo_data.clone(),
            data.clone(),
            Arc::new(StoragePurge::new(short_lived.clone(), persisted.clone())),
        ]);
        let path_memory = PathMemory::new(persisted.clone());

        Ok(Self {
            id,
            short_lived,
            persisted,
            demo_session,
            demo_data,
            guard,
            data,
            path_memory,
            last_seen: Mutex::new(opened_at),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn short_lived(&self) -> Arc<dyn KeyValueStore> {
        self.short_lived.clone()
    }

    pub fn persisted(&self) -> Arc<dyn KeyValueStore> {
        self.persisted.clone()
    }

    pub fn demo_session(&self) -> &DemoSession {
        &self.demo_session
    }

    pub fn demo_data(&self) -> &DemoBackend {
        &self.demo_data
    }

    pub fn guard(&self) -> &SessionEntryGuard {
        &self.guard
    }

    pub fn data(&self) -> &DataLayerContext {
        &self.data
    }

    pub fn path_memory(&self) -> &PathMemory {
        &self.path_memory
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        *self.last_seen.lock()
    }

    fn touch(&self, now: DateTime<Utc>) {
        let mut last_seen = self.last_seen.lock();
        if now > *last_seen {
            *last_seen = now;
        }
    }

    /// Run the entry guard for `path` on the blocking pool; the persisted
    /// store's purge writes to disk. Resolves once the purge has finished.
    pub async fn enter(self: Arc<Self>, path: String) -> Result<NavigationOutcome, JoinError> {
        tokio::task::spawn_blocking(move || self.guard.on_navigate(&path)).await
    }
}

/// Live client sessions, keyed by the client's session id
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<ClientSession>>,
    data_dir: PathBuf,
    shared: SharedServices,
    limits: SessionLimits,
}

impl SessionRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, shared: SharedServices, limits: SessionLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            data_dir: data_dir.into(),
            shared,
            limits,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<ClientSession>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// The session for `id`, opened if new; either way it counts as seen now
    pub fn get_or_open(&self, id: Uuid) -> Result<Arc<ClientSession>, SessionError> {
        let now = self.shared.clock.now();
        if let Some(session) = self.get(&id) {
            session.touch(now);
            return Ok(session);
        }

        if self.sessions.len() >= self.limits.max_sessions {
            self.evict_idle();
            if self.sessions.len() >= self.limits.max_sessions {
                warn!(max_sessions = self.limits.max_sessions, "Refusing new client session");
                return Err(SessionError::AtCapacity(self.limits.max_sessions));
            }
        }

        match self.sessions.entry(id) {
            Entry::Occupied(entry) => {
                let session = entry.get().clone();
                session.touch(now);
                Ok(session)
            }
            Entry::Vacant(entry) => {
                let session = Arc::new(ClientSession::open(id, &self.data_dir, self.shared.clone())?);
                info!(session_id = %id, "Opened client session");
                entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Drop the in-memory half of a session; its persisted store stays on disk
    pub fn close(&self, id: &Uuid) -> Option<Arc<ClientSession>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Close every session idle for longer than the TTL; returns how many went
    pub fn evict_idle(&self) -> usize {
        let cutoff = self.shared.clock.now() - self.limits.idle_ttl;
        let mut evicted = 0;
        self.sessions.retain(|id, session| {
            let keep = session.last_seen() >= cutoff;
            if !keep {
                debug!(session_id = %id, "Evicting idle client session");
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            info!(evicted, remaining = self.sessions.len(), "Evicted idle client sessions");
        }
        evicted
    }

    /// Sweep idle sessions on an interval until the registry is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let every = self.limits.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_idle();
            }
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::permissions::PermissionMatrix;
    use crate::data::demo::{DEMO_PROJECT_ID, DEMO_TENANT_ID};
    use crate::data::module::ModuleKey;
    use crate::data::provider::DataMode;
    use crate::store::supabase::SupabaseClient;
    use crate::util::time::{ManualClock, SystemClock};
    use chrono::TimeZone;
    use serde_json::json;

    fn shared() -> SharedServices {
        shared_with(Arc::new(SystemClock))
    }

    fn shared_with(clock: Arc<dyn crate::util::time::Clock>) -> SharedServices {
        SharedServices {
            supabase: SupabaseClient::from_parts("http://127.0.0.1:9", "anon"),
            bucket: "project-files".to_string(),
            matrix: Arc::new(PermissionMatrix::standard()),
            clock,
        }
    }

    fn registry(dir: &Path, shared: SharedServices) -> SessionRegistry {
        SessionRegistry::new(dir, shared, SessionLimits::default())
    }

    fn manual_clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
    }

    #[test]
    fn same_id_yields_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), shared());
        let id = Uuid::new_v4();

        let a = registry.get_or_open(id).unwrap();
        let b = registry.get_or_open(id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.active_sessions(), 1);

        registry.get_or_open(Uuid::new_v4()).unwrap();
        assert_eq!(registry.active_sessions(), 2);
    }

    #[test]
    fn persisted_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), shared());
        let id = Uuid::new_v4();

        let session = registry.get_or_open(id).unwrap();
        session.path_memory().save_last_path("/app/projects", None).unwrap();
        session.short_lived().set("demo:draft", "{}").unwrap();
        registry.close(&id);

        let reopened = registry.get_or_open(id).unwrap();
        assert_eq!(reopened.path_memory().get_last_path("/app"), "/app/projects");
        assert_eq!(reopened.short_lived().get("demo:draft").unwrap(), None);
    }

    #[tokio::test]
    async fn entering_live_wipes_every_kind_of_demo_state() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), shared());
        let session = registry.get_or_open(Uuid::new_v4()).unwrap();

        session.guard().on_navigate("/demo/projects");
        let demo = session.data().for_path("/demo/projects", None);
        demo.accessor(DEMO_TENANT_ID, DEMO_PROJECT_ID, ModuleKey::Materials)
            .create(json!({"title": "Scratch pad"}))
            .await
            .unwrap();
        session.short_lived().set("demo:filters", "[]").unwrap();
        session.persisted().set("demo:tour_seen", "true").unwrap();
        session.persisted().set("theme", "dark").unwrap();
        let seeded = crate::data::demo::fixtures().len();
        assert_eq!(session.demo_data().record_count(), seeded + 1);
        assert!(session.demo_session().current().is_some());

        let outcome = session.guard().on_navigate("/app");
        assert!(outcome.purged);
        assert!(outcome.failed_steps.is_empty());

        assert!(session.demo_session().current().is_none());
        assert_eq!(session.demo_data().record_count(), seeded);
        assert!(session.short_lived().keys().unwrap().is_empty());
        assert_eq!(session.persisted().keys().unwrap(), vec!["theme"]);

        let live = session.data().for_path("/app", None);
        assert_eq!(live.mode(), DataMode::Live);
    }

    #[test]
    fn idle_sessions_are_evicted_and_active_ones_kept() {
        let dir = tempfile::tempdir().unwrap();
        let clock = manual_clock();
        let registry = registry(dir.path(), shared_with(Arc::new(clock.clone())));
        let idle = Uuid::new_v4();
        let active = Uuid::new_v4();

        registry.get_or_open(idle).unwrap();
        registry.get_or_open(active).unwrap();

        clock.advance(Duration::minutes(20));
        registry.get_or_open(active).unwrap();
        assert_eq!(registry.evict_idle(), 0);

        clock.advance(Duration::minutes(15));
        assert_eq!(registry.evict_idle(), 1);
        assert!(registry.get(&idle).is_none());
        assert!(registry.get(&active).is_some());
    }

    #[test]
    fn full_registry_refuses_until_something_goes_idle() {
        let dir = tempfile::tempdir().unwrap();
        let clock = manual_clock();
        let limits = SessionLimits {
            max_sessions: 2,
            ..SessionLimits::default()
        };
        let registry = SessionRegistry::new(dir.path(), shared_with(Arc::new(clock.clone())), limits);
        let first = Uuid::new_v4();

        registry.get_or_open(first).unwrap();
        registry.get_or_open(Uuid::new_v4()).unwrap();
        assert!(matches!(
            registry.get_or_open(Uuid::new_v4()),
            Err(SessionError::AtCapacity(2))
        ));
        // Known ids still resolve at capacity
        registry.get_or_open(first).unwrap();

        clock.advance(Duration::hours(1));
        registry.get_or_open(Uuid::new_v4()).unwrap();
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test]
    async fn sweeper_evicts_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let clock = manual_clock();
        let limits = SessionLimits {
            sweep_interval: std::time::Duration::from_millis(10),
            ..SessionLimits::default()
        };
        let registry = Arc::new(SessionRegistry::new(
            dir.path(),
            shared_with(Arc::new(clock.clone())),
            limits,
        ));
        for _ in 0..5 {
            registry.get_or_open(Uuid::new_v4()).unwrap();
        }

        let sweeper = registry.spawn_sweeper();
        clock.advance(Duration::hours(2));
        for _ in 0..50 {
            if registry.active_sessions() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(registry.active_sessions(), 0);

        drop(registry);
        tokio::time::timeout(std::time::Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn leaving_live_for_demo_signs_the_demo_user_back_in() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), shared());
        let session = registry.get_or_open(Uuid::new_v4()).unwrap();

        session.clone().enter("/demo/projects".to_string()).await.unwrap();
        session.data().for_path("/demo/projects", None);
        assert!(session.demo_session().current().is_some());

        // Navigation alone, no live data request in between
        let outcome = session.clone().enter("/app".to_string()).await.unwrap();
        assert!(outcome.purged);
        assert!(session.data().current().is_none());
        assert!(session.demo_session().current().is_none());

        session.clone().enter("/demo/projects".to_string()).await.unwrap();
        let demo = session.data().for_path("/demo/projects", None);
        let created = demo
            .accessor(DEMO_TENANT_ID, DEMO_PROJECT_ID, ModuleKey::Materials)
            .create(json!({"title": "Formwork ply"}))
            .await
            .unwrap();
        let signed_in = session.demo_session().current().unwrap();
        assert_eq!(created.created_by, signed_in.user_id);
    }
}
