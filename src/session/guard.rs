//! Demo-to-live isolation on navigation
//!
//! Entering the live subtree from anywhere else runs an ordered purge of
//! demo state. Steps are independent: one failing (or panicking) step is
//! logged and the rest still run. Navigation inside the live subtree does
//! not purge again; leaving it and coming back does.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::data::provider::DataMode;
use crate::store::storage::{remove_prefixed, KeyValueStore, StorageError, DEMO_KEY_PREFIX};

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Other(String),
}

/// One piece of demo state that must not survive into live mode
pub trait DemoStatePurge: Send + Sync {
    fn name(&self) -> &'static str;
    fn purge(&self) -> Result<(), PurgeError>;
}

/// Removes `demo:`-prefixed entries from both client stores
pub struct StoragePurge {
    short_lived: Arc<dyn KeyValueStore>,
    persisted: Arc<dyn KeyValueStore>,
}

impl StoragePurge {
    pub fn new(short_lived: Arc<dyn KeyValueStore>, persisted: Arc<dyn KeyValueStore>) -> Self {
        Self {
            short_lived,
            persisted,
        }
    }
}

impl DemoStatePurge for StoragePurge {
    fn name(&self) -> &'static str {
        "demo-storage"
    }

    fn purge(&self) -> Result<(), PurgeError> {
        // Both stores are attempted even if the first fails
        let short_lived = remove_prefixed(self.short_lived.as_ref(), DEMO_KEY_PREFIX);
        let persisted = remove_prefixed(self.persisted.as_ref(), DEMO_KEY_PREFIX);
        let removed = short_lived? + persisted?;
        if removed > 0 {
            info!(removed, "Removed demo storage entries");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationOutcome {
    pub mode: DataMode,
    /// Whether this navigation ran the purge
    pub purged: bool,
    /// Names of purge steps that failed
    pub failed_steps: Vec<&'static str>,
}

pub struct SessionEntryGuard {
    steps: Vec<Arc<dyn DemoStatePurge>>,
    last_zone: Mutex<Option<DataMode>>,
}

impl SessionEntryGuard {
    /// Steps run in the order given
    pub fn new(steps: Vec<Arc<dyn DemoStatePurge>>) -> Self {
        Self {
            steps,
            last_zone: Mutex::new(None),
        }
    }

    /// Record a navigation to `path`; purges before returning when it enters live mode
    pub fn on_navigate(&self, path: &str) -> NavigationOutcome {
        let mode = DataMode::from_path(path);
        // Held through the purge so concurrent navigations purge once
        let mut last_zone = self.last_zone.lock();

        let entering_live = mode == DataMode::Live && *last_zone != Some(DataMode::Live);
        let failed_steps = if entering_live {
            self.run_purge()
        } else {
            Vec::new()
        };
        *last_zone = Some(mode);

        NavigationOutcome {
            mode,
            purged: entering_live,
            failed_steps,
        }
    }

    pub fn current_zone(&self) -> Option<DataMode> {
        *self.last_zone.lock()
    }

    fn run_purge(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();

        for step in &self.steps {
            match catch_unwind(AssertUnwindSafe(|| step.purge())) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(step = step.name(), error = %err, "Demo purge step failed");
                    failed.push(step.name());
                }
                Err(_) => {
                    warn!(step = step.name(), "Demo purge step panicked");
                    failed.push(step.name());
                }
            }
        }

        info!(
            steps = self.steps.len(),
            failed = failed.len(),
            "Demo state purged on entry to live"
        );
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        runs: AtomicUsize,
    }

    impl DemoStatePurge for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn purge(&self) -> Result<(), PurgeError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl DemoStatePurge for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn purge(&self) -> Result<(), PurgeError> {
            Err(PurgeError::Other("storage unavailable".to_string()))
        }
    }

    struct Panicking;

    impl DemoStatePurge for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn purge(&self) -> Result<(), PurgeError> {
            panic!("boom")
        }
    }

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
        let short_lived = Arc::new(MemoryStore::new());
        let persisted = Arc::new(MemoryStore::new());
        for store in [&short_lived, &persisted] {
            store.set("demo:draft", "{}").unwrap();
            store.set("demo:filters", "[]").unwrap();
            store.set("app:last_path", "/app/projects").unwrap();
            store.set("theme", "dark").unwrap();
        }
        (short_lived, persisted)
    }

    #[test]
    fn entering_live_purges_demo_entries_only() {
        let (short_lived, persisted) = stores();
        let guard = SessionEntryGuard::new(vec![Arc::new(StoragePurge::new(
            short_lived.clone(),
            persisted.clone(),
        ))]);

        assert!(!guard.on_navigate("/demo/projects").purged);
        let outcome = guard.on_navigate("/app/projects");
        assert!(outcome.purged);
        assert_eq!(outcome.mode, DataMode::Live);

        for store in [&short_lived, &persisted] {
            assert_eq!(store.keys().unwrap(), vec!["app:last_path", "theme"]);
        }
    }

    #[test]
    fn purge_is_idempotent_within_live() {
        let counting = Arc::new(Counting::default());
        let guard = SessionEntryGuard::new(vec![counting.clone()]);

        assert!(guard.on_navigate("/app").purged);
        assert!(!guard.on_navigate("/app/projects/p1").purged);
        assert!(!guard.on_navigate("/app/settings?tab=members").purged);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 1);

        let (short_lived, persisted) = stores();
        let storage = StoragePurge::new(short_lived.clone(), persisted);
        storage.purge().unwrap();
        let after_first = short_lived.keys().unwrap();
        storage.purge().unwrap();
        assert_eq!(short_lived.keys().unwrap(), after_first);
    }

    #[test]
    fn leaving_and_reentering_purges_again() {
        let counting = Arc::new(Counting::default());
        let guard = SessionEntryGuard::new(vec![counting.clone()]);

        guard.on_navigate("/app");
        guard.on_navigate("/demo");
        guard.on_navigate("/");
        assert!(guard.on_navigate("/app/projects").purged);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 2);
        assert_eq!(guard.current_zone(), Some(DataMode::Live));
    }

    #[test]
    fn failing_steps_do_not_block_later_ones() {
        let (short_lived, persisted) = stores();
        let counting = Arc::new(Counting::default());
        let guard = SessionEntryGuard::new(vec![
            Arc::new(Failing),
            Arc::new(Panicking),
            counting.clone(),
            Arc::new(StoragePurge::new(short_lived.clone(), persisted)),
        ]);

        let outcome = guard.on_navigate("/app");
        assert!(outcome.purged);
        assert_eq!(outcome.failed_steps, vec!["failing", "panicking"]);
        assert_eq!(counting.runs.load(Ordering::SeqCst), 1);
        assert_eq!(short_lived.get("demo:draft").unwrap(), None);
    }
}
