//! Last visited route, for resuming after sign-in

use std::sync::Arc;

use tracing::{debug, warn};

use crate::data::provider::route_within;
use crate::store::storage::{KeyValueStore, StorageError};

/// Storage key holding the remembered route
pub const LAST_PATH_KEY: &str = "app:last_path";

/// Routes never remembered, nor any route beneath them
pub const EXCLUDED_PATHS: &[&str] = &[
    "/login",
    "/signup",
    "/auth/callback",
    "/app/login",
    "/app/signup",
    "/app/forgot-password",
    "/app/reset-password",
    "/app/onboarding",
];

/// Local absolute routes only, outside the exclusion set
fn rememberable(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !EXCLUDED_PATHS
            .iter()
            .any(|excluded| route_within(path, excluded))
}

#[derive(Clone)]
pub struct PathMemory {
    store: Arc<dyn KeyValueStore>,
}

impl PathMemory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Remember `path` (plus `query`) unless it is excluded; returns whether it was saved
    pub fn save_last_path(&self, path: &str, query: Option<&str>) -> Result<bool, StorageError> {
        if !rememberable(path) {
            debug!(path, "Not remembering excluded path");
            return Ok(false);
        }

        let full = match query.map(|q| q.trim_start_matches('?')) {
            Some(q) if !q.is_empty() => format!("{}?{}", path, q),
            _ => path.to_string(),
        };
        self.store.set(LAST_PATH_KEY, &full)?;
        Ok(true)
    }

    /// The remembered route, or `fallback` when none is stored or the stored one is no longer valid
    pub fn get_last_path(&self, fallback: &str) -> String {
        match self.store.get(LAST_PATH_KEY) {
            Ok(Some(stored)) if rememberable(&stored) => stored,
            Ok(_) => fallback.to_string(),
            Err(err) => {
                warn!(error = %err, "Could not read last path");
                fallback.to_string()
            }
        }
    }

    pub fn clear_last_path(&self) -> Result<(), StorageError> {
        self.store.remove(LAST_PATH_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::storage::MemoryStore;

    fn memory() -> (PathMemory, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PathMemory::new(store.clone()), store)
    }

    #[test]
    fn excluded_paths_fall_back() {
        let (memory, _) = memory();
        for path in ["/app/login", "/app/onboarding/step-2", "/login", "/auth/callback", "app/projects"] {
            assert!(!memory.save_last_path(path, None).unwrap());
            assert_eq!(memory.get_last_path("/app"), "/app");
        }
    }

    #[test]
    fn keeps_query_string() {
        let (memory, _) = memory();
        assert!(memory
            .save_last_path("/app/projects/p1", Some("?tab=materials"))
            .unwrap());
        assert_eq!(memory.get_last_path("/app"), "/app/projects/p1?tab=materials");

        memory.save_last_path("/app/projects", Some("")).unwrap();
        assert_eq!(memory.get_last_path("/app"), "/app/projects");
    }

    #[test]
    fn revalidates_at_read_time() {
        let (memory, store) = memory();
        store.set(LAST_PATH_KEY, "/app/login?next=/app").unwrap();
        assert_eq!(memory.get_last_path("/app/projects"), "/app/projects");

        for stored in ["https://evil.example/app", "//evil.example/app"] {
            store.set(LAST_PATH_KEY, stored).unwrap();
            assert_eq!(memory.get_last_path("/app"), "/app");
        }
    }

    #[test]
    fn clear_forgets() {
        let (memory, _) = memory();
        memory.save_last_path("/app/settings", None).unwrap();
        memory.clear_last_path().unwrap();
        assert_eq!(memory.get_last_path("/app"), "/app");
    }

    #[test]
    fn login_lookalikes_are_remembered() {
        let (memory, _) = memory();
        assert!(memory.save_last_path("/app/login-history", None).unwrap());
        assert_eq!(memory.get_last_path("/app"), "/app/login-history");
    }
}
