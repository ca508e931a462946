//! Application state shared across routes

use std::sync::Arc;

use crate::access::PermissionMatrix;
use crate::config::Config;
use crate::data::SharedServices;
use crate::session::SessionRegistry;
use crate::store::SupabaseClient;
use crate::util::time::SystemClock;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supabase: SupabaseClient,
    pub matrix: Arc<PermissionMatrix>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Anonymous client; live providers derive user-scoped ones from it
        let supabase = SupabaseClient::new(&config);

        // Built once from the static catalogs
        let matrix = Arc::new(PermissionMatrix::standard());

        let shared = SharedServices {
            supabase: supabase.clone(),
            bucket: config.storage_bucket.clone(),
            matrix: matrix.clone(),
            clock: Arc::new(SystemClock),
        };
        let sessions = Arc::new(SessionRegistry::new(
            config.session_data_dir.clone(),
            shared,
            config.session_limits,
        ));

        Self {
            config,
            supabase,
            matrix,
            sessions,
        }
    }
}
