//! Client session state: demo isolation, path memory, per-client registry

pub mod demo_session;
pub mod guard;
pub mod path_memory;
pub mod registry;

pub use demo_session::{DemoSession, DemoUser};
pub use guard::{DemoStatePurge, NavigationOutcome, PurgeError, SessionEntryGuard, StoragePurge};
pub use path_memory::{PathMemory, EXCLUDED_PATHS, LAST_PATH_KEY};
pub use registry::{ClientSession, SessionError, SessionLimits, SessionRegistry};
