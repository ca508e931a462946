//! Backing stores: Supabase REST and client key/value storage

pub mod storage;
pub mod supabase;

pub use storage::{
    remove_prefixed, FileStore, KeyValueStore, MemoryStore, StorageError, DEMO_KEY_PREFIX,
};
pub use supabase::{SupabaseClient, SupabaseError};
