//! Closed error taxonomy for the data layer
//!
//! Backend fault codes are translated here, once. Everything above this
//! module matches on [`DataError`] variants, never on raw codes.

use crate::store::supabase::{SupabaseError, RELATION_UNDEFINED, SCHEMA_CACHE_MISS};

pub type DataResult<T> = Result<T, DataError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    /// No resolved tenant/project/user behind the call
    #[error("unscoped: {0}")]
    Unscoped(String),

    /// Record absent, or outside the caller's bound scope
    #[error("not found: {0}")]
    NotFound(String),

    /// Backing relation not provisioned in this deployment
    #[error("schema absent: {0}")]
    SchemaAbsent(String),

    /// Network or backend fault
    #[error("backend failure: {0}")]
    Transient(String),

    /// Input failed shape validation
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Acting user lacks the capability for this call
    #[error("permission denied: {0}")]
    Forbidden(String),
}

/// SQLSTATE / PostgREST codes that mean the caller sent a bad value
const INVALID_INPUT_CODES: &[&str] = &["22P02", "23502", "23514", "PGRST204"];

/// SQLSTATE for insufficient privilege (row level security)
const INSUFFICIENT_PRIVILEGE: &str = "42501";

impl From<SupabaseError> for DataError {
    fn from(err: SupabaseError) -> Self {
        match err.code() {
            Some(RELATION_UNDEFINED) | Some(SCHEMA_CACHE_MISS) => {
                DataError::SchemaAbsent(err.to_string())
            }
            Some(INSUFFICIENT_PRIVILEGE) => DataError::Forbidden(err.to_string()),
            Some(code) if INVALID_INPUT_CODES.contains(&code) => {
                DataError::Invalid(err.to_string())
            }
            _ => match err.status() {
                Some(401) | Some(403) => DataError::Forbidden(err.to_string()),
                _ => DataError::Transient(err.to_string()),
            },
        }
    }
}
