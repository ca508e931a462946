//! Module records and the scope they live in

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::DataError;
use super::module::ModuleKey;

/// Untyped record payload: the module's declared fields
pub type Payload = Map<String, Value>;

/// The (tenant, project, module) triple an accessor is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordScope {
    tenant_id: String,
    project_id: String,
    module_key: ModuleKey,
}

impl RecordScope {
    pub fn new(tenant_id: &str, project_id: &str, module_key: ModuleKey) -> Result<Self, DataError> {
        check_id("tenant", tenant_id)?;
        check_id("project", project_id)?;

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            project_id: project_id.to_string(),
            module_key,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn module_key(&self) -> ModuleKey {
        self.module_key
    }

    /// Whether a record sits inside this exact triple
    pub fn contains<P>(&self, record: &ModuleRecord<P>) -> bool {
        record.tenant_id == self.tenant_id
            && record.project_id == self.project_id
            && record.module_key == self.module_key
    }
}

/// Opaque ids are embedded in backend filters, so keep them to a safe alphabet
pub(crate) fn check_id(what: &str, id: &str) -> Result<(), DataError> {
    if id.is_empty() {
        return Err(DataError::Unscoped(format!("no {} resolved", what)));
    }
    let safe = id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !safe {
        return Err(DataError::Invalid(format!("malformed {} id '{}'", what, id)));
    }
    Ok(())
}

/// One record in a module's ledger. The payload is flattened on the wire,
/// so a materials record serializes as `{id, title, quantity, ..., created_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord<P = Payload> {
    pub id: Uuid,
    pub tenant_id: String,
    pub project_id: String,
    pub module_key: ModuleKey,
    #[serde(flatten)]
    pub payload: P,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ModuleRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Reinterpret the payload as a module's typed model
    pub fn decode<T: DeserializeOwned>(self) -> Result<ModuleRecord<T>, DataError> {
        let payload = serde_json::from_value(Value::Object(self.payload)).map_err(|e| {
            DataError::Transient(format!("record {} has a malformed payload: {}", self.id, e))
        })?;

        Ok(ModuleRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            project_id: self.project_id,
            module_key: self.module_key,
            payload,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

/// Newest first; ties keep their relative order
pub fn sort_newest_first<P>(records: &mut [ModuleRecord<P>]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
