//! Demo backend: static fixtures plus ephemeral in-memory edits
//!
//! Holds no tenant identity of its own and persists nothing. A reset
//! (session purge) drops every edit and uploaded file and reseeds fixtures.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::session::guard::{DemoStatePurge, PurgeError};

use super::accessor::RecordBackend;
use super::error::DataResult;
use super::files::{FileBackend, StoredFile};
use super::module::ModuleKey;
use super::record::{ModuleRecord, Payload, RecordScope};

/// Tenant placeholder used for every demo scope
pub const DEMO_TENANT_ID: &str = "demo";
/// Project the fixtures live in
pub const DEMO_PROJECT_ID: &str = "demo-project";
/// Author of the fixtures and of demo-mode edits
pub const DEMO_USER_ID: &str = "demo-user";

struct DemoFile {
    body: Bytes,
    content_type: String,
    updated_at: DateTime<Utc>,
}

pub struct DemoBackend {
    /// Insertion order; newer records later
    records: RwLock<Vec<ModuleRecord>>,
    files: DashMap<String, DemoFile>,
    with_fixtures: bool,
}

impl DemoBackend {
    /// Backend preloaded with the demo project fixtures
    pub fn seeded() -> Self {
        Self {
            records: RwLock::new(fixtures()),
            files: DashMap::new(),
            with_fixtures: true,
        }
    }

    /// Backend with nothing in it
    pub fn empty() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            files: DashMap::new(),
            with_fixtures: false,
        }
    }

    /// Drop every edit and file, back to the initial state
    pub fn reset(&self) {
        let initial = if self.with_fixtures { fixtures() } else { Vec::new() };
        *self.records.write() = initial;
        self.files.clear();
    }

    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[async_trait]
impl RecordBackend for DemoBackend {
    async fn list(&self, scope: &RecordScope) -> DataResult<Vec<ModuleRecord>> {
        // Newest insert first so equal timestamps still read newest first
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|record| scope.contains(*record))
            .cloned()
            .collect())
    }

    async fn fetch(&self, scope: &RecordScope, id: Uuid) -> DataResult<Option<ModuleRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| record.id == id && scope.contains(*record))
            .cloned())
    }

    async fn insert(&self, record: ModuleRecord) -> DataResult<ModuleRecord> {
        self.records.write().push(record.clone());
        Ok(record)
    }

    async fn replace_payload(
        &self,
        scope: &RecordScope,
        id: Uuid,
        payload: Payload,
    ) -> DataResult<Option<ModuleRecord>> {
        Ok(self
            .records
            .write()
            .iter_mut()
            .find(|record| record.id == id && scope.contains(&**record))
            .map(|record| {
                record.payload = payload;
                record.clone()
            }))
    }

    async fn delete(&self, scope: &RecordScope, id: Uuid) -> DataResult<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| !(record.id == id && scope.contains(record)));
        Ok(records.len() != before)
    }
}

#[async_trait]
impl FileBackend for DemoBackend {
    async fn upload(&self, path: String, body: Bytes, content_type: String) -> DataResult<StoredFile> {
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let updated_at = Utc::now();
        let stored = StoredFile {
            name,
            size: Some(body.len() as u64),
            content_type: Some(content_type.clone()),
            updated_at: Some(updated_at),
        };
        self.files.insert(
            path,
            DemoFile {
                body,
                content_type,
                updated_at,
            },
        );
        Ok(stored)
    }

    async fn list(&self, folder: String) -> DataResult<Vec<StoredFile>> {
        let prefix = format!("{}/", folder);
        Ok(self
            .files
            .iter()
            .filter_map(|entry| {
                let name = entry.key().strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                let file = entry.value();
                Some(StoredFile {
                    name: name.to_string(),
                    size: Some(file.body.len() as u64),
                    content_type: Some(file.content_type.clone()),
                    updated_at: Some(file.updated_at),
                })
            })
            .collect())
    }

    async fn remove(&self, path: String) -> DataResult<bool> {
        Ok(self.files.remove(&path).is_some())
    }
}

impl DemoStatePurge for DemoBackend {
    fn name(&self) -> &'static str {
        "demo-data-cache"
    }

    fn purge(&self) -> Result<(), PurgeError> {
        let dropped = self.record_count();
        self.reset();
        debug!(dropped, "Demo data cache reset");
        Ok(())
    }
}

fn fixture(id: u128, key: ModuleKey, payload: Value, at: (u32, u32)) -> ModuleRecord {
    let (day, hour) = at;
    ModuleRecord {
        id: Uuid::from_u128(id),
        tenant_id: DEMO_TENANT_ID.to_string(),
        project_id: DEMO_PROJECT_ID.to_string(),
        module_key: key,
        payload: match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        },
        created_by: DEMO_USER_ID.to_string(),
        created_at: Utc
            .with_ymd_and_hms(2024, 4, day, hour, 0, 0)
            .single()
            .unwrap_or_default(),
    }
}

/// Static sample data for the demo project
pub fn fixtures() -> Vec<ModuleRecord> {
    vec![
        fixture(
            0xd3e0_0001,
            ModuleKey::Materials,
            json!({"title": "Ready-mix concrete C30", "quantity": 48, "unit": "m3", "supplier": "Northside Aggregates", "status": "delivered"}),
            (2, 9),
        ),
        fixture(
            0xd3e0_0002,
            ModuleKey::Materials,
            json!({"title": "Rebar 12mm", "quantity": 3.5, "unit": "t", "supplier": "Forge & Co", "status": "ordered"}),
            (4, 14),
        ),
        fixture(
            0xd3e0_0003,
            ModuleKey::Progress,
            json!({"title": "Foundations poured", "percent": 100, "reported_on": "2024-04-05"}),
            (5, 17),
        ),
        fixture(
            0xd3e0_0004,
            ModuleKey::Progress,
            json!({"title": "Ground floor slab", "percent": 40, "notes": "Formwork in place"}),
            (9, 16),
        ),
        fixture(
            0xd3e0_0005,
            ModuleKey::Payments,
            json!({"title": "Mobilisation deposit", "amount": 12500, "currency": "EUR", "paid": true}),
            (1, 10),
        ),
        fixture(
            0xd3e0_0006,
            ModuleKey::Approvals,
            json!({"title": "Structural drawings rev B", "status": "pending", "approver": "Site engineer"}),
            (8, 11),
        ),
    ]
}
