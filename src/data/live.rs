//! Live backend: the tenant's rows in Supabase, read and written as the signed-in user

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::supabase::SupabaseClient;

use super::accessor::RecordBackend;
use super::error::DataResult;
use super::files::{FileBackend, StoredFile};
use super::module::ModuleKey;
use super::record::{ModuleRecord, Payload, RecordScope};

const MODULE_RECORDS: &str = "module_records";
const ROW_COLUMNS: &str = "id,tenant_id,project_id,module_key,payload,created_by,created_at";

/// `module_records` row; the payload stays a jsonb column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleRecordRow {
    id: Uuid,
    tenant_id: String,
    project_id: String,
    module_key: ModuleKey,
    payload: Payload,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<ModuleRecord> for ModuleRecordRow {
    fn from(record: ModuleRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            project_id: record.project_id,
            module_key: record.module_key,
            payload: record.payload,
            created_by: record.created_by,
            created_at: record.created_at,
        }
    }
}

impl From<ModuleRecordRow> for ModuleRecord {
    fn from(row: ModuleRecordRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            project_id: row.project_id,
            module_key: row.module_key,
            payload: row.payload,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
struct PayloadUpdate<'a> {
    payload: &'a Payload,
}

/// PostgREST filter pinning a query to one scope
fn scope_filter(scope: &RecordScope) -> String {
    format!(
        "tenant_id=eq.{}&project_id=eq.{}&module_key=eq.{}",
        scope.tenant_id(),
        scope.project_id(),
        scope.module_key()
    )
}

#[derive(Clone)]
pub struct LiveBackend {
    client: SupabaseClient,
    bucket: String,
}

impl LiveBackend {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn select_records(&self, scope: &RecordScope) -> DataResult<Vec<ModuleRecord>> {
        let query = format!(
            "{}&select={}&order=created_at.desc",
            scope_filter(scope),
            ROW_COLUMNS
        );
        let rows: Vec<ModuleRecordRow> = self.client.get(MODULE_RECORDS, &query).await?;
        Ok(rows.into_iter().map(ModuleRecord::from).collect())
    }

    async fn select_record(&self, scope: &RecordScope, id: Uuid) -> DataResult<Option<ModuleRecord>> {
        let query = format!(
            "id=eq.{}&{}&select={}&limit=1",
            id,
            scope_filter(scope),
            ROW_COLUMNS
        );
        let rows: Vec<ModuleRecordRow> = self.client.get(MODULE_RECORDS, &query).await?;
        Ok(rows.into_iter().next().map(ModuleRecord::from))
    }

    async fn insert_record(&self, record: ModuleRecord) -> DataResult<ModuleRecord> {
        let row = ModuleRecordRow::from(record);
        let stored: ModuleRecordRow = self.client.insert(MODULE_RECORDS, &row).await?;
        Ok(stored.into())
    }

    async fn patch_payload(
        &self,
        scope: &RecordScope,
        id: Uuid,
        payload: Payload,
    ) -> DataResult<Option<ModuleRecord>> {
        let query = format!("id=eq.{}&{}", id, scope_filter(scope));
        let rows: Vec<ModuleRecordRow> = self
            .client
            .update(MODULE_RECORDS, &query, &PayloadUpdate { payload: &payload })
            .await?;
        Ok(rows.into_iter().next().map(ModuleRecord::from))
    }

    async fn delete_record(&self, scope: &RecordScope, id: Uuid) -> DataResult<bool> {
        let query = format!("id=eq.{}&{}", id, scope_filter(scope));
        let rows: Vec<ModuleRecordRow> = self.client.delete(MODULE_RECORDS, &query).await?;
        Ok(!rows.is_empty())
    }

    async fn put_object(&self, path: String, body: Bytes, content_type: String) -> DataResult<StoredFile> {
        let size = body.len() as u64;
        self.client
            .upload_object(&self.bucket, &path, body, &content_type)
            .await?;
        Ok(StoredFile {
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            size: Some(size),
            content_type: Some(content_type),
            updated_at: Some(Utc::now()),
        })
    }

    async fn list_folder(&self, folder: String) -> DataResult<Vec<StoredFile>> {
        let objects = self.client.list_objects(&self.bucket, &folder).await?;
        Ok(objects
            .into_iter()
            // Sub-folders come back as placeholders without metadata
            .filter_map(|object| {
                let metadata = object.metadata?;
                Some(StoredFile {
                    name: object.name,
                    size: metadata.size,
                    content_type: metadata.mimetype,
                    updated_at: object.updated_at,
                })
            })
            .collect())
    }

    async fn delete_object(&self, path: String) -> DataResult<bool> {
        let removed = self
            .client
            .remove_objects(&self.bucket, std::slice::from_ref(&path))
            .await?;
        Ok(!removed.is_empty())
    }
}

#[async_trait]
impl RecordBackend for LiveBackend {
    async fn list(&self, scope: &RecordScope) -> DataResult<Vec<ModuleRecord>> {
        self.select_records(scope).await
    }

    async fn fetch(&self, scope: &RecordScope, id: Uuid) -> DataResult<Option<ModuleRecord>> {
        self.select_record(scope, id).await
    }

    async fn insert(&self, record: ModuleRecord) -> DataResult<ModuleRecord> {
        self.insert_record(record).await
    }

    async fn replace_payload(
        &self,
        scope: &RecordScope,
        id: Uuid,
        payload: Payload,
    ) -> DataResult<Option<ModuleRecord>> {
        self.patch_payload(scope, id, payload).await
    }

    async fn delete(&self, scope: &RecordScope, id: Uuid) -> DataResult<bool> {
        self.delete_record(scope, id).await
    }
}

#[async_trait]
impl FileBackend for LiveBackend {
    async fn upload(&self, path: String, body: Bytes, content_type: String) -> DataResult<StoredFile> {
        self.put_object(path, body, content_type).await
    }

    async fn list(&self, folder: String) -> DataResult<Vec<StoredFile>> {
        self.list_folder(folder).await
    }

    async fn remove(&self, path: String) -> DataResult<bool> {
        self.delete_object(path).await
    }
}
