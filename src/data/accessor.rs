//! Generic per-module CRUD accessor
//!
//! An accessor is bound to one `(tenant, project, module)` triple when it is
//! built. Callers never pass scope per call, so they cannot widen it. Every
//! mutating call re-checks both the record's scope and the acting user's
//! current capability.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::access::gate::CapabilityGate;
use crate::util::time::Clock;

use super::error::{DataError, DataResult};
use super::models::ModuleModel;
use super::module::{merge, validate_create, validate_patch, ModuleKey};
use super::record::{sort_newest_first, ModuleRecord, Payload, RecordScope};

/// Storage seam for module records. Every call carries the scope; an
/// implementation must only ever match rows inside it.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    async fn list(&self, scope: &RecordScope) -> DataResult<Vec<ModuleRecord>>;

    async fn fetch(&self, scope: &RecordScope, id: Uuid) -> DataResult<Option<ModuleRecord>>;

    async fn insert(&self, record: ModuleRecord) -> DataResult<ModuleRecord>;

    /// Overwrite the payload of an in-scope record; `None` when nothing matched
    async fn replace_payload(
        &self,
        scope: &RecordScope,
        id: Uuid,
        payload: Payload,
    ) -> DataResult<Option<ModuleRecord>>;

    /// `false` when nothing matched
    async fn delete(&self, scope: &RecordScope, id: Uuid) -> DataResult<bool>;
}

/// Shared collaborators every accessor of a provider uses
#[derive(Clone)]
pub struct RecordServices {
    pub records: Arc<dyn RecordBackend>,
    pub gate: Arc<dyn CapabilityGate>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
struct Binding {
    scope: RecordScope,
    actor: String,
}

/// CRUD over one module's records in one project
#[derive(Clone)]
pub struct ModuleRecordAccessor {
    module_key: ModuleKey,
    binding: Result<Binding, DataError>,
    services: RecordServices,
}

impl ModuleRecordAccessor {
    /// Bind to a scope acting as `actor`
    pub fn bound(scope: RecordScope, actor: impl Into<String>, services: RecordServices) -> Self {
        Self {
            module_key: scope.module_key(),
            binding: Ok(Binding {
                scope,
                actor: actor.into(),
            }),
            services,
        }
    }

    /// An accessor whose every operation fails with `reason`
    pub fn unbound(module_key: ModuleKey, reason: DataError, services: RecordServices) -> Self {
        Self {
            module_key,
            binding: Err(reason),
            services,
        }
    }

    pub fn module_key(&self) -> ModuleKey {
        self.module_key
    }

    pub fn scope(&self) -> Option<&RecordScope> {
        self.binding.as_ref().ok().map(|b| &b.scope)
    }

    fn binding(&self) -> DataResult<&Binding> {
        self.binding.as_ref().map_err(|err| err.clone())
    }

    /// All records in scope, newest first
    pub async fn list(&self) -> DataResult<Vec<ModuleRecord>> {
        let binding = self.binding()?;
        let scope = &binding.scope;

        let mut records = self.services.records.list(scope).await?;
        records.retain(|record| scope.contains(record));
        sort_newest_first(&mut records);
        Ok(records)
    }

    pub async fn create(&self, input: Value) -> DataResult<ModuleRecord> {
        let binding = self.binding()?;
        let scope = &binding.scope;
        let payload = validate_create(self.module_key, input)?;
        self.authorize(binding).await?;

        let record = ModuleRecord {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id().to_string(),
            project_id: scope.project_id().to_string(),
            module_key: self.module_key,
            payload,
            created_by: binding.actor.clone(),
            created_at: self.services.clock.now(),
        };

        let stored = self.services.records.insert(record).await?;
        info!(
            tenant_id = %scope.tenant_id(),
            project_id = %scope.project_id(),
            module = %self.module_key,
            record_id = %stored.id,
            "Created module record"
        );
        Ok(stored)
    }

    /// Partial update: fields missing from `input` keep their prior values
    pub async fn update(&self, record_id: Uuid, input: Value) -> DataResult<ModuleRecord> {
        let binding = self.binding()?;
        let scope = &binding.scope;
        let patch = validate_patch(self.module_key, input)?;
        self.authorize(binding).await?;

        let existing = self
            .services
            .records
            .fetch(scope, record_id)
            .await?
            .filter(|record| scope.contains(record))
            .ok_or_else(|| not_found(record_id, scope))?;

        let mut payload = existing.payload;
        merge(&mut payload, patch);

        let updated = self
            .services
            .records
            .replace_payload(scope, record_id, payload)
            .await?
            .filter(|record| scope.contains(record))
            .ok_or_else(|| not_found(record_id, scope))?;

        info!(
            tenant_id = %scope.tenant_id(),
            module = %self.module_key,
            record_id = %record_id,
            "Updated module record"
        );
        Ok(updated)
    }

    /// Remove a record; absent or out-of-scope ids are `NotFound`
    pub async fn remove(&self, record_id: Uuid) -> DataResult<()> {
        let binding = self.binding()?;
        let scope = &binding.scope;
        self.authorize(binding).await?;

        if !self.services.records.delete(scope, record_id).await? {
            return Err(not_found(record_id, scope));
        }

        info!(
            tenant_id = %scope.tenant_id(),
            module = %self.module_key,
            record_id = %record_id,
            "Removed module record"
        );
        Ok(())
    }

    async fn authorize(&self, binding: &Binding) -> DataResult<()> {
        self.services
            .gate
            .authorize(
                binding.scope.tenant_id(),
                &binding.actor,
                self.module_key.write_capability(),
            )
            .await
    }
}

fn not_found(record_id: Uuid, scope: &RecordScope) -> DataError {
    DataError::NotFound(format!(
        "{} record {} in {}/{}",
        scope.module_key(),
        record_id,
        scope.tenant_id(),
        scope.project_id()
    ))
}

/// The same accessor speaking a module's typed model
pub struct TypedAccessor<M> {
    inner: ModuleRecordAccessor,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for TypedAccessor<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: ModuleModel> TypedAccessor<M> {
    /// Wrap an accessor; it must be bound to `M::KEY`
    pub fn new(inner: ModuleRecordAccessor) -> DataResult<Self> {
        if inner.module_key() != M::KEY {
            return Err(DataError::Invalid(format!(
                "accessor for {} cannot serve {} records",
                inner.module_key(),
                M::KEY
            )));
        }
        Ok(Self {
            inner,
            _model: PhantomData,
        })
    }

    /// Caller guarantees `inner` was built for `M::KEY`
    pub(crate) fn wrap(inner: ModuleRecordAccessor) -> Self {
        debug_assert_eq!(inner.module_key(), M::KEY);
        Self {
            inner,
            _model: PhantomData,
        }
    }

    pub async fn list(&self) -> DataResult<Vec<ModuleRecord<M>>> {
        self.inner
            .list()
            .await?
            .into_iter()
            .map(ModuleRecord::decode)
            .collect()
    }

    pub async fn create(&self, model: &M) -> DataResult<ModuleRecord<M>> {
        let input = serde_json::to_value(model)
            .map_err(|e| DataError::Invalid(format!("{}: {}", M::KEY, e)))?;
        self.inner.create(input).await?.decode()
    }

    pub async fn update(&self, record_id: Uuid, patch: Value) -> DataResult<ModuleRecord<M>> {
        self.inner.update(record_id, patch).await?.decode()
    }

    pub async fn remove(&self, record_id: Uuid) -> DataResult<()> {
        self.inner.remove(record_id).await
    }
}
