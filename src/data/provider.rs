//! Provider selection and injection
//!
//! A [`DataProvider`] is the whole data surface for one mode: record
//! accessors for every module plus project files. [`ProviderFactory`] builds
//! one; [`DataLayerContext`] holds the active one per client session and
//! swaps it atomically when the mode or identity changes.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::access::gate::{AllowAll, MembershipGate};
use crate::access::permissions::PermissionMatrix;
use crate::access::platform_role::PlatformRoleResolver;
use crate::session::demo_session::DemoSession;
use crate::session::guard::{DemoStatePurge, PurgeError};
use crate::store::supabase::SupabaseClient;
use crate::util::time::Clock;

use super::accessor::{ModuleRecordAccessor, RecordServices, TypedAccessor};
use super::demo::DemoBackend;
use super::error::DataError;
use super::files::{FileBackend, ProjectFiles};
use super::live::LiveBackend;
use super::models::{Approval, Material, ModuleModel, Payment, ProgressReport};
use super::module::ModuleKey;
use super::record::RecordScope;

/// Routes under this prefix belong to the live application
pub const LIVE_ROUTE_PREFIX: &str = "/app";
/// Routes under this prefix belong to the demo
pub const DEMO_ROUTE_PREFIX: &str = "/demo";

/// Whether `path` is `prefix` itself or lies beneath it
pub fn route_within(path: &str, prefix: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Demo,
    Live,
}

impl DataMode {
    /// Derived from the route alone: the live subtree is live, everything else is demo
    pub fn from_path(path: &str) -> Self {
        if route_within(path, LIVE_ROUTE_PREFIX) {
            DataMode::Live
        } else {
            DataMode::Demo
        }
    }
}

/// Who a live session acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    /// `None` until the user's organization is resolved
    pub tenant_id: Option<String>,
    pub access_token: String,
}

/// Collaborators shared by every client session
#[derive(Clone)]
pub struct SharedServices {
    pub supabase: SupabaseClient,
    pub bucket: String,
    pub matrix: Arc<PermissionMatrix>,
    pub clock: Arc<dyn Clock>,
}

/// The active data surface for one mode
pub struct DataProvider {
    mode: DataMode,
    identity: Option<SessionIdentity>,
    demo_actor: String,
    records: RecordServices,
    files: Arc<dyn FileBackend>,
}

impl DataProvider {
    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    fn serves(&self, mode: DataMode, identity: Option<&SessionIdentity>) -> bool {
        match mode {
            DataMode::Demo => self.mode == DataMode::Demo,
            DataMode::Live => self.mode == DataMode::Live && self.identity.as_ref() == identity,
        }
    }

    /// The acting user for `tenant_id`, or why there is none
    fn actor_for(&self, tenant_id: &str) -> Result<String, DataError> {
        match self.mode {
            DataMode::Demo => Ok(self.demo_actor.clone()),
            DataMode::Live => {
                let identity = self.identity.as_ref().ok_or_else(|| {
                    DataError::Unscoped("live session has no signed-in user".to_string())
                })?;
                let tenant = identity.tenant_id.as_deref().ok_or_else(|| {
                    DataError::Unscoped("no tenant resolved for this session".to_string())
                })?;
                if tenant != tenant_id {
                    return Err(DataError::Unscoped(format!(
                        "tenant '{}' is not resolved for this session",
                        tenant_id
                    )));
                }
                Ok(identity.user_id.clone())
            }
        }
    }

    /// Accessor bound to `(tenant_id, project_id, key)`
    pub fn accessor(&self, tenant_id: &str, project_id: &str, key: ModuleKey) -> ModuleRecordAccessor {
        let bound = self.actor_for(tenant_id).and_then(|actor| {
            RecordScope::new(tenant_id, project_id, key).map(|scope| (scope, actor))
        });

        match bound {
            Ok((scope, actor)) => ModuleRecordAccessor::bound(scope, actor, self.records.clone()),
            Err(reason) => ModuleRecordAccessor::unbound(key, reason, self.records.clone()),
        }
    }

    pub fn typed<M: ModuleModel>(&self, tenant_id: &str, project_id: &str) -> TypedAccessor<M> {
        TypedAccessor::wrap(self.accessor(tenant_id, project_id, M::KEY))
    }

    pub fn files(&self, tenant_id: &str, project_id: &str) -> ProjectFiles {
        match self.actor_for(tenant_id) {
            Ok(actor) => ProjectFiles::bound(
                tenant_id,
                project_id,
                actor,
                self.files.clone(),
                self.records.gate.clone(),
            ),
            Err(reason) => ProjectFiles::unbound(reason, self.files.clone(), self.records.gate.clone()),
        }
    }

    /// Every module of one project, plus its files
    pub fn project(&self, tenant_id: &str, project_id: &str) -> ProjectData {
        ProjectData {
            materials: self.typed(tenant_id, project_id),
            progress: self.typed(tenant_id, project_id),
            payments: self.typed(tenant_id, project_id),
            approvals: self.typed(tenant_id, project_id),
            files: self.files(tenant_id, project_id),
        }
    }
}

/// One project's data, as feature code consumes it
#[derive(Clone)]
pub struct ProjectData {
    pub materials: TypedAccessor<Material>,
    pub progress: TypedAccessor<ProgressReport>,
    pub payments: TypedAccessor<Payment>,
    pub approvals: TypedAccessor<Approval>,
    pub files: ProjectFiles,
}

/// Builds providers for one client session
#[derive(Clone)]
pub struct ProviderFactory {
    shared: SharedServices,
    demo: Arc<DemoBackend>,
    demo_session: Arc<DemoSession>,
}

impl ProviderFactory {
    pub fn new(shared: SharedServices, demo: Arc<DemoBackend>, demo_session: Arc<DemoSession>) -> Self {
        Self {
            shared,
            demo,
            demo_session,
        }
    }

    pub fn build(&self, mode: DataMode, identity: Option<&SessionIdentity>) -> DataProvider {
        match mode {
            DataMode::Demo => DataProvider {
                mode,
                identity: None,
                demo_actor: self.demo_session.ensure_signed_in().user_id,
                records: RecordServices {
                    records: self.demo.clone(),
                    gate: Arc::new(AllowAll),
                    clock: self.shared.clock.clone(),
                },
                files: self.demo.clone(),
            },
            DataMode::Live => {
                let client = match identity {
                    Some(identity) => self.shared.supabase.with_access_token(&identity.access_token),
                    None => self.shared.supabase.clone(),
                };
                let backend = Arc::new(LiveBackend::new(client.clone(), self.shared.bucket.clone()));
                let gate = MembershipGate::new(
                    client.clone(),
                    self.shared.matrix.clone(),
                    PlatformRoleResolver::from_supabase(client),
                );

                DataProvider {
                    mode,
                    identity: identity.cloned(),
                    demo_actor: String::new(),
                    records: RecordServices {
                        records: backend.clone(),
                        gate: Arc::new(gate),
                        clock: self.shared.clock.clone(),
                    },
                    files: backend,
                }
            }
        }
    }
}

/// The single injection point feature code reads its provider from
pub struct DataLayerContext {
    factory: ProviderFactory,
    active: RwLock<Option<Arc<DataProvider>>>,
}

impl DataLayerContext {
    pub fn new(factory: ProviderFactory) -> Self {
        Self {
            factory,
            active: RwLock::new(None),
        }
    }

    /// The provider currently in use, if any was activated
    pub fn current(&self) -> Option<Arc<DataProvider>> {
        self.active.read().clone()
    }

    /// Provider for `mode`, building and swapping one in if the active one does not serve it.
    /// Readers see either the old or the new provider, never a mix.
    pub fn activate(&self, mode: DataMode, identity: Option<&SessionIdentity>) -> Arc<DataProvider> {
        if let Some(provider) = self.active.read().as_ref() {
            if provider.serves(mode, identity) {
                return provider.clone();
            }
        }

        let mut active = self.active.write();
        if let Some(provider) = active.as_ref() {
            if provider.serves(mode, identity) {
                return provider.clone();
            }
        }

        let provider = Arc::new(self.factory.build(mode, identity));
        info!(
            mode = ?mode,
            tenant_id = ?identity.and_then(|i| i.tenant_id.as_deref()),
            "Activated data provider"
        );
        *active = Some(provider.clone());
        provider
    }

    pub fn for_path(&self, path: &str, identity: Option<&SessionIdentity>) -> Arc<DataProvider> {
        self.activate(DataMode::from_path(path), identity)
    }

    /// Forget the active provider; the next request builds a fresh one
    pub fn reset(&self) -> Option<Arc<DataProvider>> {
        self.active.write().take()
    }
}

// The cached demo provider carries the demo actor
impl DemoStatePurge for DataLayerContext {
    fn name(&self) -> &'static str {
        "demo-provider"
    }

    fn purge(&self) -> Result<(), PurgeError> {
        if let Some(dropped) = self.reset() {
            debug!(mode = ?dropped.mode(), "Dropped active data provider");
        }
        Ok(())
    }
}
