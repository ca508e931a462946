//! Tenant-scoped project data
//!
//! Feature code asks the active [`DataProvider`] for an accessor and never
//! learns whether it is talking to the demo fixtures or the live backend.

pub mod accessor;
pub mod demo;
pub mod error;
pub mod files;
pub mod live;
pub mod models;
pub mod module;
pub mod provider;
pub mod record;

pub use accessor::{ModuleRecordAccessor, RecordBackend, RecordServices, TypedAccessor};
pub use demo::{DemoBackend, DEMO_PROJECT_ID, DEMO_TENANT_ID, DEMO_USER_ID};
pub use error::{DataError, DataResult};
pub use files::{FileBackend, ProjectFiles, StoredFile};
pub use live::LiveBackend;
pub use models::{Approval, Material, ModuleModel, Payment, ProgressReport};
pub use module::ModuleKey;
pub use provider::{
    DataLayerContext, DataMode, DataProvider, ProjectData, ProviderFactory, SessionIdentity,
    SharedServices,
};
pub use record::{ModuleRecord, Payload, RecordScope};
