//! Access control: platform roles, tenant permission matrix, capability gates

pub mod gate;
pub mod permissions;
pub mod platform_role;

pub use gate::{AllowAll, CapabilityGate, MembershipGate};
pub use permissions::{PermissionMatrix, RoleDefinition, CAPABILITY_CATALOG, ROLE_CATALOG};
pub use platform_role::{PlatformRole, PlatformRoleResolver, RoleAssociationSource};
