//! Tenant role catalog and the role × capability permission matrix
//!
//! The matrix is built once from ordered static catalogs. It is total: every
//! declared role carries an entry for every declared capability, and any
//! combination the grant table does not mention is denied.

use serde::Serialize;

/// One tenant-scoped role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

pub const ROLE_CATALOG: &[RoleDefinition] = &[
    RoleDefinition {
        id: "owner",
        label: "Owner",
        description: "Full control of the organization, its members and billing.",
    },
    RoleDefinition {
        id: "admin",
        label: "Administrator",
        description: "Manages projects and members; cannot change billing.",
    },
    RoleDefinition {
        id: "manager",
        label: "Project manager",
        description: "Runs projects day to day and signs off approvals and payments.",
    },
    RoleDefinition {
        id: "member",
        label: "Site member",
        description: "Records materials, progress and files on assigned projects.",
    },
    RoleDefinition {
        id: "viewer",
        label: "Viewer",
        description: "Read-only access to project data.",
    },
];

pub const CAPABILITY_CATALOG: &[&str] = &[
    "projects.read",
    "projects.write",
    "materials.read",
    "materials.write",
    "progress.read",
    "progress.write",
    "payments.read",
    "payments.write",
    "approvals.read",
    "approvals.write",
    "files.write",
    "members.manage",
    "billing.manage",
];

const READ_ALL: &[&str] = &[
    "projects.read",
    "materials.read",
    "progress.read",
    "payments.read",
    "approvals.read",
];

/// Declared grants; anything not listed is denied
pub const GRANTS: &[(&str, &[&str])] = &[
    ("owner", CAPABILITY_CATALOG),
    ("admin", &[
        "projects.read", "projects.write", "materials.read", "materials.write",
        "progress.read", "progress.write", "payments.read", "payments.write",
        "approvals.read", "approvals.write", "files.write", "members.manage",
    ]),
    ("manager", &[
        "projects.read", "projects.write", "materials.read", "materials.write",
        "progress.read", "progress.write", "payments.read", "payments.write",
        "approvals.read", "approvals.write", "files.write",
    ]),
    ("member", &[
        "projects.read", "materials.read", "materials.write", "progress.read",
        "progress.write", "payments.read", "approvals.read", "files.write",
    ]),
    ("viewer", READ_ALL),
];

/// Deterministic, total role × capability grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    roles: Vec<RoleDefinition>,
    capabilities: Vec<&'static str>,
    /// `granted[r][c]` for `roles[r]`, `capabilities[c]`
    granted: Vec<Vec<bool>>,
}

impl PermissionMatrix {
    /// Build from catalogs and a grant table. Grants naming an undeclared
    /// role or capability are ignored.
    pub fn build(
        roles: &[RoleDefinition],
        capabilities: &[&'static str],
        grants: &[(&str, &[&str])],
    ) -> Self {
        let granted = roles
            .iter()
            .map(|role| {
                capabilities
                    .iter()
                    .map(|capability| {
                        grants.iter().any(|(role_id, caps)| {
                            *role_id == role.id && caps.contains(capability)
                        })
                    })
                    .collect()
            })
            .collect();

        Self {
            roles: roles.to_vec(),
            capabilities: capabilities.to_vec(),
            granted,
        }
    }

    /// The application's built-in catalogs
    pub fn standard() -> Self {
        Self::build(ROLE_CATALOG, CAPABILITY_CATALOG, GRANTS)
    }

    pub fn roles(&self) -> &[RoleDefinition] {
        &self.roles
    }

    pub fn capabilities(&self) -> &[&'static str] {
        &self.capabilities
    }

    /// Unknown roles and capabilities are denied
    pub fn is_granted(&self, role_id: &str, capability: &str) -> bool {
        let Some(r) = self.roles.iter().position(|role| role.id == role_id) else {
            return false;
        };
        let Some(c) = self.capabilities.iter().position(|cap| *cap == capability) else {
            return false;
        };
        self.granted[r][c]
    }

    /// Renderable rows, in catalog order
    pub fn rows(&self) -> Vec<MatrixRow> {
        self.roles
            .iter()
            .zip(&self.granted)
            .map(|(role, row)| MatrixRow {
                role: *role,
                grants: self
                    .capabilities
                    .iter()
                    .zip(row)
                    .map(|(capability, granted)| CapabilityGrant {
                        capability,
                        granted: *granted,
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatrixRow {
    #[serde(flatten)]
    pub role: RoleDefinition,
    pub grants: Vec<CapabilityGrant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityGrant {
    pub capability: &'static str,
    pub granted: bool,
}
