//! Capability checks consulted before every mutating call

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::data::error::{DataError, DataResult};
use crate::store::supabase::SupabaseClient;

use super::permissions::PermissionMatrix;
use super::platform_role::PlatformRoleResolver;

const TENANT_MEMBERS: &str = "tenant_members";

#[async_trait]
pub trait CapabilityGate: Send + Sync {
    /// `Ok(())` when `actor` currently holds `capability` in `tenant_id`
    async fn authorize(&self, tenant_id: &str, actor: &str, capability: &'static str) -> DataResult<()>;
}

/// Demo mode: everything is allowed
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl CapabilityGate for AllowAll {
    async fn authorize(&self, _tenant_id: &str, _actor: &str, _capability: &'static str) -> DataResult<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    role: String,
}

/// Live mode: the actor's current tenant role, looked up on every call,
/// checked against the permission matrix. Platform admins pass.
#[derive(Clone)]
pub struct MembershipGate {
    client: SupabaseClient,
    matrix: Arc<PermissionMatrix>,
    platform_roles: PlatformRoleResolver,
}

impl MembershipGate {
    pub fn new(
        client: SupabaseClient,
        matrix: Arc<PermissionMatrix>,
        platform_roles: PlatformRoleResolver,
    ) -> Self {
        Self {
            client,
            matrix,
            platform_roles,
        }
    }
}

#[async_trait]
impl CapabilityGate for MembershipGate {
    async fn authorize(&self, tenant_id: &str, actor: &str, capability: &'static str) -> DataResult<()> {
        if self.platform_roles.is_platform_admin(actor).await? {
            debug!(tenant_id, actor, capability, "Platform admin bypass");
            return Ok(());
        }

        let query = format!(
            "tenant_id=eq.{}&user_id=eq.{}&select=role&limit=1",
            tenant_id, actor
        );
        let rows: Vec<MemberRow> = self.client.get(TENANT_MEMBERS, &query).await?;
        let role = rows.into_iter().next().map(|row| row.role).ok_or_else(|| {
            DataError::Forbidden(format!("{} is not a member of {}", actor, tenant_id))
        })?;

        if self.matrix.is_granted(&role, capability) {
            Ok(())
        } else {
            Err(DataError::Forbidden(format!(
                "role '{}' lacks '{}'",
                role, capability
            )))
        }
    }
}
