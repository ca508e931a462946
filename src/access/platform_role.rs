//! Cross-tenant platform role lookup
//!
//! The `platform_roles` relation is rolled out progressively, so a
//! deployment without it is a normal "no role" state. Only that absence is
//! absorbed here; every other fault reaches the caller unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::error::{DataError, DataResult};
use crate::store::supabase::SupabaseClient;

/// The single stored value recognised as elevated
pub const PLATFORM_ADMIN: &str = "platform_admin";

const PLATFORM_ROLES: &str = "platform_roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    PlatformAdmin,
}

impl PlatformRole {
    /// Exact match only; anything else is not a platform role
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            PLATFORM_ADMIN => Some(PlatformRole::PlatformAdmin),
            _ => None,
        }
    }
}

/// Where stored role associations come from
#[async_trait]
pub trait RoleAssociationSource: Send + Sync {
    /// Raw stored role string for `user_id`, if any row exists
    async fn stored_role(&self, user_id: &str) -> DataResult<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct PlatformRoleRow {
    role: Option<String>,
}

/// `platform_roles(user_id, role)` over PostgREST
#[derive(Clone)]
pub struct SupabaseRoleAssociations {
    client: SupabaseClient,
}

impl SupabaseRoleAssociations {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleAssociationSource for SupabaseRoleAssociations {
    async fn stored_role(&self, user_id: &str) -> DataResult<Option<String>> {
        let query = format!("user_id=eq.{}&select=role&limit=1", user_id);
        let rows: Vec<PlatformRoleRow> = self.client.get(PLATFORM_ROLES, &query).await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }
}

#[derive(Clone)]
pub struct PlatformRoleResolver {
    source: Arc<dyn RoleAssociationSource>,
}

impl PlatformRoleResolver {
    pub fn new(source: Arc<dyn RoleAssociationSource>) -> Self {
        Self { source }
    }

    pub fn from_supabase(client: SupabaseClient) -> Self {
        Self::new(Arc::new(SupabaseRoleAssociations::new(client)))
    }

    /// The user's platform role, or `None`
    pub async fn platform_role(&self, user_id: &str) -> DataResult<Option<PlatformRole>> {
        match self.source.stored_role(user_id).await {
            Ok(Some(raw)) => {
                let role = PlatformRole::parse(&raw);
                if role.is_none() {
                    debug!(user_id, stored = %raw, "Ignoring unrecognised platform role");
                }
                Ok(role)
            }
            Ok(None) => Ok(None),
            Err(DataError::SchemaAbsent(reason)) => {
                debug!(user_id, %reason, "Platform roles not provisioned; treating as no role");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn is_platform_admin(&self, user_id: &str) -> DataResult<bool> {
        Ok(self.platform_role(user_id).await? == Some(PlatformRole::PlatformAdmin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Fake {
        Stored(Option<&'static str>),
        Fails(DataError),
    }

    #[async_trait]
    impl RoleAssociationSource for Fake {
        async fn stored_role(&self, _user_id: &str) -> DataResult<Option<String>> {
            match self {
                Fake::Stored(role) => Ok(role.map(str::to_string)),
                Fake::Fails(err) => Err(err.clone()),
            }
        }
    }

    fn resolver(fake: Fake) -> PlatformRoleResolver {
        PlatformRoleResolver::new(Arc::new(fake))
    }

    #[tokio::test]
    async fn absent_relation_means_no_role_for_everyone() {
        let resolver = resolver(Fake::Fails(DataError::SchemaAbsent(
            "relation \"public.platform_roles\" does not exist".to_string(),
        )));

        for user in ["u-1", "u-2", "00000000-0000-0000-0000-000000000000"] {
            assert_eq!(resolver.platform_role(user).await, Ok(None));
        }
    }

    #[tokio::test]
    async fn only_the_exact_elevated_value_counts() {
        assert_eq!(
            resolver(Fake::Stored(Some("platform_admin")))
                .platform_role("u-1")
                .await,
            Ok(Some(PlatformRole::PlatformAdmin))
        );

        for stored in ["admin", "PLATFORM_ADMIN", " platform_admin", "superuser", ""] {
            assert_eq!(
                resolver(Fake::Stored(Some(stored))).platform_role("u-1").await,
                Ok(None),
                "{stored:?} was trusted"
            );
        }
        assert_eq!(resolver(Fake::Stored(None)).platform_role("u-1").await, Ok(None));
    }

    #[tokio::test]
    async fn other_faults_propagate() {
        let faults = [
            DataError::Transient("connection reset".to_string()),
            DataError::Forbidden("permission denied for table platform_roles".to_string()),
            DataError::Invalid("malformed".to_string()),
        ];
        for fault in faults {
            let got = resolver(Fake::Fails(fault.clone())).platform_role("u-1").await;
            assert_eq!(got, Err(fault));
        }
    }

    #[tokio::test]
    async fn is_platform_admin_reflects_role() {
        assert!(resolver(Fake::Stored(Some(PLATFORM_ADMIN)))
            .is_platform_admin("u-1")
            .await
            .unwrap());
        assert!(!resolver(Fake::Stored(Some("admin")))
            .is_platform_admin("u-1")
            .await
            .unwrap());
    }
}
