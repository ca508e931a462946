//! Demo sign-in state

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::data::demo::DEMO_USER_ID;

use super::guard::{DemoStatePurge, PurgeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoUser {
    pub user_id: String,
    pub display_name: String,
    pub signed_in_at: DateTime<Utc>,
}

/// The demo's stand-in for an auth session; never carries live credentials
#[derive(Debug, Default)]
pub struct DemoSession {
    user: RwLock<Option<DemoUser>>,
}

impl DemoSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DemoUser> {
        self.user.read().clone()
    }

    /// Signed-in demo user, signing in the built-in one if nobody is
    pub fn ensure_signed_in(&self) -> DemoUser {
        if let Some(user) = self.current() {
            return user;
        }

        let mut slot = self.user.write();
        slot.get_or_insert_with(|| {
            debug!("Demo user signed in");
            DemoUser {
                user_id: DEMO_USER_ID.to_string(),
                display_name: "Demo user".to_string(),
                signed_in_at: Utc::now(),
            }
        })
        .clone()
    }

    pub fn sign_out(&self) {
        self.user.write().take();
    }
}

impl DemoStatePurge for DemoSession {
    fn name(&self) -> &'static str {
        "demo-auth"
    }

    fn purge(&self) -> Result<(), PurgeError> {
        self.sign_out();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_is_sticky_until_purged() {
        let session = DemoSession::new();
        assert!(session.current().is_none());

        let first = session.ensure_signed_in();
        assert_eq!(first.user_id, DEMO_USER_ID);
        assert_eq!(session.ensure_signed_in(), first);

        session.purge().unwrap();
        assert!(session.current().is_none());
        session.purge().unwrap();
    }
}
