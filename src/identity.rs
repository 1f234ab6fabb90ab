//! Who is using the app. Sessions are opened for `current_user().id`; the
//! role only gates the weekly report.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::settings::ProfileSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub metadata: Value,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;

    fn current_user_role(&self) -> Option<Role>;

    fn is_admin(&self) -> bool {
        self.current_user_role() == Some(Role::Admin)
    }
}

/// Fixed identity resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserIdentity>,
    role: Option<Role>,
}

impl StaticIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserIdentity, role: Option<Role>) -> Self {
        Self {
            user: Some(user),
            role,
        }
    }

    pub fn from_profile(profile: &ProfileSettings) -> Self {
        let user = UserIdentity {
            id: profile.user_id.clone(),
            email: profile.email.clone(),
            metadata: json!({ "source": "settings" }),
        };
        Self::signed_in(user, profile.role)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }

    fn current_user_role(&self) -> Option<Role> {
        // A role without a user is meaningless.
        self.user.as_ref().and(self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_becomes_identity() {
        let identity = StaticIdentity::from_profile(&ProfileSettings {
            user_id: "u7".into(),
            email: "luis@example.com".into(),
            role: Some(Role::Admin),
        });
        assert_eq!(identity.current_user().map(|u| u.id).as_deref(), Some("u7"));
        assert!(identity.is_admin());
    }

    #[test]
    fn anonymous_has_no_role() {
        let identity = StaticIdentity::anonymous();
        assert!(identity.current_user().is_none());
        assert_eq!(identity.current_user_role(), None);
        assert!(!identity.is_admin());
    }
}
