use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope used for roles that are not tied to a specific object.
pub const GLOBAL_SCOPE: &str = "global";

/// A role name as declared by policies, without its scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A role held within a scope, written `scope:Role` (e.g. `project:member`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopedRole {
    pub scope: String,
    pub role: Role,
}

impl ScopedRole {
    pub fn new(scope: impl Into<String>, role: impl Into<Role>) -> Self {
        Self {
            scope: scope.into(),
            role: role.into(),
        }
    }

    pub fn global(role: impl Into<Role>) -> Self {
        Self::new(GLOBAL_SCOPE, role)
    }

    /// Parse `scope:Role`; a bare role name is treated as global.
    pub fn parse(value: &str) -> Self {
        match value.split_once(':') {
            Some((scope, role)) if !scope.is_empty() && !role.is_empty() => {
                Self::new(scope, role)
            }
            _ => Self::global(value.trim_start_matches(':')),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_SCOPE
    }
}

impl fmt::Display for ScopedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.role)
    }
}

/// The requesting session, consumed read-only by the engine.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user_id: Option<Uuid>,
    pub roles: BTreeSet<ScopedRole>,
    pub anonymous: bool,
    /// The session that started impersonating this one, if any.
    pub impersonator: Option<Box<Session>>,
}

impl Session {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.roles = roles
            .into_iter()
            .map(|role| ScopedRole::parse(role.as_ref()))
            .collect();
        self
    }

    pub fn impersonated_by(mut self, impersonator: Session) -> Self {
        self.impersonator = Some(Box::new(impersonator));
        self
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonator.is_some()
    }

    /// Role names held in any scope.
    pub fn role_names(&self) -> BTreeSet<Role> {
        self.roles.iter().map(|scoped| scoped.role.clone()).collect()
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|scoped| &scoped.role == role)
    }

    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> bool {
        roles.into_iter().any(|role| self.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scoped_and_bare_roles() {
        assert_eq!(
            ScopedRole::parse("project:member"),
            ScopedRole::new("project", "member")
        );
        assert_eq!(ScopedRole::parse("admin"), ScopedRole::global("admin"));
        assert!(ScopedRole::parse("global:viewer").is_global());
    }

    #[test]
    fn role_names_ignore_scope() {
        let session =
            Session::new(Uuid::new_v4()).with_roles(["global:admin", "project:member"]);
        let names = session.role_names();
        assert!(names.contains(&Role::new("admin")));
        assert!(names.contains(&Role::new("member")));
        assert!(session.has_any_role([&Role::new("member")]));
        assert!(!session.has_role(&Role::new("viewer")));
    }

    #[test]
    fn impersonation_is_tracked() {
        let admin = Session::new(Uuid::new_v4()).with_roles(["admin"]);
        let viewer = Session::new(Uuid::new_v4()).with_roles(["viewer"]);
        assert!(!viewer.is_impersonating());
        assert!(viewer.impersonated_by(admin).is_impersonating());
    }
}
