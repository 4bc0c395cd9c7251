use std::fmt;

use super::condition::{any, short_digest, Condition, EvalContext};
use crate::errors::AuthzResult;

/// A permission decision as produced by one policy or by resolution.
///
/// `Deny` only means "this policy declines"; another policy may still allow.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Permission {
    Allow,
    #[default]
    Deny,
    When(Condition),
}

impl Permission {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            Permission::Allow
        } else {
            Permission::Deny
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Permission::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Permission::Deny)
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Permission::When(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> AuthzResult<bool> {
        match self {
            Permission::Allow => Ok(true),
            Permission::Deny => Ok(false),
            Permission::When(condition) => condition.is_allowed(ctx),
        }
    }

    /// Merge grants declared for the same action within one policy: an
    /// explicit deny wins, then allow, then the conditions are or'd.
    pub fn merge_within_policy<I>(grants: I) -> Permission
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut conditions = Vec::new();
        let mut allowed = false;
        for grant in grants {
            match grant {
                Permission::Deny => return Permission::Deny,
                Permission::Allow => allowed = true,
                Permission::When(condition) => conditions.push(condition),
            }
        }
        if allowed {
            Permission::Allow
        } else if conditions.is_empty() {
            Permission::Deny
        } else {
            Permission::When(any(conditions))
        }
    }

    /// Merge the decisions of separate policies: any allow wins, denials are
    /// skipped and the remaining conditions are or'd.
    pub fn merge_across_policies<I>(grants: I) -> Permission
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut conditions = Vec::new();
        for grant in grants {
            match grant {
                Permission::Allow => return Permission::Allow,
                Permission::Deny => {}
                Permission::When(condition) => conditions.push(condition),
            }
        }
        if conditions.is_empty() {
            Permission::Deny
        } else {
            Permission::When(any(conditions))
        }
    }

    /// The most permissive decision that every input allows.
    pub fn intersect<'a, I>(grants: I) -> Permission
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let mut conditions = Vec::new();
        for grant in grants {
            match grant {
                Permission::Deny => return Permission::Deny,
                Permission::Allow => {}
                Permission::When(condition) => conditions.push(condition.clone()),
            }
        }
        if conditions.is_empty() {
            Permission::Allow
        } else {
            Permission::When(Condition::intersect(&conditions))
        }
    }

    pub fn map_condition(self, f: impl FnOnce(Condition) -> Condition) -> Permission {
        match self {
            Permission::When(condition) => Permission::When(f(condition)),
            other => other,
        }
    }

    /// Canonical identity, comparable across policies.
    pub fn id(&self) -> String {
        match self {
            Permission::Allow => "true".to_string(),
            Permission::Deny => "false".to_string(),
            Permission::When(condition) => condition.id(),
        }
    }

    pub fn fingerprint(&self) -> String {
        short_digest(&self.id())
    }

    /// An in-process predicate equivalent to this permission.
    pub fn predicate(&self) -> impl Fn(&EvalContext<'_>) -> AuthzResult<bool> + '_ {
        move |ctx: &EvalContext<'_>| self.is_allowed(ctx)
    }
}

impl From<bool> for Permission {
    fn from(value: bool) -> Self {
        Permission::from_bool(value)
    }
}

impl From<Condition> for Permission {
    fn from(value: Condition) -> Self {
        Permission::When(value)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
