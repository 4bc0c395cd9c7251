//! Policy declarations and their compiled form.
//!
//! Declarations enter through [`PolicyRegistry`]; [`PolicyFactory`] compiles
//! them once into [`CompiledPolicies`], which is read-only afterwards.

mod factory;
mod registry;

pub use factory::PolicyFactory;
pub use registry::{GrantFn, PolicyDeclaration, PolicyRegistry};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::permission::Permission;
use super::resource::{Action, EnhancedResource};
use super::session::{Role, Session};

/// Which sessions a declaration applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    All,
    Roles(BTreeSet<Role>),
}

impl RoleScope {
    pub fn roles<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        RoleScope::Roles(roles.into_iter().map(Into::into).collect())
    }

    pub fn into_roles(self) -> Option<BTreeSet<Role>> {
        match self {
            RoleScope::All => None,
            RoleScope::Roles(roles) => Some(roles),
        }
    }
}

/// A coarse capability derived from an unconditional grant, checkable
/// without an object instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Power {
    Create(String),
}

impl Power {
    pub fn create(resource: impl Into<String>) -> Self {
        Power::Create(resource.into())
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Power::Create(resource) => write!(f, "create:{resource}"),
        }
    }
}

/// The merged grants of one policy for one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGrants {
    pub object_level: BTreeMap<Action, Permission>,
    pub prop_level: BTreeMap<String, BTreeMap<Action, Permission>>,
    pub child_relations: BTreeMap<String, BTreeMap<Action, Permission>>,
}

impl ResourceGrants {
    /// The most specific permission for `action`: a child-relation grant,
    /// then a property grant, then the object-level grant. Falls back per
    /// action, so an entry that says nothing about `action` defers to the
    /// next level.
    pub fn lookup(&self, resource: &EnhancedResource, action: Action, prop: Option<&str>) -> Permission {
        let relation = prop
            .filter(|prop| resource.relation(prop).is_some())
            .and_then(|prop| self.child_relations.get(prop))
            .and_then(|entry| entry.get(&action));
        let property = || {
            prop.and_then(|prop| self.prop_level.get(prop))
                .and_then(|entry| entry.get(&action))
        };
        relation
            .or_else(property)
            .or_else(|| self.object_level.get(&action))
            .cloned()
            .unwrap_or_default()
    }

    /// Every permission held, for passes that rewrite conditions.
    pub fn permissions_mut(&mut self) -> impl Iterator<Item = &mut Permission> {
        self.object_level
            .values_mut()
            .chain(self.prop_level.values_mut().flat_map(BTreeMap::values_mut))
            .chain(self.child_relations.values_mut().flat_map(BTreeMap::values_mut))
    }
}

/// One compiled policy.
#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    /// `None` applies to every session.
    pub roles: Option<BTreeSet<Role>>,
    pub grants: BTreeMap<String, ResourceGrants>,
    pub powers: BTreeSet<Power>,
}

impl Policy {
    /// Whether the policy applies to `session`, matching role names in any
    /// scope.
    pub fn applies_to(&self, session: &Session) -> bool {
        match &self.roles {
            None => true,
            Some(roles) => session.has_any_role(roles),
        }
    }

    pub fn grants_for(&self, resource: &str) -> Option<&ResourceGrants> {
        self.grants.get(resource)
    }
}

/// Output of compilation: the live variant used for resolution and the DB
/// variant used for access-policy generation.
#[derive(Debug, Clone, Default)]
pub struct CompiledPolicies {
    pub live: Vec<Policy>,
    pub db: Vec<Policy>,
}
