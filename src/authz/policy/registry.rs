use std::fmt;

use super::RoleScope;
use crate::authz::granter::{Granters, ResourceGrant};
use crate::errors::AuthzResult;

/// Produces the grants of one declaration when handed the granters of a
/// catalogue.
pub type GrantFn = Box<dyn Fn(&Granters<'_>) -> AuthzResult<Vec<ResourceGrant>> + Send + Sync>;

pub struct PolicyDeclaration {
    pub name: String,
    pub scope: RoleScope,
    grant_fn: GrantFn,
}

impl PolicyDeclaration {
    pub fn grants(&self, granters: &Granters<'_>) -> AuthzResult<Vec<ResourceGrant>> {
        (self.grant_fn)(granters)
    }
}

impl fmt::Debug for PolicyDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyDeclaration")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// The startup list of policy declarations, in registration order.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    declarations: Vec<PolicyDeclaration>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a declaration. Names must be unique; the factory rejects
    /// duplicates.
    pub fn declare<F>(&mut self, name: impl Into<String>, scope: RoleScope, grant_fn: F) -> &mut Self
    where
        F: Fn(&Granters<'_>) -> AuthzResult<Vec<ResourceGrant>> + Send + Sync + 'static,
    {
        self.declarations.push(PolicyDeclaration {
            name: name.into(),
            scope,
            grant_fn: Box::new(grant_fn),
        });
        self
    }

    pub fn declarations(&self) -> &[PolicyDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::resource::{EnhancedResource, ResourceMap};

    #[test]
    fn declarations_keep_registration_order() {
        let mut registry = PolicyRegistry::new();
        registry
            .declare("admin", RoleScope::roles(["admin"]), |g| {
                Ok(vec![g.resource("Project")?.crud().into()])
            })
            .declare("everyone", RoleScope::All, |_| Ok(Vec::new()));

        let names: Vec<&str> = registry.declarations().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "everyone"]);

        let map = ResourceMap::build([EnhancedResource::new("Project")]).unwrap();
        let grants = registry.declarations()[0].grants(&Granters::new(&map)).unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].object.len(), 4);
    }
}
