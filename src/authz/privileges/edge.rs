use super::ResourcePrivileges;
use crate::authz::permission::Permission;
use crate::authz::resource::Action;
use crate::errors::AuthzResult;

/// Privileges on one secured prop or child relation of a resource.
pub struct EdgePrivileges<'r, 'a> {
    resource: &'r ResourcePrivileges<'a>,
    key: String,
}

impl<'r, 'a> EdgePrivileges<'r, 'a> {
    pub(crate) fn new(resource: &'r ResourcePrivileges<'a>, key: String) -> Self {
        Self { resource, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_relation(&self) -> bool {
        self.resource.resource().relation(&self.key).is_some()
    }

    /// Whether `action` means anything for this edge.
    pub fn supports(&self, action: Action) -> bool {
        match self.resource.resource().relation(&self.key) {
            Some(relation) => relation.kind.allows(action),
            None => Action::PROP.contains(&action),
        }
    }

    pub fn resolve(&self, action: Action) -> AuthzResult<Permission> {
        if !self.supports(action) {
            return Ok(Permission::Deny);
        }
        self.resource.resolve(action, Some(&self.key))
    }

    pub fn can(&self, action: Action) -> AuthzResult<bool> {
        if !self.supports(action) {
            return Ok(false);
        }
        self.resource.can(action, Some(&self.key))
    }

    pub fn verify_can(&self, action: Action) -> AuthzResult<()> {
        self.resource.verify_can(action, Some(&self.key))
    }

    pub fn can_read(&self) -> AuthzResult<bool> {
        self.can(Action::Read)
    }

    pub fn can_edit(&self) -> AuthzResult<bool> {
        self.can(Action::Edit)
    }

    /// Add to a list relation.
    pub fn can_create(&self) -> AuthzResult<bool> {
        self.can(Action::Create)
    }

    /// Remove from a list relation.
    pub fn can_delete(&self) -> AuthzResult<bool> {
        self.can(Action::Delete)
    }
}
