use super::roles;
use crate::authz::{PolicyRegistry, ResourceGrant, RoleScope};

/// Administrators can do everything to everything.
pub fn register(registry: &mut PolicyRegistry) {
    registry.declare(
        "admin",
        RoleScope::roles([roles::SUPER_ADMIN, roles::ADMIN]),
        |g| Ok(g.each().map(|resource| ResourceGrant::from(resource.crud())).collect()),
    );
}
