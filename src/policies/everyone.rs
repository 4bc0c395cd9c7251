use crate::authz::{Condition, PolicyRegistry, RoleScope};
use crate::models::user;

/// Every session can see who else is around and manage its own profile.
pub fn register(registry: &mut PolicyRegistry) {
    registry.declare("everyone", RoleScope::All, |g| {
        let own = Condition::owned_by_requester("id");
        Ok(vec![g
            .resource(user::NAME)?
            .read()
            .when(own.clone())
            .edit()
            .specifically(|p| {
                p.props(["email", "provider", "provider_id"])
                    .when(own)
                    .read()
                    .edit()
            })
            .into()])
    });
}
