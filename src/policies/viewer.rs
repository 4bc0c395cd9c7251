use super::roles;
use crate::authz::{Condition, PolicyRegistry, RoleScope};
use crate::models::{progress, project, project_plan, work_item};

pub fn register(registry: &mut PolicyRegistry) {
    registry.declare("viewer", RoleScope::roles([roles::VIEWER]), |g| {
        let member = Condition::member();
        Ok(vec![
            g.resource(project::NAME)?.when(member.clone()).read().into(),
            g.resource(project_plan::NAME)?.read().into(),
            g.resource(work_item::NAME)?.when(member.clone()).read().into(),
            g.resource(progress::NAME)?.when(member).read().into(),
        ])
    });
}
