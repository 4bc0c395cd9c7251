use super::roles;
use crate::authz::{Condition, PolicyRegistry, RoleScope};
use crate::models::{dependency, progress, project, project_plan, task, work_item};

/// Members read their projects and work on items assigned to them.
pub fn register(registry: &mut PolicyRegistry) {
    registry.declare("member", RoleScope::roles([roles::MEMBER]), |g| {
        let member = Condition::member();
        let assignee = Condition::owned_by_requester("assignee");
        Ok(vec![
            g.resource(project::NAME)?.when(member.clone()).read().into(),
            g.resource(project_plan::NAME)?.read().into(),
            g.resource(work_item::NAME)?
                .when(member.clone())
                .read()
                .specifically(|p| {
                    p.props(["status", "start_date", "end_date"])
                        .when(assignee.clone())
                        .edit()
                })
                .into(),
            g.resource(task::NAME)?
                .when(member.clone())
                .read()
                .create()
                .or()
                .when(assignee.clone())
                .edit()
                .children(|c| c.relation("dependencies").when(assignee).create().delete())
                .into(),
            g.resource(dependency::NAME)?.read().into(),
            g.resource(progress::NAME)?.when(member).read().into(),
        ])
    });
}
