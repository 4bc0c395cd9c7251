use super::roles;
use crate::authz::{Condition, PolicyRegistry, RoleScope};
use crate::models::{dependency, progress, project, project_plan, work_item};

/// Project managers start projects and run the ones they belong to.
/// Archived projects stay readable but frozen.
pub fn register(registry: &mut PolicyRegistry) {
    registry.declare(
        "project_manager",
        RoleScope::roles([roles::PROJECT_MANAGER]),
        |g| {
            let member = Condition::member();
            Ok(vec![
                g.resource(project::NAME)?
                    .create()
                    .when(member.clone())
                    .read()
                    .into(),
                g.variants(project::NAME)?
                    .when(member.clone())
                    .variants([project::ACTIVE])
                    .edit()
                    .delete()
                    .into(),
                g.resource(project_plan::NAME)?.crud().into(),
                g.resource(work_item::NAME)?
                    .when(member.clone())
                    .crud()
                    .into(),
                g.resource(dependency::NAME)?.crud().into(),
                g.resource(progress::NAME)?.when(member).read().into(),
            ])
        },
    );
}
