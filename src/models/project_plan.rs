use crate::authz::EnhancedResource;

pub const NAME: &str = "ProjectPlan";

pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["date", "planned_progress"])
        .table("project_plans")
}
