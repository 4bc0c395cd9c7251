use crate::authz::EnhancedResource;

pub const NAME: &str = "Project";

pub const ACTIVE: &str = "active";
pub const ARCHIVED: &str = "archived";

/// Projects are owned by `user_id` and shared through `project_members`.
pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["name", "description", "theme_color", "user_id"])
        .calculated_props(["progress"])
        .list_relation("tasks", super::work_item::NAME)
        .single_relation("plan", super::project_plan::NAME)
        .variants([ACTIVE, ARCHIVED])
        .table("projects")
        .membership_table("project_members")
}
