use crate::authz::EnhancedResource;

pub const NAME: &str = "Milestone";

pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["title", "status", "start_date", "end_date", "assignee"])
        .calculated_props(["progress"])
        .list_relation("dependencies", super::dependency::NAME)
        .implements([super::work_item::NAME])
        .table("milestones")
}
