use crate::authz::EnhancedResource;

pub const NAME: &str = "WorkItem";

/// Anything scheduled on a project timeline.
pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["title", "status", "start_date", "end_date", "assignee"])
        .calculated_props(["progress"])
        .list_relation("dependencies", super::dependency::NAME)
        .table("work_items")
}
