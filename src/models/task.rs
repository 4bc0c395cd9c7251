use crate::authz::EnhancedResource;

pub const NAME: &str = "Task";

pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props([
            "title",
            "status",
            "start_date",
            "end_date",
            "assignee",
            "due_date",
            "duration_days",
            "parent_id",
        ])
        .calculated_props(["progress"])
        .list_relation("dependencies", super::dependency::NAME)
        .implements([super::work_item::NAME])
        .table("tasks")
}
