use crate::authz::EnhancedResource;

pub const NAME: &str = "TaskDependency";

pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["source_task_id", "target_task_id", "type"])
        .table("task_dependencies")
}
