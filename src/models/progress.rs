use crate::authz::EnhancedResource;

pub const NAME: &str = "ProjectProgress";

/// The S-curve itself: planned against actual progress, computed from tasks.
pub fn resource() -> EnhancedResource {
    EnhancedResource::new(NAME)
        .props(["project_id", "date", "planned_progress", "actual_progress"])
        .calculated()
        .table("project_progress")
}
