//! The s-curve business resources, described for the policy engine.

pub mod dependency;
pub mod milestone;
pub mod progress;
pub mod project;
pub mod project_plan;
pub mod task;
pub mod user;
pub mod work_item;

use crate::authz::ResourceMap;
use crate::errors::AuthzResult;

/// The full catalogue, with the interface graph resolved.
pub fn resources() -> AuthzResult<ResourceMap> {
    ResourceMap::build([
        user::resource(),
        project::resource(),
        project_plan::resource(),
        work_item::resource(),
        task::resource(),
        milestone::resource(),
        dependency::resource(),
        progress::resource(),
    ])
}
