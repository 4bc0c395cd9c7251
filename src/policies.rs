//! The s-curve policy declarations, one file per role group.

pub mod admin;
pub mod everyone;
pub mod member;
pub mod project_manager;
pub mod viewer;

use crate::authz::PolicyRegistry;

/// Well-known role names
pub mod roles {
    pub const SUPER_ADMIN: &str = "super_admin";
    pub const ADMIN: &str = "admin";
    pub const PROJECT_MANAGER: &str = "project_manager";
    pub const MEMBER: &str = "member";
    pub const VIEWER: &str = "viewer";
}

/// Every declaration, in registration order.
pub fn registry() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    admin::register(&mut registry);
    project_manager::register(&mut registry);
    member::register(&mut registry);
    viewer::register(&mut registry);
    everyone::register(&mut registry);
    registry
}
