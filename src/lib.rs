pub mod authz;
pub mod config;
pub mod errors;
pub mod models;
pub mod policies;

// Re-export commonly used items for tests
pub use authz::initialize;
pub use config::{AuthzConfig, AuthzMode};
pub use errors::{AuthzError, AuthzResult};
