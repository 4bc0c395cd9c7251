//! Authorization module - Policy Engine
//!
//! This module implements the RBAC+ABAC policy engine with support for:
//! - Role-scoped policy declarations built with the granter DSL
//! - Interface / implementation permission defaulting
//! - Conditions evaluated in-process or rendered as query filters
//! - Row-level security statements generated from the same policies
//! - Configurable enforcement modes (off/advisory/strict)

pub mod cache;
pub mod codegen;
pub mod condition;
pub mod executor;
pub mod granter;
pub mod optimizer;
pub mod permission;
pub mod policy;
pub mod privileges;
pub mod resource;
pub mod session;

pub use cache::ResolutionCache;
pub use condition::{all, any, Condition, ConditionKind, EvalContext};
pub use executor::PolicyExecutor;
pub use granter::{Granter, Granters, ResourceGrant, ResourceGranter, VariantGranter};
pub use optimizer::Optimizer;
pub use permission::Permission;
pub use policy::{CompiledPolicies, Policy, PolicyFactory, PolicyRegistry, Power, RoleScope};
pub use privileges::{
    DbFilterOptions, Privileges, QueryBackend, ReadFilter, ResourcePrivileges, SessionPrivileges,
};
pub use resource::{Action, EnhancedResource, ObjectContext, Record, ResourceMap};
pub use session::{Role, ScopedRole, Session};

use std::sync::Arc;

use crate::config::AuthzConfig;
use crate::errors::AuthzResult;

/// Builds an executor for `resources`, compiles `registry` into it and wraps
/// it in a [`Privileges`] handle.
pub fn initialize(
    resources: ResourceMap,
    registry: &PolicyRegistry,
    config: AuthzConfig,
) -> AuthzResult<Privileges> {
    let executor = PolicyExecutor::new(Arc::new(resources), &config);
    executor.compile(registry)?;
    Ok(Privileges::new(Arc::new(executor), config))
}
