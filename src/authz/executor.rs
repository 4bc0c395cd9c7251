use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use super::condition::{all, Condition};
use super::optimizer::Optimizer;
use super::permission::Permission;
use super::policy::{CompiledPolicies, PolicyFactory, PolicyRegistry, Power};
use super::resource::{Action, ResourceMap};
use super::session::Session;
use crate::config::AuthzConfig;
use crate::errors::{AuthzError, AuthzResult};

/// Resolves permissions against the compiled policies.
///
/// Resolution order:
/// 1. non-read actions on calculated data -> deny
/// 2. keep policies whose roles intersect the session's (or have no roles)
/// 3. per policy: child-relation grant, property grant, object grant
/// 4. merge across policies: any allow wins, denials are skipped
#[derive(Debug)]
pub struct PolicyExecutor {
    resources: Arc<ResourceMap>,
    compiled: OnceLock<Arc<CompiledPolicies>>,
    optimizer: Optimizer,
}

impl PolicyExecutor {
    pub fn new(resources: Arc<ResourceMap>, config: &AuthzConfig) -> Self {
        Self {
            resources,
            compiled: OnceLock::new(),
            optimizer: Optimizer::standard(config.optimizer_max_passes),
        }
    }

    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Compiles `registry`. Allowed once per executor.
    pub fn compile(&self, registry: &PolicyRegistry) -> AuthzResult<()> {
        let compiled = PolicyFactory::new(&self.resources).compile(registry)?;
        self.compiled
            .set(Arc::new(compiled))
            .map_err(|_| AuthzError::configuration("policies are already compiled"))
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    pub fn compiled(&self) -> AuthzResult<&Arc<CompiledPolicies>> {
        self.compiled
            .get()
            .ok_or_else(|| AuthzError::configuration("permissions resolved before policies were compiled"))
    }

    pub fn resources(&self) -> &Arc<ResourceMap> {
        &self.resources
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn resolve(
        &self,
        action: Action,
        session: &Session,
        resource: &str,
        prop: Option<&str>,
        optimize: bool,
    ) -> AuthzResult<Permission> {
        let compiled = self.compiled()?;
        let enhanced = self.resources.get(resource)?;

        let calculated = enhanced.calculated || prop.is_some_and(|p| enhanced.is_calculated_prop(p));
        if calculated && action != Action::Read {
            tracing::debug!(
                resource = %resource,
                action = %action,
                prop = ?prop,
                "calculated data cannot be changed"
            );
            return Ok(Permission::Deny);
        }

        let permissions = compiled
            .live
            .iter()
            .filter(|policy| policy.applies_to(session))
            .map(|policy| {
                policy
                    .grants_for(resource)
                    .map(|grants| grants.lookup(enhanced, action, prop))
                    .unwrap_or_default()
            });
        let mut permission = Permission::merge_across_policies(permissions);
        if optimize {
            permission = self.optimizer.optimize_permission(permission);
        }

        tracing::debug!(
            resource = %resource,
            action = %action,
            prop = ?prop,
            permission = %permission,
            "resolved permission"
        );
        Ok(permission)
    }

    /// Merges the DB policies for an object-level action. With no ambient
    /// session, each role-scoped policy's grant is wrapped in a role check;
    /// only a policy without roles can yield an unconditional allow.
    pub fn resolve_for_db(&self, action: Action, resource: &str) -> AuthzResult<Permission> {
        let compiled = self.compiled()?;
        let enhanced = self.resources.get(resource)?;

        // a policy that stripped this implementation is covered by its
        // nearest interface's grants
        let permissions = compiled.db.iter().map(|policy| {
            let permission = policy
                .grants_for(resource)
                .or_else(|| {
                    enhanced
                        .interfaces
                        .iter()
                        .find_map(|interface| policy.grants_for(interface))
                })
                .map(|grants| grants.lookup(enhanced, action, None))
                .unwrap_or_default();
            let Some(roles) = &policy.roles else {
                return permission;
            };
            let role_check = Condition::role(roles.iter().cloned());
            match permission {
                Permission::Deny => Permission::Deny,
                Permission::Allow => Permission::When(role_check),
                Permission::When(condition) => Permission::When(all(vec![role_check, condition])),
            }
        });
        Ok(Permission::merge_across_policies(permissions))
    }

    /// Whether any DB policy still carries grants for `resource`.
    pub fn declared_for_db(&self, resource: &str) -> AuthzResult<bool> {
        let compiled = self.compiled()?;
        Ok(compiled.db.iter().any(|policy| policy.grants_for(resource).is_some()))
    }

    /// Powers of every policy that applies to `session`.
    pub fn powers_for(&self, session: &Session) -> AuthzResult<BTreeSet<Power>> {
        let compiled = self.compiled()?;
        Ok(compiled
            .live
            .iter()
            .filter(|policy| policy.applies_to(session))
            .flat_map(|policy| policy.powers.iter().cloned())
            .collect())
    }

    pub fn has_power(&self, session: &Session, power: &Power) -> AuthzResult<bool> {
        Ok(self.powers_for(session)?.contains(power))
    }
}
