use std::fmt;

use super::quote_ident;
use crate::authz::condition::Condition;
use crate::authz::executor::PolicyExecutor;
use crate::authz::permission::Permission;
use crate::authz::resource::{Action, DbMapping, EnhancedResource};
use crate::config::AuthzConfig;
use crate::errors::{AuthzError, AuthzResult};

/// Table metadata a condition renders against.
pub struct AccessPolicyContext<'a> {
    pub db: &'a DbMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DbStatementKind {
    Select,
    Insert,
    Delete,
}

impl DbStatementKind {
    pub const ALL: [DbStatementKind; 3] = [
        DbStatementKind::Select,
        DbStatementKind::Insert,
        DbStatementKind::Delete,
    ];

    pub fn action(&self) -> Action {
        match self {
            DbStatementKind::Select => Action::Read,
            DbStatementKind::Insert => Action::Create,
            DbStatementKind::Delete => Action::Delete,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            DbStatementKind::Select => "SELECT",
            DbStatementKind::Insert => "INSERT",
            DbStatementKind::Delete => "DELETE",
        }
    }

    /// Inserts are checked against the new row, the rest filter existing rows.
    fn clause(&self) -> &'static str {
        match self {
            DbStatementKind::Insert => "WITH CHECK",
            DbStatementKind::Select | DbStatementKind::Delete => "USING",
        }
    }
}

impl fmt::Display for DbStatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One named row-level security policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicyStatement {
    pub name: String,
    pub resource: String,
    pub kind: DbStatementKind,
    pub table: String,
    pub predicate: String,
}

impl AccessPolicyStatement {
    pub fn sql(&self) -> String {
        format!(
            "CREATE POLICY {} ON {} AS PERMISSIVE FOR {} {} ({});",
            quote_ident(&self.name),
            quote_ident(&self.table),
            self.kind.as_sql(),
            self.kind.clause(),
            self.predicate
        )
    }
}

impl fmt::Display for AccessPolicyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Renders a condition as a Postgres boolean expression.
pub fn render(condition: &Condition, ctx: &AccessPolicyContext<'_>) -> AuthzResult<String> {
    match condition {
        Condition::Role(role) => Ok(role.to_access_policy(ctx)),
        Condition::Variant(variant) => Ok(variant.to_access_policy(ctx)),
        Condition::Member(member) => Ok(member.to_access_policy(ctx)),
        Condition::Field(field) => Ok(field.to_access_policy(ctx)),
        Condition::Calculated => Err(AuthzError::codegen_invariant(format!(
            "calculated condition reached the access policy for {}",
            ctx.db.table
        ))),
        Condition::And(children) => join(children, " AND ", "true", ctx),
        Condition::Or(children) => join(children, " OR ", "false", ctx),
    }
}

fn join(children: &[Condition], op: &str, empty: &str, ctx: &AccessPolicyContext<'_>) -> AuthzResult<String> {
    match children {
        [] => Ok(empty.to_string()),
        [single] => render(single, ctx),
        _ => {
            let parts = children
                .iter()
                .map(|child| render(child, ctx))
                .collect::<AuthzResult<Vec<_>>>()?;
            Ok(format!("({})", parts.join(op)))
        }
    }
}

/// Builds access-policy statements from the DB variant of the compiled
/// policies.
///
/// Interface tables are expected to be inheritance parents of their
/// implementations, so an implementation whose grants were folded into its
/// interface emits nothing of its own.
pub struct AccessPolicyGenerator<'a> {
    executor: &'a PolicyExecutor,
    optimize: bool,
}

impl<'a> AccessPolicyGenerator<'a> {
    pub fn new(executor: &'a PolicyExecutor, config: &AuthzConfig) -> Self {
        Self {
            executor,
            optimize: config.optimize_db_filters,
        }
    }

    /// The statement for one resource and kind, or `None` when no rule is
    /// needed (nothing granted, or covered by an interface).
    pub fn statement(&self, resource: &str, kind: DbStatementKind) -> AuthzResult<Option<AccessPolicyStatement>> {
        let enhanced = self.executor.resources().get(resource)?;

        if enhanced.calculated && kind != DbStatementKind::Select {
            if self.ancestor_is_calculated(enhanced) {
                return Ok(None);
            }
            // written by the application itself, never by a session
            return Ok(Some(build(enhanced, kind, "calculated", "true".to_string())));
        }

        if !self.executor.declared_for_db(resource)? {
            return Ok(None);
        }

        let mut permission = self.executor.resolve_for_db(kind.action(), resource)?;
        if self.optimize {
            permission = self.executor.optimizer().optimize_permission(permission);
        }
        let predicate = match &permission {
            Permission::Deny => return Ok(None),
            Permission::Allow => "true".to_string(),
            Permission::When(condition) => render(condition, &AccessPolicyContext { db: &enhanced.db })?,
        };

        tracing::debug!(
            resource = %resource,
            kind = %kind,
            permission = %permission,
            "generated access policy"
        );
        Ok(Some(build(enhanced, kind, &permission.fingerprint(), predicate)))
    }

    /// Every statement for the catalogue, ordered by resource then kind.
    pub fn all_statements(&self) -> AuthzResult<Vec<AccessPolicyStatement>> {
        let mut statements = Vec::new();
        for resource in self.executor.resources().iter() {
            for kind in DbStatementKind::ALL {
                if let Some(statement) = self.statement(&resource.name, kind)? {
                    statements.push(statement);
                }
            }
        }
        tracing::info!(statements = statements.len(), "access policies generated");
        Ok(statements)
    }

    fn ancestor_is_calculated(&self, resource: &EnhancedResource) -> bool {
        resource
            .interfaces
            .iter()
            .filter_map(|name| self.executor.resources().get(name).ok())
            .any(|interface| interface.calculated)
    }
}

fn build(resource: &EnhancedResource, kind: DbStatementKind, suffix: &str, predicate: String) -> AccessPolicyStatement {
    AccessPolicyStatement {
        name: format!(
            "{}_{}_{}",
            resource.db.table,
            kind.as_sql().to_lowercase(),
            suffix
        ),
        resource: resource.name.clone(),
        kind,
        table: resource.db.table.clone(),
        predicate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::policy::{PolicyRegistry, RoleScope};
    use crate::authz::resource::ResourceMap;
    use std::sync::Arc;

    fn executor(registry: PolicyRegistry) -> PolicyExecutor {
        let map = ResourceMap::build([
            EnhancedResource::new("Animal"),
            EnhancedResource::new("Dog").implements(["Animal"]),
            EnhancedResource::new("Cat").implements(["Animal"]),
            EnhancedResource::new("Census").calculated(),
            EnhancedResource::new("Tally").calculated().implements(["Census"]),
        ])
        .unwrap();
        let executor = PolicyExecutor::new(Arc::new(map), &AuthzConfig::default());
        executor.compile(&registry).unwrap();
        executor
    }

    #[test]
    fn statement_wraps_role_scoped_grants() {
        let mut registry = PolicyRegistry::new();
        registry
            .declare("keeper", RoleScope::roles(["keeper"]), |g| {
                Ok(vec![g.resource("Cat")?.read().into()])
            })
            .declare("vet", RoleScope::roles(["vet"]), |g| {
                Ok(vec![g.resource("Cat")?.read().into()])
            });
        let executor = executor(registry);
        let generator = AccessPolicyGenerator::new(&executor, &AuthzConfig::default());
        let statement = generator
            .statement("Cat", DbStatementKind::Select)
            .unwrap()
            .unwrap();
        assert_eq!(
            statement.predicate,
            "(string_to_array(current_setting('app.roles', true), ',') && ARRAY['keeper', 'vet']::text[])"
        );
        assert!(statement.sql().starts_with("CREATE POLICY \"cat_select_"));
        assert!(statement.sql().contains("ON \"cat\" AS PERMISSIVE FOR SELECT USING ("));
        assert!(generator.statement("Cat", DbStatementKind::Delete).unwrap().is_none());
    }

    #[test]
    fn insert_uses_with_check_and_role_free_allow_is_true() {
        let mut registry = PolicyRegistry::new();
        registry.declare("everyone", RoleScope::All, |g| {
            Ok(vec![g.resource("Dog")?.create().into()])
        });
        let executor = executor(registry);
        let generator = AccessPolicyGenerator::new(&executor, &AuthzConfig::default());
        let statement = generator
            .statement("Dog", DbStatementKind::Insert)
            .unwrap()
            .unwrap();
        assert!(statement.sql().ends_with("FOR INSERT WITH CHECK (true);"));
    }

    #[test]
    fn stripped_implementation_emits_nothing() {
        let mut registry = PolicyRegistry::new();
        registry.declare("everyone", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Animal")?.read().create().into(),
                g.resource("Dog")?.read().create().into(),
            ])
        });
        let executor = executor(registry);
        let generator = AccessPolicyGenerator::new(&executor, &AuthzConfig::default());
        assert!(generator.statement("Dog", DbStatementKind::Insert).unwrap().is_none());
        assert!(generator.statement("Animal", DbStatementKind::Insert).unwrap().is_some());
    }

    #[test]
    fn calculated_writes_are_bypassed_once() {
        let executor = executor(PolicyRegistry::new());
        let generator = AccessPolicyGenerator::new(&executor, &AuthzConfig::default());
        let census = generator
            .statement("Census", DbStatementKind::Insert)
            .unwrap()
            .unwrap();
        assert_eq!(census.predicate, "true");
        assert_eq!(census.name, "census_insert_calculated");
        assert!(generator.statement("Tally", DbStatementKind::Insert).unwrap().is_none());
        assert!(generator.statement("Census", DbStatementKind::Select).unwrap().is_none());
    }

    #[test]
    fn calculated_condition_violates_codegen_invariant() {
        let mut registry = PolicyRegistry::new();
        registry.declare("everyone", RoleScope::All, |g| {
            Ok(vec![g.resource("Cat")?.when(Condition::calculated()).read().into()])
        });
        let executor = executor(registry);
        let generator = AccessPolicyGenerator::new(&executor, &AuthzConfig::default());
        let err = generator.statement("Cat", DbStatementKind::Select).unwrap_err();
        assert!(matches!(err, AuthzError::CodegenInvariant(_)));
        assert!(generator.all_statements().is_err());
    }
}
