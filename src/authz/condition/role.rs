use std::collections::BTreeSet;

use super::EvalContext;
use crate::authz::codegen::access_policy::AccessPolicyContext;
use crate::authz::codegen::cypher::CypherContext;
use crate::authz::codegen::sql::SqlContext;
use crate::authz::codegen::{quote_literal, SQL_FALSE, SQL_TRUE};
use crate::authz::session::Role;

/// Holds when the session has any of `roles`, in any scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCondition {
    pub roles: BTreeSet<Role>,
}

impl RoleCondition {
    pub fn new<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> bool {
        ctx.session.has_any_role(&self.roles)
    }

    pub fn union<'a>(items: impl IntoIterator<Item = &'a RoleCondition>) -> Self {
        Self {
            roles: items
                .into_iter()
                .flat_map(|item| item.roles.iter().cloned())
                .collect(),
        }
    }

    pub fn intersect<'a>(items: impl IntoIterator<Item = &'a RoleCondition>) -> Self {
        let mut items = items.into_iter();
        let mut roles = items.next().map(|first| first.roles.clone()).unwrap_or_default();
        for item in items {
            roles.retain(|role| item.roles.contains(role));
        }
        Self { roles }
    }

    pub fn id(&self) -> String {
        let names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        format!("role({})", names.join(","))
    }

    /// The session is known when rendering filters, so roles fold to a constant.
    pub fn to_cypher(&self, ctx: &mut CypherContext<'_>) -> String {
        if ctx.session.has_any_role(&self.roles) {
            "true".to_string()
        } else {
            "false".to_string()
        }
    }

    pub fn push_sql(&self, ctx: &mut SqlContext<'_, '_>) {
        let constant = if ctx.session.has_any_role(&self.roles) {
            SQL_TRUE
        } else {
            SQL_FALSE
        };
        ctx.builder.push(constant);
    }

    pub fn to_access_policy(&self, _ctx: &AccessPolicyContext<'_>) -> String {
        let roles: Vec<String> = self.roles.iter().map(|r| quote_literal(r.as_str())).collect();
        format!(
            "(string_to_array(current_setting('app.roles', true), ',') && ARRAY[{}]::text[])",
            roles.join(", ")
        )
    }
}

impl From<RoleCondition> for super::Condition {
    fn from(value: RoleCondition) -> Self {
        super::Condition::Role(value)
    }
}
