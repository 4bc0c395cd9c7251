use std::collections::BTreeSet;

use serde_json::Value;

use super::EvalContext;
use crate::authz::codegen::access_policy::AccessPolicyContext;
use crate::authz::codegen::cypher::CypherContext;
use crate::authz::codegen::sql::SqlContext;
use crate::authz::codegen::{quote_ident, quote_literal, SQL_FALSE};
use crate::authz::session::Role;
use crate::errors::{AuthzError, AuthzResult};

/// Holds when the session is a member of the object.
///
/// Unbound, any membership qualifies. Once bound to a policy, the membership
/// must carry one of that policy's roles (when the object reports them).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberCondition {
    pub roles: Option<BTreeSet<Role>>,
}

impl MemberCondition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles<'a>(roles: impl IntoIterator<Item = &'a Role>) -> Self {
        Self {
            roles: Some(roles.into_iter().cloned().collect()),
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> AuthzResult<bool> {
        let object = ctx
            .object
            .ok_or_else(|| AuthzError::missing_context(self.id()))?;
        if !object.is_member() {
            return Ok(false);
        }
        Ok(match (&self.roles, object.membership_roles()) {
            (Some(required), Some(held)) => required.iter().any(|role| held.contains(role)),
            _ => true,
        })
    }

    /// Binds to a policy's role set, unless already bound.
    pub fn attach(&self, roles: Option<&BTreeSet<Role>>) -> Self {
        match (&self.roles, roles) {
            (None, Some(roles)) => Self {
                roles: Some(roles.clone()),
            },
            _ => self.clone(),
        }
    }

    pub fn union<'a>(items: impl IntoIterator<Item = &'a MemberCondition>) -> Self {
        let mut roles = BTreeSet::new();
        for item in items {
            match &item.roles {
                Some(item_roles) => roles.extend(item_roles.iter().cloned()),
                None => return Self::new(),
            }
        }
        Self { roles: Some(roles) }
    }

    pub fn intersect<'a>(items: impl IntoIterator<Item = &'a MemberCondition>) -> Self {
        let mut roles: Option<BTreeSet<Role>> = None;
        for item in items {
            roles = match (roles, &item.roles) {
                (None, other) => other.clone(),
                (Some(current), None) => Some(current),
                (Some(current), Some(other)) => {
                    Some(current.intersection(other).cloned().collect())
                }
            };
        }
        Self { roles }
    }

    pub fn id(&self) -> String {
        match &self.roles {
            None => "member".to_string(),
            Some(roles) => {
                let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
                format!("member({})", names.join(","))
            }
        }
    }

    pub fn to_cypher(&self, ctx: &mut CypherContext<'_>) -> String {
        let Some(user) = ctx.requester_param() else {
            return "false".to_string();
        };
        let node = ctx.node.to_string();
        match &self.roles {
            None => format!(
                "EXISTS {{ MATCH ({node})<-[:membership]-(:Member)-[:user]->(:User {{ id: {user} }}) }}"
            ),
            Some(roles) => {
                let values = roles.iter().map(|r| Value::String(r.to_string())).collect();
                let param = ctx.param("memberRoles", Value::Array(values));
                format!(
                    "EXISTS {{ MATCH ({node})<-[:membership]-(m:Member)-[:user]->(:User {{ id: {user} }}) WHERE any(role IN m.roles WHERE role IN {param}) }}"
                )
            }
        }
    }

    pub fn push_sql(&self, ctx: &mut SqlContext<'_, '_>) {
        let Some(user_id) = ctx.session.user_id else {
            ctx.builder.push(SQL_FALSE);
            return;
        };
        ctx.builder.push(format!(
            "EXISTS (SELECT 1 FROM {} m WHERE m.resource_id = {}.{} AND m.user_id = ",
            quote_ident(&ctx.db.membership_table),
            quote_ident(ctx.alias),
            quote_ident(&ctx.db.id_column),
        ));
        ctx.builder.push_bind(user_id.to_string());
        if let Some(roles) = &self.roles {
            if roles.is_empty() {
                ctx.builder.push(" AND ").push(SQL_FALSE);
            } else {
                ctx.builder.push(" AND m.role IN (");
                let mut separated = ctx.builder.separated(", ");
                for role in roles {
                    separated.push_bind(role.to_string());
                }
                ctx.builder.push(")");
            }
        }
        ctx.builder.push(")");
    }

    pub fn to_access_policy(&self, ctx: &AccessPolicyContext<'_>) -> String {
        let mut sql = format!(
            "EXISTS (SELECT 1 FROM {} m WHERE m.resource_id = {}.{} AND m.user_id = current_setting('app.user_id', true)::uuid",
            quote_ident(&ctx.db.membership_table),
            quote_ident(&ctx.db.table),
            quote_ident(&ctx.db.id_column),
        );
        if let Some(roles) = &self.roles {
            let roles: Vec<String> = roles.iter().map(|r| quote_literal(r.as_str())).collect();
            sql.push_str(&format!(" AND m.role = ANY (ARRAY[{}]::text[])", roles.join(", ")));
        }
        sql.push(')');
        sql
    }
}

impl From<MemberCondition> for super::Condition {
    fn from(value: MemberCondition) -> Self {
        super::Condition::Member(value)
    }
}
