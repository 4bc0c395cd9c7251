use std::collections::BTreeSet;

use serde_json::Value;

use super::EvalContext;
use crate::authz::codegen::access_policy::AccessPolicyContext;
use crate::authz::codegen::cypher::CypherContext;
use crate::authz::codegen::sql::SqlContext;
use crate::authz::codegen::{quote_ident, quote_literal, SQL_FALSE};
use crate::errors::{AuthzError, AuthzResult};

/// Holds when the object is currently in one of `variants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCondition {
    pub variants: BTreeSet<String>,
}

impl VariantCondition {
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> AuthzResult<bool> {
        let object = ctx
            .object
            .ok_or_else(|| AuthzError::missing_context(self.id()))?;
        Ok(object
            .variant()
            .map(|variant| self.variants.contains(variant))
            .unwrap_or(false))
    }

    pub fn union<'a>(items: impl IntoIterator<Item = &'a VariantCondition>) -> Self {
        Self {
            variants: items
                .into_iter()
                .flat_map(|item| item.variants.iter().cloned())
                .collect(),
        }
    }

    pub fn intersect<'a>(items: impl IntoIterator<Item = &'a VariantCondition>) -> Self {
        let mut items = items.into_iter();
        let mut variants = items
            .next()
            .map(|first| first.variants.clone())
            .unwrap_or_default();
        for item in items {
            variants.retain(|variant| item.variants.contains(variant));
        }
        Self { variants }
    }

    pub fn id(&self) -> String {
        let names: Vec<&str> = self.variants.iter().map(String::as_str).collect();
        format!("variant({})", names.join(","))
    }

    pub fn to_cypher(&self, ctx: &mut CypherContext<'_>) -> String {
        let values = self.variants.iter().cloned().map(Value::String).collect();
        let param = ctx.param("variants", Value::Array(values));
        format!("{}.variant IN {param}", ctx.node)
    }

    pub fn push_sql(&self, ctx: &mut SqlContext<'_, '_>) {
        if self.variants.is_empty() {
            ctx.builder.push(SQL_FALSE);
            return;
        }
        let column = format!("{}.{}", quote_ident(ctx.alias), quote_ident(&ctx.db.variant_column));
        ctx.builder.push(column).push(" IN (");
        let mut separated = ctx.builder.separated(", ");
        for variant in &self.variants {
            separated.push_bind(variant.clone());
        }
        ctx.builder.push(")");
    }

    pub fn to_access_policy(&self, ctx: &AccessPolicyContext<'_>) -> String {
        if self.variants.is_empty() {
            return "false".to_string();
        }
        let values: Vec<String> = self.variants.iter().map(|v| quote_literal(v)).collect();
        format!(
            "{} IN ({})",
            quote_ident(&ctx.db.variant_column),
            values.join(", ")
        )
    }
}

impl From<VariantCondition> for super::Condition {
    fn from(value: VariantCondition) -> Self {
        super::Condition::Variant(value)
    }
}
