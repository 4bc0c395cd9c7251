use serde_json::Value;

use super::EvalContext;
use crate::authz::codegen::access_policy::AccessPolicyContext;
use crate::authz::codegen::cypher::CypherContext;
use crate::authz::codegen::sql::SqlContext;
use crate::authz::codegen::{quote_ident, quote_literal, SQL_FALSE};
use crate::errors::{AuthzError, AuthzResult};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperand {
    /// The requesting user's id.
    Requester,
    Value(Value),
}

/// Holds when `field` on the object equals the operand.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub operand: FieldOperand,
}

impl FieldCondition {
    pub fn requester(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operand: FieldOperand::Requester,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operand: FieldOperand::Value(value.into()),
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> AuthzResult<bool> {
        let object = ctx
            .object
            .ok_or_else(|| AuthzError::missing_context(self.id()))?;
        let Some(actual) = object.field(&self.field) else {
            return Ok(false);
        };
        Ok(match &self.operand {
            FieldOperand::Requester => match (ctx.session.user_id, actual.as_str()) {
                (Some(user_id), Some(actual)) => actual == user_id.to_string(),
                _ => false,
            },
            FieldOperand::Value(expected) => actual == expected,
        })
    }

    pub fn id(&self) -> String {
        match &self.operand {
            FieldOperand::Requester => format!("field({}=@requester)", self.field),
            FieldOperand::Value(value) => format!("field({}={value})", self.field),
        }
    }

    pub fn to_cypher(&self, ctx: &mut CypherContext<'_>) -> String {
        let rhs = match &self.operand {
            FieldOperand::Requester => match ctx.requester_param() {
                Some(param) => param,
                None => return "false".to_string(),
            },
            FieldOperand::Value(value) => ctx.param(&self.field, value.clone()),
        };
        format!("{}.{} = {rhs}", ctx.node, self.field)
    }

    pub fn push_sql(&self, ctx: &mut SqlContext<'_, '_>) {
        let column = format!("{}.{}", quote_ident(ctx.alias), quote_ident(&self.field));
        match &self.operand {
            FieldOperand::Requester => match ctx.session.user_id {
                Some(user_id) => {
                    ctx.builder.push(column).push(" = ");
                    ctx.builder.push_bind(user_id.to_string());
                }
                None => {
                    ctx.builder.push(SQL_FALSE);
                }
            },
            FieldOperand::Value(Value::Null) => {
                ctx.builder.push(column).push(" IS NULL");
            }
            FieldOperand::Value(value) => {
                ctx.builder.push(column).push(" = ");
                match value {
                    Value::Bool(b) => ctx.builder.push_bind(*b),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => ctx.builder.push_bind(i),
                        None => ctx.builder.push_bind(n.as_f64().unwrap_or_default()),
                    },
                    Value::String(s) => ctx.builder.push_bind(s.clone()),
                    other => ctx.builder.push_bind(other.to_string()),
                };
            }
        }
    }

    pub fn to_access_policy(&self, _ctx: &AccessPolicyContext<'_>) -> String {
        let column = quote_ident(&self.field);
        match &self.operand {
            FieldOperand::Requester => {
                format!("{column} = current_setting('app.user_id', true)::uuid")
            }
            FieldOperand::Value(Value::Null) => format!("{column} IS NULL"),
            FieldOperand::Value(Value::String(s)) => format!("{column} = {}", quote_literal(s)),
            FieldOperand::Value(Value::Bool(b)) => format!("{column} = {b}"),
            FieldOperand::Value(Value::Number(n)) => format!("{column} = {n}"),
            FieldOperand::Value(other) => {
                format!("{column} = {}::jsonb", quote_literal(&other.to_string()))
            }
        }
    }
}

impl From<FieldCondition> for super::Condition {
    fn from(value: FieldCondition) -> Self {
        super::Condition::Field(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::resource::Record;
    use crate::authz::session::Session;
    use uuid::Uuid;

    #[test]
    fn requester_matches_owner_field() {
        let user_id = Uuid::new_v4();
        let session = Session::new(user_id);
        let owned = Record::new().with_field("owner_id", user_id.to_string());
        let foreign = Record::new().with_field("owner_id", Uuid::new_v4().to_string());
        let condition = FieldCondition::requester("owner_id");

        assert!(condition
            .is_allowed(&EvalContext::new(&session).with_object(&owned))
            .unwrap());
        assert!(!condition
            .is_allowed(&EvalContext::new(&session).with_object(&foreign))
            .unwrap());
        let anonymous = Session::anonymous();
        assert!(!condition
            .is_allowed(&EvalContext::new(&anonymous).with_object(&owned))
            .unwrap());
    }

    #[test]
    fn requester_comparison_is_exact_like_the_queries() {
        let user_id = Uuid::new_v4();
        let session = Session::new(user_id);
        let shouted = Record::new().with_field("owner_id", user_id.to_string().to_uppercase());
        let condition = FieldCondition::requester("owner_id");
        assert!(!condition
            .is_allowed(&EvalContext::new(&session).with_object(&shouted))
            .unwrap());
    }

    #[test]
    fn literal_equality() {
        let session = Session::anonymous();
        let record = Record::new().with_field("status", "done");
        let ctx = EvalContext::new(&session).with_object(&record);
        assert!(FieldCondition::equals("status", "done").is_allowed(&ctx).unwrap());
        assert!(!FieldCondition::equals("status", "open").is_allowed(&ctx).unwrap());
        assert!(!FieldCondition::equals("missing", "x").is_allowed(&ctx).unwrap());
    }

    #[test]
    fn access_policy_rendering() {
        let db = crate::authz::resource::EnhancedResource::new("Task").db;
        let ctx = AccessPolicyContext { db: &db };
        assert_eq!(
            FieldCondition::requester("owner_id").to_access_policy(&ctx),
            "\"owner_id\" = current_setting('app.user_id', true)::uuid"
        );
        assert_eq!(
            FieldCondition::equals("status", "it's").to_access_policy(&ctx),
            "\"status\" = 'it''s'"
        );
    }
}
