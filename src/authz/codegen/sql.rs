use sqlx::{QueryBuilder, Sqlite};

use super::{SQL_FALSE, SQL_TRUE};
use crate::authz::condition::Condition;
use crate::authz::resource::DbMapping;
use crate::authz::session::Session;

/// Rendering state for pushing a condition into a query under construction.
pub struct SqlContext<'a, 'q> {
    pub builder: &'a mut QueryBuilder<'q, Sqlite>,
    /// Table alias of the rows being filtered.
    pub alias: &'a str,
    pub db: &'a DbMapping,
    pub session: &'a Session,
}

pub fn push_condition(condition: &Condition, ctx: &mut SqlContext<'_, '_>) {
    match condition {
        Condition::Role(role) => role.push_sql(ctx),
        Condition::Variant(variant) => variant.push_sql(ctx),
        Condition::Member(member) => member.push_sql(ctx),
        Condition::Field(field) => field.push_sql(ctx),
        Condition::Calculated => {
            ctx.builder.push(SQL_FALSE);
        }
        Condition::And(children) => push_joined(children, " AND ", SQL_TRUE, ctx),
        Condition::Or(children) => push_joined(children, " OR ", SQL_FALSE, ctx),
    }
}

fn push_joined(children: &[Condition], op: &str, empty: &str, ctx: &mut SqlContext<'_, '_>) {
    if children.is_empty() {
        ctx.builder.push(empty);
        return;
    }
    ctx.builder.push("(");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            ctx.builder.push(op);
        }
        push_condition(child, ctx);
    }
    ctx.builder.push(")");
}

/// A session-bound SQL filter, ready to be appended to a `WHERE` clause.
#[derive(Debug, Clone)]
pub struct SqlFilter {
    condition: Condition,
    alias: String,
    db: DbMapping,
    session: Session,
}

impl SqlFilter {
    pub fn new(condition: Condition, alias: impl Into<String>, db: DbMapping, session: Session) -> Self {
        Self {
            condition,
            alias: alias.into(),
            db,
            session,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Appends the filter, binding every session value as a parameter.
    pub fn push_to(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        let mut ctx = SqlContext {
            builder,
            alias: &self.alias,
            db: &self.db,
            session: &self.session,
        };
        push_condition(&self.condition, &mut ctx);
    }

    /// The fragment text with `?` placeholders, for logging and tests.
    pub fn sql(&self) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        self.push_to(&mut builder);
        builder.sql().to_string()
    }
}

/// Builds [`SqlFilter`]s for one table alias.
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    alias: String,
    db: DbMapping,
}

impl SqlRenderer {
    pub fn new(alias: impl Into<String>, db: DbMapping) -> Self {
        Self {
            alias: alias.into(),
            db,
        }
    }

    pub fn render(&self, condition: &Condition, session: &Session) -> SqlFilter {
        SqlFilter::new(condition.clone(), self.alias.clone(), self.db.clone(), session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::{all, any};
    use crate::authz::resource::EnhancedResource;
    use uuid::Uuid;

    fn filter(condition: Condition, session: Session) -> SqlFilter {
        SqlFilter::new(condition, "t", EnhancedResource::new("Task").db, session)
    }

    #[test]
    fn renders_nested_aggregates() {
        let session = Session::new(Uuid::new_v4()).with_roles(["viewer"]);
        let condition = any(vec![
            Condition::role(["admin"]),
            all(vec![Condition::variant(["open"]), Condition::owned_by_requester("owner_id")]),
        ]);
        assert_eq!(
            filter(condition, session).sql(),
            "(1 = 0 OR (\"t\".\"variant\" IN (?) AND \"t\".\"owner_id\" = ?))"
        );
    }

    #[test]
    fn renders_member_subquery() {
        let session = Session::new(Uuid::new_v4());
        assert_eq!(
            filter(Condition::member(), session).sql(),
            "EXISTS (SELECT 1 FROM \"task_members\" m WHERE m.resource_id = \"t\".\"id\" AND m.user_id = ?)"
        );
    }

    #[test]
    fn calculated_and_anonymous_fall_to_false() {
        assert_eq!(filter(Condition::calculated(), Session::anonymous()).sql(), "1 = 0");
        assert_eq!(filter(Condition::member(), Session::anonymous()).sql(), "1 = 0");
    }
}
