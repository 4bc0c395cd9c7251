//! Rendering resolved conditions for the query layer and the database.
//!
//! - [`cypher`]: graph query filter fragments with named parameters
//! - [`sql`]: SQL filter fragments pushed into a `sqlx::QueryBuilder`
//! - [`access_policy`]: row-level security statements for schema tooling

pub mod access_policy;
pub mod cypher;
pub mod sql;

pub use access_policy::{
    AccessPolicyContext, AccessPolicyGenerator, AccessPolicyStatement, DbStatementKind,
};
pub use cypher::{CypherContext, CypherFragment, CypherRenderer};
pub use sql::{SqlContext, SqlFilter, SqlRenderer};

pub const SQL_TRUE: &str = "1 = 1";
pub const SQL_FALSE: &str = "1 = 0";

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
