use serde_json::{Map, Value};

use crate::authz::condition::Condition;
use crate::authz::session::Session;

const REQUESTER_PARAM: &str = "requestingUser";

/// A Cypher `WHERE` fragment and the parameters it references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CypherFragment {
    pub text: String,
    pub params: Map<String, Value>,
}

/// Rendering state: the node variable being filtered, the session the query
/// runs for, and the parameters collected so far.
pub struct CypherContext<'a> {
    pub node: &'a str,
    pub session: &'a Session,
    params: Map<String, Value>,
    next_param: usize,
}

impl<'a> CypherContext<'a> {
    pub fn new(node: &'a str, session: &'a Session) -> Self {
        Self {
            node,
            session,
            params: Map::new(),
            next_param: 0,
        }
    }

    /// Registers a parameter and returns its `$name` reference.
    pub fn param(&mut self, prefix: &str, value: Value) -> String {
        let name = format!("{prefix}{}", self.next_param);
        self.next_param += 1;
        self.params.insert(name.clone(), value);
        format!("${name}")
    }

    /// `$requestingUser`, or `None` for sessions without a user.
    pub fn requester_param(&mut self) -> Option<String> {
        let user_id = self.session.user_id?;
        self.params
            .entry(REQUESTER_PARAM)
            .or_insert_with(|| Value::String(user_id.to_string()));
        Some(format!("${REQUESTER_PARAM}"))
    }

    fn finish(self, text: String) -> CypherFragment {
        CypherFragment {
            text,
            params: self.params,
        }
    }
}

pub fn render(condition: &Condition, node: &str, session: &Session) -> CypherFragment {
    let mut ctx = CypherContext::new(node, session);
    let text = render_into(condition, &mut ctx);
    ctx.finish(text)
}

fn render_into(condition: &Condition, ctx: &mut CypherContext<'_>) -> String {
    match condition {
        Condition::Role(role) => role.to_cypher(ctx),
        Condition::Variant(variant) => variant.to_cypher(ctx),
        Condition::Member(member) => member.to_cypher(ctx),
        Condition::Field(field) => field.to_cypher(ctx),
        Condition::Calculated => "false".to_string(),
        Condition::And(children) => join(children, " AND ", "true", ctx),
        Condition::Or(children) => join(children, " OR ", "false", ctx),
    }
}

fn join(children: &[Condition], op: &str, empty: &str, ctx: &mut CypherContext<'_>) -> String {
    match children {
        [] => empty.to_string(),
        [single] => render_into(single, ctx),
        many => {
            let parts: Vec<String> = many.iter().map(|child| render_into(child, ctx)).collect();
            format!("({})", parts.join(op))
        }
    }
}

/// Renders resolved conditions against one node variable.
#[derive(Debug, Clone)]
pub struct CypherRenderer {
    node: String,
}

impl CypherRenderer {
    pub fn new(node: impl Into<String>) -> Self {
        Self { node: node.into() }
    }

    pub fn render(&self, condition: &Condition, session: &Session) -> CypherFragment {
        render(condition, &self.node, session)
    }
}
