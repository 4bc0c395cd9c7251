//! Condition algebra
//!
//! A [`Condition`] is a predicate over (session, object). Atomic kinds know how
//! to merge with siblings of the same kind and how to render themselves for
//! each backend; [`Condition::And`] and [`Condition::Or`] combine them.

mod field;
mod member;
mod role;
mod variant;

pub use field::{FieldCondition, FieldOperand};
pub use member::MemberCondition;
pub use role::RoleCondition;
pub use variant::VariantCondition;

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use sha2::{Digest, Sha256};

use super::resource::ObjectContext;
use super::session::{Role, Session};
use crate::errors::AuthzResult;

/// What a condition is evaluated against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub session: &'a Session,
    pub object: Option<&'a dyn ObjectContext>,
}

impl<'a> EvalContext<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            object: None,
        }
    }

    pub fn with_object(mut self, object: &'a dyn ObjectContext) -> Self {
        self.object = Some(object);
        self
    }
}

/// Variant tag of a [`Condition`], used to key optimizer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConditionKind {
    Role,
    Variant,
    Member,
    Field,
    Calculated,
    And,
    Or,
}

impl ConditionKind {
    /// Kinds whose `union` collapses an `Or` of siblings into one condition.
    pub const UNIONABLE: [ConditionKind; 3] =
        [ConditionKind::Role, ConditionKind::Variant, ConditionKind::Member];

    pub fn supports_union(&self) -> bool {
        Self::UNIONABLE.contains(self)
    }
}

/// The policy a condition is being bound to during compilation.
#[derive(Debug, Clone, Copy)]
pub struct PolicyBinding<'a> {
    pub name: &'a str,
    pub roles: Option<&'a BTreeSet<Role>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Role(RoleCondition),
    Variant(VariantCondition),
    Member(MemberCondition),
    Field(FieldCondition),
    /// The data is computed by the application; never allowed directly.
    Calculated,
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn role<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        Condition::Role(RoleCondition::new(roles))
    }

    pub fn variant<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::Variant(VariantCondition::new(variants))
    }

    pub fn member() -> Self {
        Condition::Member(MemberCondition::new())
    }

    /// The object's `field` holds the requesting user's id.
    pub fn owned_by_requester(field: impl Into<String>) -> Self {
        Condition::Field(FieldCondition::requester(field))
    }

    pub fn field_equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Condition::Field(FieldCondition::equals(field, value))
    }

    pub fn calculated() -> Self {
        Condition::Calculated
    }

    pub fn kind(&self) -> ConditionKind {
        match self {
            Condition::Role(_) => ConditionKind::Role,
            Condition::Variant(_) => ConditionKind::Variant,
            Condition::Member(_) => ConditionKind::Member,
            Condition::Field(_) => ConditionKind::Field,
            Condition::Calculated => ConditionKind::Calculated,
            Condition::And(_) => ConditionKind::And,
            Condition::Or(_) => ConditionKind::Or,
        }
    }

    pub fn is_allowed(&self, ctx: &EvalContext<'_>) -> AuthzResult<bool> {
        match self {
            Condition::Role(role) => Ok(role.is_allowed(ctx)),
            Condition::Variant(variant) => variant.is_allowed(ctx),
            Condition::Member(member) => member.is_allowed(ctx),
            Condition::Field(field) => field.is_allowed(ctx),
            Condition::Calculated => Ok(false),
            Condition::And(children) => {
                for child in children {
                    if !child.is_allowed(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(children) => {
                for child in children {
                    if child.is_allowed(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Whether evaluation needs an object instance.
    pub fn requires_object(&self) -> bool {
        match self {
            Condition::Role(_) | Condition::Calculated => false,
            Condition::Variant(_) | Condition::Member(_) | Condition::Field(_) => true,
            Condition::And(children) | Condition::Or(children) => {
                children.iter().any(Condition::requires_object)
            }
        }
    }

    /// Canonical identity. Structurally equivalent trees share an id
    /// regardless of sibling order.
    pub fn id(&self) -> String {
        match self {
            Condition::Role(role) => role.id(),
            Condition::Variant(variant) => variant.id(),
            Condition::Member(member) => member.id(),
            Condition::Field(field) => field.id(),
            Condition::Calculated => "calculated".to_string(),
            Condition::And(children) => format!("and({})", sorted_ids(children).join(",")),
            Condition::Or(children) => format!("or({})", sorted_ids(children).join(",")),
        }
    }

    /// Short stable digest of [`Condition::id`].
    pub fn fingerprint(&self) -> String {
        short_digest(&self.id())
    }

    pub fn children(&self) -> Option<&[Condition]> {
        match self {
            Condition::And(children) | Condition::Or(children) => Some(children),
            _ => None,
        }
    }

    /// Merge siblings into one condition that holds when any of them does.
    pub fn union(items: &[Condition]) -> Condition {
        if let Some(merged) = Self::union_same_kind(items.iter()) {
            return merged;
        }
        any(dedupe(items.to_vec()))
    }

    /// Merge siblings into one condition that holds when all of them do.
    pub fn intersect(items: &[Condition]) -> Condition {
        if let Some(merged) = Self::intersect_same_kind(items.iter()) {
            return merged;
        }
        all(dedupe(items.to_vec()))
    }

    /// Kind-level union, when every item shares a unionable kind.
    pub fn union_same_kind<'a>(items: impl Iterator<Item = &'a Condition> + Clone) -> Option<Condition> {
        let kind = same_kind(items.clone())?;
        match kind {
            ConditionKind::Role => Some(RoleCondition::union(items.filter_map(as_role)).into()),
            ConditionKind::Variant => {
                Some(VariantCondition::union(items.filter_map(as_variant)).into())
            }
            ConditionKind::Member => {
                Some(MemberCondition::union(items.filter_map(as_member)).into())
            }
            ConditionKind::Calculated => Some(Condition::Calculated),
            ConditionKind::Field | ConditionKind::And | ConditionKind::Or => None,
        }
    }

    pub fn intersect_same_kind<'a>(
        items: impl Iterator<Item = &'a Condition> + Clone,
    ) -> Option<Condition> {
        let kind = same_kind(items.clone())?;
        match kind {
            ConditionKind::Role => {
                Some(RoleCondition::intersect(items.filter_map(as_role)).into())
            }
            ConditionKind::Variant => {
                Some(VariantCondition::intersect(items.filter_map(as_variant)).into())
            }
            ConditionKind::Member => {
                Some(MemberCondition::intersect(items.filter_map(as_member)).into())
            }
            ConditionKind::Calculated => Some(Condition::Calculated),
            ConditionKind::Field | ConditionKind::And | ConditionKind::Or => None,
        }
    }

    /// Bind policy-specific data after compilation.
    pub fn attach_policy(&self, policy: PolicyBinding<'_>) -> Condition {
        match self {
            Condition::Member(member) => Condition::Member(member.attach(policy.roles)),
            Condition::And(children) => Condition::And(
                children.iter().map(|c| c.attach_policy(policy)).collect(),
            ),
            Condition::Or(children) => Condition::Or(
                children.iter().map(|c| c.attach_policy(policy)).collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// All of `conditions`; a single condition is returned as is.
pub fn all(conditions: Vec<Condition>) -> Condition {
    let mut conditions = conditions;
    if conditions.len() == 1 {
        return conditions.remove(0);
    }
    Condition::And(conditions)
}

/// Any of `conditions`; nested ors are flattened and a single condition is
/// returned as is.
pub fn any(conditions: Vec<Condition>) -> Condition {
    let mut flat = Vec::with_capacity(conditions.len());
    for condition in conditions {
        match condition {
            Condition::Or(children) => flat.extend(children),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return flat.remove(0);
    }
    Condition::Or(flat)
}

/// First four bytes of the sha256 of `id`, hex encoded.
pub(crate) fn short_digest(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    hex::encode(&digest[..4])
}

fn sorted_ids(children: &[Condition]) -> Vec<String> {
    let mut ids: Vec<String> = children.iter().map(Condition::id).collect();
    ids.sort();
    ids
}

fn dedupe(items: Vec<Condition>) -> Vec<Condition> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id()))
        .collect()
}

fn same_kind<'a>(mut items: impl Iterator<Item = &'a Condition>) -> Option<ConditionKind> {
    let kind = items.next()?.kind();
    items.all(|item| item.kind() == kind).then_some(kind)
}

fn as_role(condition: &Condition) -> Option<&RoleCondition> {
    match condition {
        Condition::Role(role) => Some(role),
        _ => None,
    }
}

fn as_variant(condition: &Condition) -> Option<&VariantCondition> {
    match condition {
        Condition::Variant(variant) => Some(variant),
        _ => None,
    }
}

fn as_member(condition: &Condition) -> Option<&MemberCondition> {
    match condition {
        Condition::Member(member) => Some(member),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::resource::Record;
    use uuid::Uuid;

    #[test]
    fn all_and_any_collapse_singletons() {
        let role = Condition::role(["admin"]);
        assert_eq!(all(vec![role.clone()]), role);
        assert_eq!(any(vec![role.clone()]), role);
    }

    #[test]
    fn any_flattens_nested_ors() {
        let a = Condition::role(["a"]);
        let b = Condition::variant(["draft"]);
        let c = Condition::member();
        let nested = any(vec![Condition::Or(vec![a.clone(), b.clone()]), c.clone()]);
        assert_eq!(nested, Condition::Or(vec![a, b, c]));
    }

    #[test]
    fn and_or_semantics() {
        let session = Session::new(Uuid::new_v4()).with_roles(["admin"]);
        let record = Record::new().with_variant("draft");
        let ctx = EvalContext::new(&session).with_object(&record);

        let admin_and_draft = all(vec![Condition::role(["admin"]), Condition::variant(["draft"])]);
        assert!(admin_and_draft.is_allowed(&ctx).unwrap());

        let admin_and_member = all(vec![Condition::role(["admin"]), Condition::member()]);
        assert!(!admin_and_member.is_allowed(&ctx).unwrap());

        let viewer_or_draft = any(vec![Condition::role(["viewer"]), Condition::variant(["draft"])]);
        assert!(viewer_or_draft.is_allowed(&ctx).unwrap());
    }

    #[test]
    fn id_ignores_sibling_order() {
        let a = Condition::And(vec![Condition::role(["x"]), Condition::member()]);
        let b = Condition::And(vec![Condition::member(), Condition::role(["x"])]);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
    }

    #[test]
    fn union_dispatches_on_kind() {
        let merged = Condition::union(&[Condition::role(["a"]), Condition::role(["b"])]);
        assert_eq!(merged, Condition::role(["a", "b"]));

        let mixed = Condition::union(&[Condition::role(["a"]), Condition::member()]);
        assert_eq!(mixed.kind(), ConditionKind::Or);

        let owner = Condition::owned_by_requester("owner_id");
        assert_eq!(Condition::union(&[owner.clone(), owner.clone()]), owner);
    }

    #[test]
    fn intersect_dispatches_on_kind() {
        let merged = Condition::intersect(&[Condition::role(["a", "b"]), Condition::role(["b"])]);
        assert_eq!(merged, Condition::role(["b"]));

        let mixed = Condition::intersect(&[Condition::role(["a"]), Condition::member()]);
        assert_eq!(mixed.kind(), ConditionKind::And);
    }

    #[test]
    fn attach_policy_binds_nested_members() {
        let roles: BTreeSet<Role> = [Role::new("member")].into_iter().collect();
        let tree = all(vec![Condition::variant(["draft"]), Condition::member()]);
        let bound = tree.attach_policy(PolicyBinding {
            name: "member",
            roles: Some(&roles),
        });
        assert_eq!(bound.id(), "and(member(member),variant(draft))");
    }

    #[test]
    fn requires_object_is_recursive() {
        assert!(!Condition::role(["a"]).requires_object());
        assert!(all(vec![Condition::role(["a"]), Condition::member()]).requires_object());
    }
}
