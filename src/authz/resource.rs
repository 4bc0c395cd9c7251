//! Reflective metadata about secured domain types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::session::Role;
use crate::errors::{AuthzError, AuthzResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Edit,
    Create,
    Delete,
}

impl Action {
    pub const OBJECT: [Action; 4] = [Action::Read, Action::Edit, Action::Create, Action::Delete];
    pub const PROP: [Action; 2] = [Action::Read, Action::Edit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Edit => "edit",
            Action::Create => "create",
            Action::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "read" => Some(Action::Read),
            "edit" => Some(Action::Edit),
            "create" => Some(Action::Create),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Single,
    List,
}

impl RelationKind {
    /// Actions that make sense on a relation of this cardinality.
    pub fn actions(&self) -> &'static [Action] {
        match self {
            RelationKind::Single => &[Action::Read, Action::Edit],
            RelationKind::List => &[Action::Read, Action::Create, Action::Delete],
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRelation {
    pub kind: RelationKind,
    pub target: String,
}

/// Storage names used when rendering query filters and access policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbMapping {
    pub table: String,
    pub id_column: String,
    pub variant_column: String,
    /// Rows of `(resource_id, user_id, role)` describing per-object membership.
    pub membership_table: String,
}

impl DbMapping {
    fn for_name(name: &str) -> Self {
        let table = snake_case(name);
        Self {
            membership_table: format!("{table}_members"),
            table,
            id_column: "id".to_string(),
            variant_column: "variant".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnhancedResource {
    pub name: String,
    pub props: BTreeSet<String>,
    pub calculated_props: BTreeSet<String>,
    pub relations: BTreeMap<String, ChildRelation>,
    pub calculated: bool,
    /// Interface ancestors, nearest first.
    pub interfaces: Vec<String>,
    /// Direct implementations, filled in by [`ResourceMap::build`].
    pub implementations: BTreeSet<String>,
    pub variants: Vec<String>,
    pub db: DbMapping,
}

impl EnhancedResource {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            db: DbMapping::for_name(&name),
            name,
            props: BTreeSet::new(),
            calculated_props: BTreeSet::new(),
            relations: BTreeMap::new(),
            calculated: false,
            interfaces: Vec::new(),
            implementations: BTreeSet::new(),
            variants: Vec::new(),
        }
    }

    pub fn props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props.extend(props.into_iter().map(Into::into));
        self
    }

    /// Secured props whose values are computed by the application.
    pub fn calculated_props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for prop in props {
            let prop = prop.into();
            self.props.insert(prop.clone());
            self.calculated_props.insert(prop);
        }
        self
    }

    pub fn single_relation(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(
            name.into(),
            ChildRelation {
                kind: RelationKind::Single,
                target: target.into(),
            },
        );
        self
    }

    pub fn list_relation(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(
            name.into(),
            ChildRelation {
                kind: RelationKind::List,
                target: target.into(),
            },
        );
        self
    }

    pub fn calculated(mut self) -> Self {
        self.calculated = true;
        self
    }

    /// Interfaces this resource implements, nearest first.
    pub fn implements<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces.extend(interfaces.into_iter().map(Into::into));
        self
    }

    pub fn variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants.extend(variants.into_iter().map(Into::into));
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.db.table = table.into();
        self
    }

    pub fn membership_table(mut self, table: impl Into<String>) -> Self {
        self.db.membership_table = table.into();
        self
    }

    pub fn is_interface(&self) -> bool {
        !self.implementations.is_empty()
    }

    pub fn relation(&self, name: &str) -> Option<&ChildRelation> {
        self.relations.get(name)
    }

    pub fn is_calculated_prop(&self, prop: &str) -> bool {
        self.calculated_props.contains(prop)
    }

    /// Every secured prop and relation name.
    pub fn secured_keys(&self) -> impl Iterator<Item = &str> {
        self.props
            .iter()
            .map(String::as_str)
            .chain(self.relations.keys().map(String::as_str))
    }
}

/// The catalogue of every secured resource, with the interface graph resolved.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    resources: BTreeMap<String, Arc<EnhancedResource>>,
}

impl ResourceMap {
    pub fn build(resources: impl IntoIterator<Item = EnhancedResource>) -> AuthzResult<Self> {
        let mut by_name: BTreeMap<String, EnhancedResource> = resources
            .into_iter()
            .map(|resource| (resource.name.clone(), resource))
            .collect();

        let mut implementations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for resource in by_name.values() {
            for interface in &resource.interfaces {
                if !by_name.contains_key(interface) {
                    return Err(AuthzError::unknown_resource(format!(
                        "{interface} (interface of {})",
                        resource.name
                    )));
                }
            }
            for (relation, child) in &resource.relations {
                if !by_name.contains_key(&child.target) {
                    return Err(AuthzError::unknown_resource(format!(
                        "{} (target of {}.{relation})",
                        child.target, resource.name
                    )));
                }
            }
        }
        for resource in by_name.values() {
            for interface in direct_interfaces(resource, &by_name) {
                implementations
                    .entry(interface.clone())
                    .or_default()
                    .insert(resource.name.clone());
            }
        }
        for (interface, impls) in implementations {
            if let Some(resource) = by_name.get_mut(&interface) {
                resource.implementations = impls;
            }
        }

        Ok(Self {
            resources: by_name
                .into_iter()
                .map(|(name, resource)| (name, Arc::new(resource)))
                .collect(),
        })
    }

    pub fn get(&self, name: &str) -> AuthzResult<&Arc<EnhancedResource>> {
        self.resources
            .get(name)
            .ok_or_else(|| AuthzError::unknown_resource(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EnhancedResource>> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The interfaces of `resource` that are not already inherited through
/// another of its interfaces.
fn direct_interfaces<'a>(
    resource: &'a EnhancedResource,
    by_name: &BTreeMap<String, EnhancedResource>,
) -> Vec<&'a String> {
    let inherited: BTreeSet<&String> = resource
        .interfaces
        .iter()
        .filter_map(|interface| by_name.get(interface))
        .flat_map(|interface| interface.interfaces.iter())
        .collect();
    resource
        .interfaces
        .iter()
        .filter(|interface| !inherited.contains(interface))
        .collect()
}

/// How a domain object exposes the facts conditions are evaluated against.
pub trait ObjectContext {
    /// Whether the requesting session is a member of this object.
    fn is_member(&self) -> bool {
        false
    }

    /// Roles the session holds through its membership, when known.
    fn membership_roles(&self) -> Option<&BTreeSet<Role>> {
        None
    }

    fn variant(&self) -> Option<&str> {
        None
    }

    fn field(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// A loosely typed record, as read from a repository before securing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default)]
    pub member: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_roles: Option<BTreeSet<Role>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn as_member(mut self) -> Self {
        self.member = true;
        self
    }

    pub fn as_member_with<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.member = true;
        self.membership_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }
}

impl ObjectContext for Record {
    fn is_member(&self) -> bool {
        self.member
    }

    fn membership_roles(&self) -> Option<&BTreeSet<Role>> {
        self.membership_roles.as_ref()
    }

    fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
