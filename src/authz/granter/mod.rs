//! Granter DSL
//!
//! Granters are persistent builders: every call returns a new granter and
//! leaves the receiver untouched, so a partially built granter can be forked.
//!
//! ```ignore
//! let project = granters.resource("Project")?;
//! vec![
//!     project.read().into(),
//!     project
//!         .when(Condition::member())
//!         .edit()
//!         .specifically(|p| p.props(["budget"]).when(Condition::role(["admin"])).edit())
//!         .into(),
//! ]
//! ```

mod children;
mod props;
mod variant;

pub use children::ChildrenGranter;
pub use props::PropsGranter;
pub use variant::VariantGranter;

use std::collections::BTreeMap;
use std::sync::Arc;

use super::condition::{all, any, Condition};
use super::permission::Permission;
use super::resource::{Action, EnhancedResource, ResourceMap};
use crate::errors::{AuthzError, AuthzResult};

/// Grants declared through one granter, before any merging.
#[derive(Debug, Clone, Default)]
pub struct ResourceGrant {
    pub resource: String,
    pub object: Vec<(Action, Permission)>,
    pub props: BTreeMap<String, Vec<(Action, Permission)>>,
    pub relations: BTreeMap<String, Vec<(Action, Permission)>>,
    /// Ids of conditions staged with `when` but never applied to an action.
    pub dangling: Vec<String>,
    /// Misuse detected while building (unknown props, invalid actions).
    pub errors: Vec<String>,
}

/// The staged condition shared by every builder.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stage {
    condition: Option<Condition>,
    /// Whether the staged condition has been applied (or handed down).
    used: bool,
    dangling: Vec<String>,
}

impl Stage {
    pub(crate) fn inherited(condition: Option<Condition>) -> Self {
        Self {
            condition,
            used: true,
            dangling: Vec::new(),
        }
    }

    pub(crate) fn stage(&mut self, condition: Condition) {
        self.retire();
        self.condition = Some(condition);
        self.used = false;
    }

    /// Swaps the staged condition without retiring the old one; the
    /// replacement is expected to absorb it.
    pub(crate) fn replace(&mut self, condition: Option<Condition>) {
        self.used = condition.is_none();
        self.condition = condition;
    }

    pub(crate) fn clear(&mut self) {
        self.retire();
        self.condition = None;
        self.used = true;
    }

    pub(crate) fn snapshot(&mut self) -> Permission {
        self.used = true;
        match &self.condition {
            Some(condition) => Permission::When(condition.clone()),
            None => Permission::Allow,
        }
    }

    pub(crate) fn hand_down(&mut self) -> Option<Condition> {
        self.used = true;
        self.condition.clone()
    }

    pub(crate) fn finish(mut self) -> Vec<String> {
        self.retire();
        self.dangling
    }

    fn retire(&mut self) {
        if let (Some(condition), false) = (&self.condition, self.used) {
            self.dangling.push(condition.id());
        }
    }
}

/// Extension point for resource-specific grant vocabularies.
pub trait Granter: Sized {
    /// Whether this vocabulary applies to `resource`.
    fn supports(_resource: &EnhancedResource) -> bool {
        true
    }

    fn from_base(base: ResourceGranter) -> Self;

    fn into_grant(self) -> ResourceGrant;
}

/// The default object / property / child-relation granter.
#[derive(Debug, Clone)]
#[must_use]
pub struct ResourceGranter {
    resource: Arc<EnhancedResource>,
    stage: Stage,
    grant: ResourceGrant,
}

impl ResourceGranter {
    pub fn new(resource: Arc<EnhancedResource>) -> Self {
        let grant = ResourceGrant {
            resource: resource.name.clone(),
            ..ResourceGrant::default()
        };
        Self {
            resource,
            stage: Stage::default(),
            grant,
        }
    }

    pub fn resource(&self) -> &Arc<EnhancedResource> {
        &self.resource
    }

    fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    /// Grants each action under the currently staged condition.
    pub fn action(&self, actions: &[Action]) -> Self {
        self.with(|next| {
            let permission = next.stage.snapshot();
            for action in actions {
                next.grant.object.push((*action, permission.clone()));
            }
        })
    }

    pub fn read(&self) -> Self {
        self.action(&[Action::Read])
    }

    pub fn edit(&self) -> Self {
        self.action(&[Action::Edit])
    }

    pub fn create(&self) -> Self {
        self.action(&[Action::Create])
    }

    pub fn delete(&self) -> Self {
        self.action(&[Action::Delete])
    }

    pub fn crud(&self) -> Self {
        self.action(&Action::OBJECT)
    }

    pub fn when(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        self.with(|next| next.stage.stage(condition))
    }

    pub fn when_all(&self, conditions: Vec<Condition>) -> Self {
        self.when(all(conditions))
    }

    pub fn when_any(&self, conditions: Vec<Condition>) -> Self {
        self.when(any(conditions))
    }

    /// Replaces the staged condition (used by vocabularies that compose it).
    pub(crate) fn restage(&self, condition: Option<Condition>) -> Self {
        self.with(|next| next.stage.replace(condition))
    }

    /// Ends the current conditional group; earlier grants are kept.
    pub fn or(&self) -> Self {
        self.with(|next| next.stage.clear())
    }

    /// Grants nothing, but marks the resource as explicitly declared.
    pub fn none(&self) -> Self {
        self.clone()
    }

    /// Per-property grants, inheriting the staged condition.
    pub fn specifically(&self, f: impl FnOnce(PropsGranter) -> PropsGranter) -> Self {
        self.with(|next| {
            let inherited = next.stage.hand_down();
            let props = f(PropsGranter::new(next.resource.clone(), inherited));
            props.merge_into(&mut next.grant);
        })
    }

    /// Per-child-relation grants, inheriting the staged condition.
    pub fn children(&self, f: impl FnOnce(ChildrenGranter) -> ChildrenGranter) -> Self {
        self.with(|next| {
            let inherited = next.stage.hand_down();
            let children = f(ChildrenGranter::new(next.resource.clone(), inherited));
            children.merge_into(&mut next.grant);
        })
    }

    pub fn into_grant(self) -> ResourceGrant {
        let mut grant = self.grant;
        grant.dangling.extend(self.stage.finish());
        grant
    }
}

impl Granter for ResourceGranter {
    fn from_base(base: ResourceGranter) -> Self {
        base
    }

    fn into_grant(self) -> ResourceGrant {
        ResourceGranter::into_grant(self)
    }
}

impl From<ResourceGranter> for ResourceGrant {
    fn from(value: ResourceGranter) -> Self {
        value.into_grant()
    }
}

/// Hands out granters for the resources of one catalogue.
#[derive(Debug, Clone, Copy)]
pub struct Granters<'a> {
    resources: &'a ResourceMap,
}

impl<'a> Granters<'a> {
    pub fn new(resources: &'a ResourceMap) -> Self {
        Self { resources }
    }

    pub fn get<G: Granter>(&self, name: &str) -> AuthzResult<G> {
        let resource = self.resources.get(name)?;
        if !G::supports(resource) {
            return Err(AuthzError::configuration(format!(
                "{name} does not support the {} vocabulary",
                std::any::type_name::<G>()
            )));
        }
        Ok(G::from_base(ResourceGranter::new(resource.clone())))
    }

    pub fn resource(&self, name: &str) -> AuthzResult<ResourceGranter> {
        self.get(name)
    }

    pub fn variants(&self, name: &str) -> AuthzResult<VariantGranter> {
        self.get(name)
    }

    /// A default granter for every resource in the catalogue.
    pub fn each(&self) -> impl Iterator<Item = ResourceGranter> + 'a {
        self.resources
            .iter()
            .map(|resource| ResourceGranter::new(resource.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::resource::EnhancedResource;

    fn catalogue() -> ResourceMap {
        ResourceMap::build([
            EnhancedResource::new("Project")
                .props(["name", "budget"])
                .list_relation("tasks", "Task")
                .variants(["active", "archived"]),
            EnhancedResource::new("Task").props(["title"]),
        ])
        .unwrap()
    }

    #[test]
    fn actions_snapshot_the_staged_condition() {
        let map = catalogue();
        let granters = Granters::new(&map);
        let grant = granters
            .resource("Project")
            .unwrap()
            .read()
            .when(Condition::member())
            .edit()
            .into_grant();
        assert_eq!(
            grant.object,
            vec![
                (Action::Read, Permission::Allow),
                (Action::Edit, Permission::When(Condition::member())),
            ]
        );
        assert!(grant.dangling.is_empty());
    }

    #[test]
    fn builders_are_persistent() {
        let map = catalogue();
        let base = Granters::new(&map).resource("Project").unwrap();
        let staged = base.when(Condition::member());
        let reader = staged.read();
        let editor = staged.edit();
        assert_eq!(reader.clone().into_grant().object.len(), 1);
        assert_eq!(editor.into_grant().object[0].0, Action::Edit);
        assert!(base.into_grant().object.is_empty());
    }

    #[test]
    fn or_ends_the_conditional_group() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .when(Condition::member())
            .edit()
            .or()
            .read()
            .into_grant();
        assert_eq!(grant.object[1], (Action::Read, Permission::Allow));
    }

    #[test]
    fn when_all_and_when_any_stage_aggregates() {
        let map = catalogue();
        let project = Granters::new(&map).resource("Project").unwrap();
        let both = project
            .when_all(vec![Condition::member(), Condition::variant(["active"])])
            .read()
            .into_grant();
        assert_eq!(
            both.object[0].1.id(),
            "and(member,variant(active))"
        );
        let either = project
            .when_any(vec![Condition::member(), Condition::variant(["active"])])
            .read()
            .into_grant();
        assert_eq!(either.object[0].1.id(), "or(member,variant(active))");
    }

    #[test]
    fn dangling_condition_is_recorded() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .read()
            .when(Condition::member())
            .into_grant();
        assert_eq!(grant.dangling, vec!["member".to_string()]);

        let replaced = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .when(Condition::member())
            .when(Condition::variant(["active"]))
            .read()
            .into_grant();
        assert_eq!(replaced.dangling, vec!["member".to_string()]);
    }

    #[test]
    fn nested_builders_inherit_staged_condition() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .when(Condition::member())
            .specifically(|p| p.prop("budget").read())
            .into_grant();
        assert_eq!(
            grant.props["budget"],
            vec![(Action::Read, Permission::When(Condition::member()))]
        );
        assert!(grant.object.is_empty());
        assert!(grant.dangling.is_empty());
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let map = catalogue();
        let err = Granters::new(&map).resource("Nope").unwrap_err();
        assert!(matches!(err, AuthzError::UnknownResource(_)));
    }

    #[test]
    fn each_covers_every_resource() {
        let map = catalogue();
        let names: Vec<String> = Granters::new(&map)
            .each()
            .map(|g| g.into_grant().resource)
            .collect();
        assert_eq!(names, vec!["Project".to_string(), "Task".to_string()]);
    }
}
