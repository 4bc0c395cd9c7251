use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ResourceGrant, Stage};
use crate::authz::condition::{all, any, Condition};
use crate::authz::permission::Permission;
use crate::authz::resource::{Action, EnhancedResource};

/// Per-child-relation grants opened by [`super::ResourceGranter::children`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ChildrenGranter {
    resource: Arc<EnhancedResource>,
    selected: Vec<String>,
    stage: Stage,
    grants: BTreeMap<String, Vec<(Action, Permission)>>,
    errors: Vec<String>,
}

impl ChildrenGranter {
    pub(crate) fn new(resource: Arc<EnhancedResource>, inherited: Option<Condition>) -> Self {
        Self {
            resource,
            selected: Vec::new(),
            stage: Stage::inherited(inherited),
            grants: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    fn with(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    pub fn relation(&self, name: &str) -> Self {
        self.relations([name])
    }

    pub fn relations<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.with(|next| {
            next.selected.clear();
            for name in names {
                if next.resource.relation(&name).is_some() {
                    next.selected.push(name);
                } else {
                    next.errors.push(format!(
                        "{} has no child relation named `{name}`",
                        next.resource.name
                    ));
                }
            }
        })
    }

    /// Grants each action on the selected relations; actions invalid for a
    /// relation's cardinality are reported.
    pub fn action(&self, actions: &[Action]) -> Self {
        self.with(|next| {
            let permission = next.stage.snapshot();
            for name in &next.selected {
                let Some(relation) = next.resource.relation(name) else {
                    continue;
                };
                let entry = next.grants.entry(name.clone()).or_default();
                for action in actions {
                    if relation.kind.allows(*action) {
                        entry.push((*action, permission.clone()));
                    } else {
                        next.errors.push(format!(
                            "`{action}` is not valid for {}.{name}",
                            next.resource.name
                        ));
                    }
                }
            }
        })
    }

    pub fn read(&self) -> Self {
        self.action(&[Action::Read])
    }

    /// Replace a single relation.
    pub fn edit(&self) -> Self {
        self.action(&[Action::Edit])
    }

    /// Add to a list relation.
    pub fn create(&self) -> Self {
        self.action(&[Action::Create])
    }

    /// Remove from a list relation.
    pub fn delete(&self) -> Self {
        self.action(&[Action::Delete])
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

    pub fn or(&self) -> Self {
        self.with(|next| next.stage.clear())
    }

    /// Grants nothing.
    pub fn none(&self) -> Self {
        self.clone()
    }

    pub(crate) fn merge_into(self, grant: &mut ResourceGrant) {
        for (relation, entries) in self.grants {
            grant.relations.entry(relation).or_default().extend(entries);
        }
        grant.errors.extend(self.errors);
        grant.dangling.extend(self.stage.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::granter::Granters;
    use crate::authz::resource::ResourceMap;

    fn catalogue() -> ResourceMap {
        ResourceMap::build([
            EnhancedResource::new("Project")
                .list_relation("tasks", "Task")
                .single_relation("plan", "Plan"),
            EnhancedResource::new("Task"),
            EnhancedResource::new("Plan"),
        ])
        .unwrap()
    }

    #[test]
    fn grants_per_relation() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .children(|c| {
                c.relation("tasks")
                    .read()
                    .when(Condition::member())
                    .create()
                    .delete()
            })
            .into_grant();
        assert_eq!(
            grant.relations["tasks"],
            vec![
                (Action::Read, Permission::Allow),
                (Action::Create, Permission::When(Condition::member())),
                (Action::Delete, Permission::When(Condition::member())),
            ]
        );
        assert!(grant.errors.is_empty());
    }

    #[test]
    fn cardinality_limits_actions() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .children(|c| c.relation("plan").create().edit().relation("tasks").edit())
            .into_grant();
        assert_eq!(grant.relations["plan"], vec![(Action::Edit, Permission::Allow)]);
        assert_eq!(grant.errors.len(), 2);
    }

    #[test]
    fn unknown_relation_is_reported() {
        let map = catalogue();
        let grant = Granters::new(&map)
            .resource("Project")
            .unwrap()
            .children(|c| c.relation("owners").read())
            .into_grant();
        assert_eq!(grant.errors.len(), 1);
    }
}
