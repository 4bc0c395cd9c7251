use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ResourceGrant, Stage};
use crate::authz::condition::{all, any, Condition};
use crate::authz::permission::Permission;
use crate::authz::resource::{Action, EnhancedResource};

/// Per-property grants opened by [`super::ResourceGranter::specifically`].
#[derive(Debug, Clone)]
#[must_use]
pub struct PropsGranter {
    resource: Arc<EnhancedResource>,
    selected: Vec<String>,
    stage: Stage,
    grants: BTreeMap<String, Vec<(Action, Permission)>>,
    errors: Vec<String>,
}

impl PropsGranter {
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

    pub fn prop(&self, name: &str) -> Self {
        self.props([name])
    }

    /// Selects the props following actions apply to.
    pub fn props<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.with(|next| {
            next.selected.clear();
            for name in names {
                if next.resource.props.contains(&name) {
                    next.selected.push(name);
                } else {
                    next.errors.push(format!(
                        "{} has no secured prop named `{name}`",
                        next.resource.name
                    ));
                }
            }
        })
    }

    pub fn action(&self, actions: &[Action]) -> Self {
        self.with(|next| {
            for action in actions {
                if !Action::PROP.contains(action) {
                    next.errors.push(format!(
                        "`{action}` is not a property action ({})",
                        next.resource.name
                    ));
                }
            }
            let permission = next.stage.snapshot();
            for prop in &next.selected {
                let entry = next.grants.entry(prop.clone()).or_default();
                for action in actions.iter().filter(|a| Action::PROP.contains(a)) {
                    entry.push((*action, permission.clone()));
                }
            }
        })
    }

    pub fn read(&self) -> Self {
        self.action(&[Action::Read])
    }

    pub fn edit(&self) -> Self {
        self.action(&[Action::Edit])
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

    /// Grants nothing; the selected props keep whatever the object grants.
    pub fn none(&self) -> Self {
        self.clone()
    }

    pub(crate) fn merge_into(self, grant: &mut ResourceGrant) {
        for (prop, entries) in self.grants {
            grant.props.entry(prop).or_default().extend(entries);
        }
        grant.errors.extend(self.errors);
        grant.dangling.extend(self.stage.finish());
    }
}
