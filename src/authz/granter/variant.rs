use super::{ChildrenGranter, Granter, PropsGranter, ResourceGrant, ResourceGranter};
use crate::authz::condition::{all, Condition};
use crate::authz::resource::EnhancedResource;

/// Vocabulary for resources with variants: `variants([...])` scopes the
/// following actions to objects in one of those variants. A later
/// `variants` call replaces the set; the `when` condition is kept.
#[derive(Debug, Clone)]
#[must_use]
pub struct VariantGranter {
    base: ResourceGranter,
    when: Option<Condition>,
    variant: Option<Condition>,
    errors: Vec<String>,
}

impl VariantGranter {
    fn map(&self, f: impl FnOnce(&ResourceGranter) -> ResourceGranter) -> Self {
        Self {
            base: f(&self.base),
            ..self.clone()
        }
    }

    fn staged(&self) -> Option<Condition> {
        match (&self.when, &self.variant) {
            (Some(when), Some(variant)) => Some(all(vec![when.clone(), variant.clone()])),
            (when, variant) => when.clone().or_else(|| variant.clone()),
        }
    }

    pub fn variants<I, S>(&self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        let resource = self.base.resource();
        let mut next = self.clone();
        for variant in &variants {
            if !resource.variants.contains(variant) {
                next.errors
                    .push(format!("{} has no variant named `{variant}`", resource.name));
            }
        }
        next.variant = Some(Condition::variant(variants));
        next.base = next.base.restage(next.staged());
        next
    }

    pub fn read(&self) -> Self {
        self.map(ResourceGranter::read)
    }

    pub fn edit(&self) -> Self {
        self.map(ResourceGranter::edit)
    }

    pub fn create(&self) -> Self {
        self.map(ResourceGranter::create)
    }

    pub fn delete(&self) -> Self {
        self.map(ResourceGranter::delete)
    }

    pub fn when(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        let mut next = self.clone();
        next.when = Some(condition.clone());
        next.base = match &next.variant {
            Some(_) => next.base.restage(next.staged()),
            None => next.base.when(condition),
        };
        next
    }

    pub fn or(&self) -> Self {
        Self {
            base: self.base.or(),
            when: None,
            variant: None,
            errors: self.errors.clone(),
        }
    }

    pub fn specifically(&self, f: impl FnOnce(PropsGranter) -> PropsGranter) -> Self {
        self.map(|base| base.specifically(f))
    }

    pub fn children(&self, f: impl FnOnce(ChildrenGranter) -> ChildrenGranter) -> Self {
        self.map(|base| base.children(f))
    }
}

impl Granter for VariantGranter {
    fn supports(resource: &EnhancedResource) -> bool {
        !resource.variants.is_empty()
    }

    fn from_base(base: ResourceGranter) -> Self {
        Self {
            base,
            when: None,
            variant: None,
            errors: Vec::new(),
        }
    }

    fn into_grant(self) -> ResourceGrant {
        let mut grant = self.base.into_grant();
        grant.errors.extend(self.errors);
        grant
    }
}

impl From<VariantGranter> for ResourceGrant {
    fn from(value: VariantGranter) -> Self {
        Granter::into_grant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::granter::Granters;
    use crate::authz::permission::Permission;
    use crate::authz::resource::{Action, ResourceMap};
    use crate::errors::AuthzError;

    fn catalogue() -> ResourceMap {
        ResourceMap::build([
            EnhancedResource::new("Project").variants(["active", "archived"]),
            EnhancedResource::new("Task"),
        ])
        .unwrap()
    }

    #[test]
    fn variants_scope_following_actions() {
        let map = catalogue();
        let grant: ResourceGrant = Granters::new(&map)
            .variants("Project")
            .unwrap()
            .when(Condition::member())
            .variants(["active"])
            .edit()
            .into();
        assert_eq!(grant.object[0].0, Action::Edit);
        assert_eq!(
            grant.object[0].1,
            Permission::When(Condition::And(vec![
                Condition::member(),
                Condition::variant(["active"]),
            ]))
        );
        assert!(grant.dangling.is_empty());
    }

    #[test]
    fn later_variants_replace_earlier_ones() {
        let map = catalogue();
        let grant: ResourceGrant = Granters::new(&map)
            .variants("Project")
            .unwrap()
            .when(Condition::member())
            .variants(["active"])
            .edit()
            .variants(["archived"])
            .read()
            .into();
        assert_eq!(
            grant.object,
            vec![
                (
                    Action::Edit,
                    Permission::When(Condition::And(vec![
                        Condition::member(),
                        Condition::variant(["active"]),
                    ]))
                ),
                (
                    Action::Read,
                    Permission::When(Condition::And(vec![
                        Condition::member(),
                        Condition::variant(["archived"]),
                    ]))
                ),
            ]
        );
        assert!(grant.dangling.is_empty());
    }

    #[test]
    fn or_drops_the_variant_scope() {
        let map = catalogue();
        let grant: ResourceGrant = Granters::new(&map)
            .variants("Project")
            .unwrap()
            .variants(["active"])
            .edit()
            .or()
            .read()
            .into();
        assert_eq!(
            grant.object[0].1,
            Permission::When(Condition::variant(["active"]))
        );
        assert_eq!(grant.object[1], (Action::Read, Permission::Allow));
    }

    #[test]
    fn unknown_variant_is_reported() {
        let map = catalogue();
        let grant: ResourceGrant = Granters::new(&map)
            .variants("Project")
            .unwrap()
            .variants(["deleted"])
            .read()
            .into();
        assert_eq!(grant.errors.len(), 1);
    }

    #[test]
    fn resources_without_variants_are_unsupported() {
        let map = catalogue();
        let err = Granters::new(&map).variants("Task").unwrap_err();
        assert!(matches!(err, AuthzError::Configuration(_)));
    }
}
