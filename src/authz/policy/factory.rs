use std::collections::{BTreeMap, BTreeSet};

use super::{CompiledPolicies, Policy, PolicyDeclaration, PolicyRegistry, Power, ResourceGrants};
use crate::authz::condition::PolicyBinding;
use crate::authz::granter::{Granters, ResourceGrant};
use crate::authz::permission::Permission;
use crate::authz::resource::{Action, EnhancedResource, ResourceMap};
use crate::authz::session::Role;
use crate::errors::{AuthzError, AuthzResult};

type GrantMap = BTreeMap<String, ResourceGrants>;
type Pending = BTreeMap<Action, Vec<Permission>>;

#[derive(Default)]
struct PendingGrants {
    object: Pending,
    props: BTreeMap<String, Pending>,
    relations: BTreeMap<String, Pending>,
}

impl PendingGrants {
    fn collect(&mut self, grant: ResourceGrant) {
        push_all(&mut self.object, grant.object);
        for (prop, entries) in grant.props {
            push_all(self.props.entry(prop).or_default(), entries);
        }
        for (relation, entries) in grant.relations {
            push_all(self.relations.entry(relation).or_default(), entries);
        }
    }

    fn merge(self) -> ResourceGrants {
        ResourceGrants {
            object_level: merge_actions(self.object),
            prop_level: self
                .props
                .into_iter()
                .map(|(prop, pending)| (prop, merge_actions(pending)))
                .collect(),
            child_relations: self
                .relations
                .into_iter()
                .map(|(relation, pending)| (relation, merge_actions(pending)))
                .collect(),
        }
    }
}

fn push_all(pending: &mut Pending, entries: Vec<(Action, Permission)>) {
    for (action, permission) in entries {
        pending.entry(action).or_default().push(permission);
    }
}

fn merge_actions(pending: Pending) -> BTreeMap<Action, Permission> {
    pending
        .into_iter()
        .map(|(action, grants)| (action, Permission::merge_within_policy(grants)))
        .collect()
}

/// Compiles registered declarations against a resource catalogue.
///
/// Each declaration is merged once into a raw grant map, from which two
/// separate passes derive the live variant (resolution) and the DB variant
/// (access-policy generation).
pub struct PolicyFactory<'a> {
    resources: &'a ResourceMap,
}

impl<'a> PolicyFactory<'a> {
    pub fn new(resources: &'a ResourceMap) -> Self {
        Self { resources }
    }

    pub fn compile(&self, registry: &PolicyRegistry) -> AuthzResult<CompiledPolicies> {
        let granters = Granters::new(self.resources);
        let mut names = BTreeSet::new();
        let mut compiled = CompiledPolicies::default();

        for declaration in registry.declarations() {
            if !names.insert(declaration.name.as_str()) {
                return Err(AuthzError::configuration(format!(
                    "policy `{}` is declared more than once",
                    declaration.name
                )));
            }

            let raw = self.raw_grants(declaration, &granters)?;
            let roles = declaration.scope.clone().into_roles();
            let powers = self.powers(&raw);

            tracing::debug!(
                policy = %declaration.name,
                resources = raw.len(),
                powers = powers.len(),
                "compiled policy"
            );

            compiled.live.push(Policy {
                name: declaration.name.clone(),
                roles: roles.clone(),
                grants: self.live_grants(&declaration.name, roles.as_ref(), &raw),
                powers: powers.clone(),
            });
            compiled.db.push(Policy {
                name: declaration.name.clone(),
                roles,
                grants: self.db_grants(&raw),
                powers,
            });
        }

        tracing::info!(
            policies = compiled.live.len(),
            resources = self.resources.len(),
            "authorization policies compiled"
        );
        Ok(compiled)
    }

    /// Invokes the declaration and merges its grants per resource.
    pub fn raw_grants(
        &self,
        declaration: &PolicyDeclaration,
        granters: &Granters<'_>,
    ) -> AuthzResult<GrantMap> {
        let mut pending: BTreeMap<String, PendingGrants> = BTreeMap::new();

        for grant in declaration.grants(granters)? {
            if !grant.errors.is_empty() {
                return Err(AuthzError::configuration(format!(
                    "policy `{}` on {}: {}",
                    declaration.name,
                    grant.resource,
                    grant.errors.join("; ")
                )));
            }
            if !grant.dangling.is_empty() {
                let message = format!(
                    "policy `{}` on {} stages conditions that no action uses: {}",
                    declaration.name,
                    grant.resource,
                    grant.dangling.join(", ")
                );
                if cfg!(debug_assertions) {
                    return Err(AuthzError::configuration(message));
                }
                tracing::warn!(
                    policy = %declaration.name,
                    resource = %grant.resource,
                    dangling = ?grant.dangling,
                    "dropping dangling conditions"
                );
            }
            pending.entry(grant.resource.clone()).or_default().collect(grant);
        }

        Ok(pending
            .into_iter()
            .map(|(resource, grants)| (resource, grants.merge()))
            .collect())
    }

    pub fn live_grants(&self, policy: &str, roles: Option<&BTreeSet<Role>>, raw: &GrantMap) -> GrantMap {
        let mut grants = raw.clone();
        self.default_interfaces(raw, &mut grants);
        self.default_implementations(&mut grants);
        self.default_child_relations(&mut grants);

        let binding = PolicyBinding { name: policy, roles };
        for resource in grants.values_mut() {
            for permission in resource.permissions_mut() {
                if let Permission::When(condition) = permission {
                    *condition = condition.attach_policy(binding);
                }
            }
        }
        grants
    }

    pub fn db_grants(&self, raw: &GrantMap) -> GrantMap {
        let mut grants = raw.clone();
        self.default_implementations(&mut grants);
        self.strip_implementations(&mut grants);

        for resource in self.resources.iter().filter(|r| r.calculated) {
            if let Some(resource_grants) = grants.get_mut(&resource.name) {
                retain_read(resource_grants);
            }
        }
        grants
    }

    /// Resources granted an unconditional `create`, plus their implementations
    /// the policy leaves undeclared.
    pub fn powers(&self, raw: &GrantMap) -> BTreeSet<Power> {
        let mut powers = BTreeSet::new();
        for (name, grants) in raw {
            if !grants.object_level.get(&Action::Create).is_some_and(Permission::is_allow) {
                continue;
            }
            powers.insert(Power::create(name.clone()));

            let mut pending: Vec<String> = self
                .resources
                .get(name)
                .map(|r| r.implementations.iter().cloned().collect())
                .unwrap_or_default();
            while let Some(implementation) = pending.pop() {
                if raw.contains_key(&implementation) {
                    continue;
                }
                if let Ok(resource) = self.resources.get(&implementation) {
                    pending.extend(resource.implementations.iter().cloned());
                }
                powers.insert(Power::create(implementation));
            }
        }
        powers
    }

    /// An undeclared interface gets the intersection of its implementations,
    /// but only when the policy declares every one of them.
    fn default_interfaces(&self, raw: &GrantMap, grants: &mut GrantMap) {
        for interface in self.resources.iter().filter(|r| r.is_interface()) {
            if raw.contains_key(&interface.name) {
                continue;
            }
            let implementations: Option<Vec<&ResourceGrants>> = interface
                .implementations
                .iter()
                .map(|name| raw.get(name))
                .collect();
            let Some(implementations) = implementations else {
                continue;
            };
            grants.insert(
                interface.name.clone(),
                intersect_grants(interface, &implementations),
            );
        }
    }

    /// An undeclared resource gets the grants of its nearest declared
    /// interface.
    fn default_implementations(&self, grants: &mut GrantMap) {
        let declared = grants.clone();
        for resource in self.resources.iter() {
            if declared.contains_key(&resource.name) {
                continue;
            }
            let nearest = resource
                .interfaces
                .iter()
                .find_map(|interface| declared.get(interface));
            if let Some(interface_grants) = nearest {
                grants.insert(resource.name.clone(), inherit_grants(resource, interface_grants));
            }
        }
    }

    /// Undeclared child relations take the target's object-level grants that
    /// are valid for the relation's cardinality.
    fn default_child_relations(&self, grants: &mut GrantMap) {
        let targets = grants.clone();
        for (name, resource_grants) in grants.iter_mut() {
            let Ok(resource) = self.resources.get(name) else {
                continue;
            };
            for (relation_name, relation) in &resource.relations {
                if resource_grants.child_relations.contains_key(relation_name) {
                    continue;
                }
                let Some(target) = targets.get(&relation.target) else {
                    continue;
                };
                let defaulted = target
                    .object_level
                    .iter()
                    .filter(|(action, _)| relation.kind.allows(**action))
                    .map(|(action, permission)| (*action, permission.clone()))
                    .collect();
                resource_grants
                    .child_relations
                    .insert(relation_name.clone(), defaulted);
            }
        }
    }

    /// Drops an implementation whose read, create and delete grants match its
    /// nearest declared interface's.
    fn strip_implementations(&self, grants: &mut GrantMap) {
        let declared = grants.clone();
        for resource in self.resources.iter() {
            let Some(own) = declared.get(&resource.name) else {
                continue;
            };
            let nearest = resource
                .interfaces
                .iter()
                .find_map(|interface| declared.get(interface));
            let Some(interface_grants) = nearest else {
                continue;
            };
            let identical = [Action::Read, Action::Create, Action::Delete]
                .iter()
                .all(|action| same_grant(own, interface_grants, *action));
            if identical {
                tracing::debug!(resource = %resource.name, "implementation grants match interface; stripped");
                grants.remove(&resource.name);
            }
        }
    }
}

fn same_grant(a: &ResourceGrants, b: &ResourceGrants, action: Action) -> bool {
    let id = |grants: &ResourceGrants| grants.object_level.get(&action).map(Permission::id);
    id(a) == id(b)
}

fn intersect_grants(interface: &EnhancedResource, implementations: &[&ResourceGrants]) -> ResourceGrants {
    let mut grants = ResourceGrants::default();

    for action in Action::OBJECT {
        let each: Vec<Permission> = implementations
            .iter()
            .map(|g| g.object_level.get(&action).cloned().unwrap_or_default())
            .collect();
        let merged = Permission::intersect(&each);
        if !merged.is_deny() {
            grants.object_level.insert(action, merged);
        }
    }

    for prop in &interface.props {
        if !implementations.iter().any(|g| g.prop_level.contains_key(prop)) {
            continue;
        }
        let entry = intersect_entry(interface, implementations, prop, &Action::PROP);
        grants.prop_level.insert(prop.clone(), entry);
    }

    for (name, relation) in &interface.relations {
        if !implementations.iter().any(|g| g.child_relations.contains_key(name)) {
            continue;
        }
        let entry = intersect_entry(interface, implementations, name, relation.kind.actions());
        grants.child_relations.insert(name.clone(), entry);
    }

    grants
}

fn intersect_entry(
    interface: &EnhancedResource,
    implementations: &[&ResourceGrants],
    key: &str,
    actions: &[Action],
) -> BTreeMap<Action, Permission> {
    actions
        .iter()
        .filter_map(|action| {
            let each: Vec<Permission> = implementations
                .iter()
                .map(|g| g.lookup(interface, *action, Some(key)))
                .collect();
            let merged = Permission::intersect(&each);
            (!merged.is_deny()).then_some((*action, merged))
        })
        .collect()
}

fn inherit_grants(resource: &EnhancedResource, interface: &ResourceGrants) -> ResourceGrants {
    let mut grants = interface.clone();
    grants.prop_level.retain(|prop, _| resource.props.contains(prop));
    grants
        .child_relations
        .retain(|relation, _| resource.relations.contains_key(relation));
    grants
}

fn retain_read(grants: &mut ResourceGrants) {
    grants.object_level.retain(|action, _| *action == Action::Read);
    for entry in grants
        .prop_level
        .values_mut()
        .chain(grants.child_relations.values_mut())
    {
        entry.retain(|action, _| *action == Action::Read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::Condition;
    use crate::authz::policy::RoleScope;

    fn catalogue() -> ResourceMap {
        ResourceMap::build([
            EnhancedResource::new("Animal").props(["name"]),
            EnhancedResource::new("Dog").props(["name", "breed"]).implements(["Animal"]),
            EnhancedResource::new("Cat").props(["name"]).implements(["Animal"]),
            EnhancedResource::new("Owner")
                .list_relation("pets", "Animal")
                .single_relation("favourite", "Dog"),
            EnhancedResource::new("Stats").calculated(),
        ])
        .unwrap()
    }

    fn owner() -> Condition {
        Condition::owned_by_requester("owner_id")
    }

    fn compile(registry: &PolicyRegistry) -> AuthzResult<CompiledPolicies> {
        let map = catalogue();
        PolicyFactory::new(&map).compile(registry)
    }

    #[test]
    fn raw_merge_follows_within_policy_rules() {
        let mut registry = PolicyRegistry::new();
        registry.declare("keeper", RoleScope::roles(["keeper"]), |g| {
            let dog = g.resource("Dog")?;
            Ok(vec![
                dog.when(owner()).read().into(),
                dog.when(Condition::member()).read().into(),
                dog.edit().into(),
                dog.when(owner()).edit().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let dog = &compiled.live[0].grants["Dog"];
        assert_eq!(dog.object_level[&Action::Read].id(), "or(field(owner_id=@requester),member(keeper))");
        assert_eq!(dog.object_level[&Action::Edit], Permission::Allow);
    }

    #[test]
    fn interface_defaults_to_intersection_of_covered_implementations() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Dog")?.when(owner()).read().into(),
                g.resource("Cat")?.read().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let animal = &compiled.live[0].grants["Animal"];
        assert_eq!(animal.object_level[&Action::Read], Permission::When(owner()));
        assert!(!animal.object_level.contains_key(&Action::Edit));
    }

    #[test]
    fn interface_is_not_inferred_from_partial_coverage() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| Ok(vec![g.resource("Cat")?.read().into()]));
        let compiled = compile(&registry).unwrap();
        assert!(!compiled.live[0].grants.contains_key("Animal"));
    }

    #[test]
    fn undeclared_implementation_inherits_nearest_interface() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Animal")?.read().create().into(),
                g.resource("Cat")?.none().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let live = &compiled.live[0].grants;
        assert_eq!(live["Dog"].object_level[&Action::Create], Permission::Allow);
        assert!(live["Cat"].object_level.is_empty());
    }

    #[test]
    fn child_relations_default_to_target_grants_by_cardinality() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Animal")?.crud().into(),
                g.resource("Owner")?.read().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let owner = &compiled.live[0].grants["Owner"];
        let pets: Vec<Action> = owner.child_relations["pets"].keys().copied().collect();
        assert_eq!(pets, vec![Action::Read, Action::Create, Action::Delete]);
        let favourite: Vec<Action> = owner.child_relations["favourite"].keys().copied().collect();
        assert_eq!(favourite, vec![Action::Read, Action::Edit]);
    }

    #[test]
    fn db_variant_strips_implementations_matching_interface() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Animal")?.read().create().into(),
                g.resource("Dog")?.read().create().when(owner()).edit().into(),
                g.resource("Cat")?.read().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let db = &compiled.db[0].grants;
        assert!(!db.contains_key("Dog"));
        assert!(db.contains_key("Cat"));
        assert!(compiled.live[0].grants.contains_key("Dog"));
    }

    #[test]
    fn db_variant_drops_writes_on_calculated_resources() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| Ok(vec![g.resource("Stats")?.crud().into()]));
        let compiled = compile(&registry).unwrap();
        let keys: Vec<Action> = compiled.db[0].grants["Stats"].object_level.keys().copied().collect();
        assert_eq!(keys, vec![Action::Read]);
    }

    #[test]
    fn unconditional_create_becomes_a_power() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![
                g.resource("Animal")?.create().into(),
                g.resource("Cat")?.when(owner()).create().into(),
                g.resource("Owner")?.when(owner()).create().into(),
            ])
        });
        let compiled = compile(&registry).unwrap();
        let powers: Vec<String> = compiled.live[0].powers.iter().map(ToString::to_string).collect();
        assert_eq!(powers, vec!["create:Animal", "create:Dog"]);
    }

    #[test]
    fn duplicate_policy_names_are_rejected() {
        let mut registry = PolicyRegistry::new();
        registry
            .declare("all", RoleScope::All, |_| Ok(Vec::new()))
            .declare("all", RoleScope::All, |_| Ok(Vec::new()));
        assert!(matches!(compile(&registry), Err(AuthzError::Configuration(_))));
    }

    #[test]
    fn granter_misuse_fails_compilation() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![g.resource("Dog")?.specifically(|p| p.prop("colour").read()).into()])
        });
        assert!(matches!(compile(&registry), Err(AuthzError::Configuration(_))));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn dangling_condition_fails_debug_compilation() {
        let mut registry = PolicyRegistry::new();
        registry.declare("all", RoleScope::All, |g| {
            Ok(vec![g.resource("Dog")?.read().when(owner()).into()])
        });
        let err = compile(&registry).unwrap_err();
        assert!(err.to_string().contains("field(owner_id=@requester)"));
    }
}
