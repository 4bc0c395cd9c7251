//! Fixed-point condition rewriter
//!
//! Each pass optimizes children bottom-up (rebuilding a node only when a
//! child changed), then hands the node to every registered module. Passes
//! repeat until one produces no change.

mod factor;
mod flatten;

pub use factor::FactorByKind;
pub use flatten::{DedupeSiblings, Flatten};

use super::condition::{Condition, ConditionKind};
use super::permission::Permission;

const DEFAULT_MAX_PASSES: usize = 32;

/// A semantics-preserving rewrite of a single node.
///
/// Implementations return `Some` only when the node actually changes, and
/// must be idempotent.
pub trait ConditionOptimizer: Send + Sync {
    fn name(&self) -> &str;

    fn optimize(&self, condition: &Condition) -> Option<Condition>;
}

pub struct Optimizer {
    modules: Vec<Box<dyn ConditionOptimizer>>,
    max_passes: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::standard(DEFAULT_MAX_PASSES)
    }
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("Optimizer")
            .field("modules", &names)
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

impl Optimizer {
    pub fn empty(max_passes: usize) -> Self {
        Self {
            modules: Vec::new(),
            max_passes: max_passes.max(1),
        }
    }

    /// Flattening, sibling dedupe and one factoring module per unionable kind.
    pub fn standard(max_passes: usize) -> Self {
        let mut optimizer = Self::empty(max_passes)
            .with_module(Flatten)
            .with_module(DedupeSiblings);
        for kind in ConditionKind::UNIONABLE {
            optimizer = optimizer.with_module(FactorByKind::new(kind));
        }
        optimizer
    }

    pub fn with_module(mut self, module: impl ConditionOptimizer + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn optimize(&self, condition: Condition) -> Condition {
        let mut current = condition;
        for _ in 0..self.max_passes {
            match self.pass(&current) {
                Some(next) => current = next,
                None => return current,
            }
        }
        tracing::warn!(
            max_passes = self.max_passes,
            condition = %current,
            "condition optimizer hit its pass limit"
        );
        current
    }

    pub fn optimize_permission(&self, permission: Permission) -> Permission {
        permission.map_condition(|condition| self.optimize(condition))
    }

    fn pass(&self, condition: &Condition) -> Option<Condition> {
        let rebuilt = match condition {
            Condition::And(children) => self.pass_children(children).map(Condition::And),
            Condition::Or(children) => self.pass_children(children).map(Condition::Or),
            _ => None,
        };
        let mut changed = rebuilt.is_some();
        let mut node = rebuilt.unwrap_or_else(|| condition.clone());
        for module in &self.modules {
            if let Some(next) = module.optimize(&node) {
                tracing::trace!(module = module.name(), from = %node, to = %next, "optimized");
                node = next;
                changed = true;
            }
        }
        changed.then_some(node)
    }

    fn pass_children(&self, children: &[Condition]) -> Option<Vec<Condition>> {
        let mut changed = false;
        let next = children
            .iter()
            .map(|child| match self.pass(child) {
                Some(next) => {
                    changed = true;
                    next
                }
                None => child.clone(),
            })
            .collect();
        changed.then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::condition::{all, any};

    #[test]
    fn leaves_atomic_conditions_alone() {
        let optimizer = Optimizer::default();
        let role = Condition::role(["admin"]);
        assert_eq!(optimizer.optimize(role.clone()), role);
    }

    #[test]
    fn factors_role_out_of_policy_terms() {
        let x = Condition::member();
        let tree = Condition::Or(vec![
            all(vec![Condition::role(["a"]), x.clone()]),
            all(vec![Condition::role(["b"]), x.clone()]),
        ]);
        let optimized = Optimizer::default().optimize(tree);
        assert_eq!(optimized, Condition::And(vec![Condition::role(["a", "b"]), x]));
    }

    #[test]
    fn optimizing_twice_changes_nothing() {
        let tree = any(vec![
            all(vec![Condition::role(["a"]), Condition::variant(["draft"]), Condition::member()]),
            all(vec![Condition::role(["b"]), Condition::member(), Condition::variant(["draft"])]),
            Condition::And(vec![Condition::And(vec![Condition::role(["c"])]), Condition::member()]),
        ]);
        let optimizer = Optimizer::default();
        let once = optimizer.optimize(tree);
        let twice = optimizer.optimize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_optimizer_is_identity() {
        let tree = Condition::And(vec![Condition::And(vec![Condition::member()])]);
        assert_eq!(Optimizer::empty(4).optimize(tree.clone()), tree);
    }

    #[test]
    fn optimizes_permission_conditions_only() {
        let optimizer = Optimizer::default();
        assert_eq!(optimizer.optimize_permission(Permission::Allow), Permission::Allow);
        let nested = Permission::When(Condition::Or(vec![Condition::Or(vec![
            Condition::member(),
        ])]));
        assert_eq!(
            optimizer.optimize_permission(nested),
            Permission::When(Condition::member())
        );
    }
}
