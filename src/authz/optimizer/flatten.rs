use std::collections::HashSet;

use super::ConditionOptimizer;
use crate::authz::condition::Condition;

/// `And(And(a, b), c) -> And(a, b, c)`, likewise for `Or`; single-child
/// aggregates collapse to the child.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flatten;

impl ConditionOptimizer for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn optimize(&self, condition: &Condition) -> Option<Condition> {
        let (children, is_and) = match condition {
            Condition::And(children) => (children, true),
            Condition::Or(children) => (children, false),
            _ => return None,
        };
        if children.len() == 1 {
            return Some(children[0].clone());
        }
        let nested = children.iter().any(|child| same_aggregate(child, is_and));
        if !nested {
            return None;
        }
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Condition::And(inner) if is_and => flat.extend(inner.iter().cloned()),
                Condition::Or(inner) if !is_and => flat.extend(inner.iter().cloned()),
                other => flat.push(other.clone()),
            }
        }
        Some(if is_and {
            Condition::And(flat)
        } else {
            Condition::Or(flat)
        })
    }
}

fn same_aggregate(condition: &Condition, is_and: bool) -> bool {
    matches!(
        (condition, is_and),
        (Condition::And(_), true) | (Condition::Or(_), false)
    )
}

/// Drops siblings that are structurally identical to an earlier sibling.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeSiblings;

impl ConditionOptimizer for DedupeSiblings {
    fn name(&self) -> &str {
        "dedupe-siblings"
    }

    fn optimize(&self, condition: &Condition) -> Option<Condition> {
        let children = condition.children()?;
        let mut seen = HashSet::with_capacity(children.len());
        let unique: Vec<Condition> = children
            .iter()
            .filter(|child| seen.insert(child.id()))
            .cloned()
            .collect();
        if unique.len() == children.len() {
            return None;
        }
        Some(match condition {
            Condition::And(_) => Condition::And(unique),
            _ => Condition::Or(unique),
        })
    }
}
