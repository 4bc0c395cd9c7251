use super::ConditionOptimizer;
use crate::authz::condition::{all, any, Condition, ConditionKind};

/// Factors a shared remainder out of an `Or` of `And`s that differ only in
/// one condition of `kind`:
///
/// `Or(And(K(x), R), And(K(y), R)) -> And(K(x ∪ y), R)`
///
/// Remainders are compared by canonical id, so sibling order inside `R` does
/// not matter. Bare `K` siblings are treated as having an empty remainder.
#[derive(Debug, Clone, Copy)]
pub struct FactorByKind {
    kind: ConditionKind,
    name: &'static str,
}

impl FactorByKind {
    pub fn new(kind: ConditionKind) -> Self {
        let name = match kind {
            ConditionKind::Role => "factor-role",
            ConditionKind::Variant => "factor-variant",
            ConditionKind::Member => "factor-member",
            ConditionKind::Field => "factor-field",
            ConditionKind::Calculated => "factor-calculated",
            ConditionKind::And => "factor-and",
            ConditionKind::Or => "factor-or",
        };
        Self { kind, name }
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// Splits a sibling into its `kind` condition and the remainder.
    fn split<'a>(&self, child: &'a Condition) -> Option<(&'a Condition, Vec<&'a Condition>)> {
        if child.kind() == self.kind {
            return Some((child, Vec::new()));
        }
        let Condition::And(parts) = child else {
            return None;
        };
        let mut matching = parts.iter().filter(|part| part.kind() == self.kind);
        let factor = matching.next()?;
        if matching.next().is_some() {
            return None;
        }
        let rest = parts
            .iter()
            .filter(|part| !std::ptr::eq(*part, factor))
            .collect();
        Some((factor, rest))
    }
}

struct Group<'a> {
    key: String,
    first: usize,
    factors: Vec<&'a Condition>,
    rest: Vec<&'a Condition>,
}

impl ConditionOptimizer for FactorByKind {
    fn name(&self) -> &str {
        self.name
    }

    fn optimize(&self, condition: &Condition) -> Option<Condition> {
        if !self.kind.supports_union() {
            return None;
        }
        let Condition::Or(children) = condition else {
            return None;
        };

        let mut groups: Vec<Group<'_>> = Vec::new();
        let mut group_of: Vec<Option<usize>> = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            let Some((factor, rest)) = self.split(child) else {
                group_of.push(None);
                continue;
            };
            let key = remainder_key(&rest);
            match groups.iter().position(|group| group.key == key) {
                Some(existing) => {
                    groups[existing].factors.push(factor);
                    group_of.push(Some(existing));
                }
                None => {
                    groups.push(Group {
                        key,
                        first: index,
                        factors: vec![factor],
                        rest,
                    });
                    group_of.push(Some(groups.len() - 1));
                }
            }
        }
        if groups.iter().all(|group| group.factors.len() < 2) {
            return None;
        }

        let mut out = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            match group_of[index] {
                None => out.push(child.clone()),
                Some(g) if groups[g].factors.len() < 2 => out.push(child.clone()),
                Some(g) if groups[g].first == index => {
                    let group = &groups[g];
                    let merged = Condition::union_same_kind(group.factors.iter().copied())?;
                    let mut parts = vec![merged];
                    parts.extend(group.rest.iter().map(|part| (*part).clone()));
                    out.push(all(parts));
                }
                Some(_) => {}
            }
        }
        Some(any(out))
    }
}

fn remainder_key(rest: &[&Condition]) -> String {
    match rest {
        [] => String::new(),
        [single] => single.id(),
        many => all(many.iter().map(|part| (*part).clone()).collect()).id(),
    }
}
