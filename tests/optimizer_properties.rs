use proptest::prelude::*;
use uuid::Uuid;

use s_curve_authz::authz::{Condition, EvalContext, Optimizer, Record, Session};

const ROLES: [&str; 3] = ["a", "b", "c"];

fn leaf() -> impl Strategy<Value = Condition> {
    prop_oneof![
        prop::sample::subsequence(ROLES.to_vec(), 1..=3).prop_map(Condition::role),
        Just(Condition::member()),
        prop::sample::subsequence(vec!["x", "y"], 1..=2).prop_map(Condition::variant),
        (1..3i64).prop_map(|n| Condition::field_equals("f", n)),
    ]
}

fn tree() -> impl Strategy<Value = Condition> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Condition::And),
            prop::collection::vec(inner, 0..4).prop_map(Condition::Or),
        ]
    })
}

fn sessions() -> Vec<Session> {
    let mut out = Vec::new();
    for mask in 0..(1 << ROLES.len()) {
        let roles: Vec<&str> = ROLES
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, role)| *role)
            .collect();
        out.push(Session::new(Uuid::nil()).with_roles(roles));
    }
    out
}

fn records() -> Vec<Record> {
    let mut out = Vec::new();
    let memberships = [
        Record::new(),
        Record::new().as_member(),
        Record::new().as_member_with(["a"]),
        Record::new().as_member_with(["b", "c"]),
    ];
    for membership in memberships {
        for variant in [None, Some("x"), Some("y")] {
            for field in [None, Some(1), Some(2)] {
                let mut record = membership.clone();
                if let Some(variant) = variant {
                    record = record.with_variant(variant);
                }
                if let Some(field) = field {
                    record = record.with_field("f", field);
                }
                out.push(record);
            }
        }
    }
    out
}

fn same_behaviour(left: &Condition, right: &Condition) -> Result<(), TestCaseError> {
    for session in sessions() {
        for record in records() {
            let ctx = EvalContext::new(&session).with_object(&record);
            let expected = left.is_allowed(&ctx).unwrap();
            let actual = right.is_allowed(&ctx).unwrap();
            prop_assert_eq!(
                expected,
                actual,
                "{} vs {} for {:?} / {:?}",
                left,
                right,
                session.role_names(),
                record
            );
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn optimizing_preserves_meaning(condition in tree()) {
        let optimized = Optimizer::default().optimize(condition.clone());
        same_behaviour(&condition, &optimized)?;
    }

    #[test]
    fn optimizing_is_idempotent(condition in tree()) {
        let optimizer = Optimizer::default();
        let once = optimizer.optimize(condition);
        let twice = optimizer.optimize(once.clone());
        same_behaviour(&once, &twice)?;
    }

    #[test]
    fn role_factoring_is_sound(
        left in prop::sample::subsequence(ROLES.to_vec(), 1..=3),
        right in prop::sample::subsequence(ROLES.to_vec(), 1..=3),
        shared in tree(),
    ) {
        let condition = Condition::Or(vec![
            Condition::And(vec![Condition::role(left), shared.clone()]),
            Condition::And(vec![shared, Condition::role(right)]),
        ]);
        let optimized = Optimizer::default().optimize(condition.clone());
        same_behaviour(&condition, &optimized)?;
    }

    #[test]
    fn union_with_itself_is_unchanged(condition in tree()) {
        let doubled = Condition::union(&[condition.clone(), condition.clone()]);
        same_behaviour(&condition, &doubled)?;
        let optimized = Optimizer::default().optimize(doubled);
        same_behaviour(&condition, &optimized)?;
    }
}
