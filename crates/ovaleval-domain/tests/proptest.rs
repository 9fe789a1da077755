use proptest::prelude::*;

use ovaleval_domain::{combine, Precedence};
use ovaleval_types::{Operator, Verdict};

fn verdict() -> impl Strategy<Value = Verdict> {
    prop::sample::select(vec![
        Verdict::True,
        Verdict::False,
        Verdict::Unknown,
        Verdict::Error,
        Verdict::NotEvaluated,
        Verdict::NotApplicable,
    ])
}

fn operator() -> impl Strategy<Value = Operator> {
    prop::sample::select(vec![Operator::And, Operator::Or, Operator::One, Operator::Xor])
}

fn precedence() -> impl Strategy<Value = Precedence> {
    Just(vec![
        Verdict::Error,
        Verdict::Unknown,
        Verdict::NotEvaluated,
        Verdict::NotApplicable,
    ])
    .prop_shuffle()
    .prop_map(|order| Precedence::from_slice(&order).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Negating twice is the identity for every verdict
    #[test]
    fn double_negation(v in verdict()) {
        prop_assert_eq!(v.negate().negate(), v);
    }

    /// Combination is a pure function of its inputs
    #[test]
    fn combine_is_deterministic(
        op in operator(),
        children in prop::collection::vec(verdict(), 0..12),
        p in precedence(),
    ) {
        prop_assert_eq!(combine(op, &children, &p), combine(op, &children, &p));
    }

    /// Child order does not matter
    #[test]
    fn combine_ignores_order(
        op in operator(),
        children in prop::collection::vec(verdict(), 0..12),
    ) {
        let p = Precedence::default();
        let mut reversed = children.clone();
        reversed.reverse();
        prop_assert_eq!(combine(op, &children, &p), combine(op, &reversed, &p));
    }

    /// NOT AND(xs) == OR(NOT xs), for any mix of verdicts
    #[test]
    fn de_morgan(children in prop::collection::vec(verdict(), 0..12)) {
        let p = Precedence::default();
        let negated: Vec<_> = children.iter().map(|v| v.negate()).collect();
        prop_assert_eq!(
            combine(Operator::And, &children, &p).negate(),
            combine(Operator::Or, &negated, &p)
        );
    }

    /// Undecided children never produce an undecided result outside the inputs
    #[test]
    fn result_is_boolean_or_an_input(
        op in operator(),
        children in prop::collection::vec(verdict(), 0..12),
    ) {
        let r = combine(op, &children, &Precedence::default());
        prop_assert!(r.is_boolean() || children.contains(&r));
    }

    /// Only-boolean inputs always combine to a boolean
    #[test]
    fn booleans_stay_boolean(
        op in operator(),
        children in prop::collection::vec(any::<bool>(), 0..12),
    ) {
        let children: Vec<_> = children
            .into_iter()
            .map(|b| if b { Verdict::True } else { Verdict::False })
            .collect();
        prop_assert!(combine(op, &children, &Precedence::default()).is_boolean());
    }
}

#[test]
fn empty_operator_sentinels() {
    let p = Precedence::default();
    assert_eq!(combine(Operator::And, &[], &p), Verdict::True);
    assert_eq!(combine(Operator::Or, &[], &p), Verdict::False);
    assert_eq!(combine(Operator::One, &[], &p), Verdict::False);
    assert_eq!(combine(Operator::Xor, &[], &p), Verdict::False);
}
