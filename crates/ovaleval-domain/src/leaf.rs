//! Leaf evaluation: one catalog test against one snapshot.
//!
//! Nothing is collected here. Items come from the snapshot as-is; this
//! module only decides existence and compares item fields with the state.

use ovaleval_types::{
    Check, CollectedFlag, EntityOperation, Existence, ItemStatus, Message, Operator, StateDef,
    StateEntity, SysItem, SystemCharacteristics, TestDef, VariableBinding, Verdict,
};
use regex::Regex;

use crate::logic::{combine, Precedence};
use crate::test::ResultItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestOutcome {
    pub result: Verdict,
    pub message: Option<Message>,
    pub items: Vec<ResultItem>,
    pub bindings: Vec<VariableBinding>,
}

impl TestOutcome {
    fn bare(result: Verdict, message: Option<Message>) -> Self {
        Self {
            result,
            message,
            items: vec![],
            bindings: vec![],
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::bare(Verdict::Error, Some(Message::error(text)))
    }
}

pub(crate) fn evaluate_test(
    test: &TestDef,
    snapshot: &SystemCharacteristics,
    precedence: &Precedence,
) -> TestOutcome {
    let Some(object) = snapshot.object(&test.object_ref) else {
        return TestOutcome::bare(
            Verdict::Unknown,
            Some(Message::warning(format!(
                "object {} was not collected on {}",
                test.object_ref, snapshot.id
            ))),
        );
    };

    let object_message = object.message.clone().map(Message::info);
    match object.flag {
        CollectedFlag::Error => {
            let text = object
                .message
                .clone()
                .unwrap_or_else(|| format!("collection of {} failed", object.id));
            return TestOutcome::error(text);
        }
        CollectedFlag::NotApplicable => {
            return TestOutcome::bare(Verdict::NotApplicable, object_message);
        }
        CollectedFlag::NotCollected => {
            return TestOutcome::bare(Verdict::Unknown, object_message);
        }
        CollectedFlag::Complete | CollectedFlag::Incomplete | CollectedFlag::DoesNotExist => {}
    }

    let mut statuses = Vec::with_capacity(object.item_refs.len());
    let mut items: Vec<(ResultItem, Option<&SysItem>)> =
        Vec::with_capacity(object.item_refs.len());
    for item_ref in &object.item_refs {
        match snapshot.item(item_ref) {
            Some(sys_item) => {
                statuses.push(sys_item.status);
                items.push((ResultItem::new(item_ref.clone()), Some(sys_item)));
            }
            None => {
                statuses.push(ItemStatus::Error);
                let mut item = ResultItem::new(item_ref.clone()).with_result(Verdict::Error);
                item.add_message(Message::error(format!(
                    "item {} is referenced by {} but missing from the snapshot",
                    item_ref, object.id
                )));
                items.push((item, None));
            }
        }
    }

    let existence = existence_result(
        test.check_existence,
        &statuses,
        object.flag == CollectedFlag::Incomplete,
    );

    let mut bindings = vec![];
    let mut item_results = vec![];
    let mut out_items = Vec::with_capacity(items.len());

    for (mut item, sys_item) in items {
        let Some(sys_item) = sys_item else {
            out_items.push(item);
            continue;
        };
        if let Some(msg) = &sys_item.message {
            item.add_message(Message::info(msg.clone()));
        }
        match sys_item.status {
            ItemStatus::Exists => {}
            ItemStatus::Error => {
                item.set_result(Verdict::Error);
                out_items.push(item);
                continue;
            }
            ItemStatus::DoesNotExist | ItemStatus::NotCollected => {
                item.set_result(Verdict::NotEvaluated);
                out_items.push(item);
                continue;
            }
        }

        if existence != Verdict::True {
            out_items.push(item);
            continue;
        }

        let verdict = match &test.state {
            None => Verdict::True,
            Some(state) => {
                let (v, messages) =
                    match_state(state, sys_item, snapshot, precedence, &mut bindings);
                for m in messages {
                    item.add_message(m);
                }
                v
            }
        };
        item.set_result(verdict);
        item_results.push(verdict);
        out_items.push(item);
    }

    let result = if existence != Verdict::True || test.state.is_none() {
        existence
    } else {
        fold_check(test.check, &item_results, precedence)
    };

    TestOutcome {
        result,
        message: object_message,
        items: out_items,
        bindings,
    }
}

fn existence_result(existence: Existence, statuses: &[ItemStatus], incomplete: bool) -> Verdict {
    let exists = statuses.iter().filter(|s| **s == ItemStatus::Exists).count();
    let errors = statuses.iter().filter(|s| **s == ItemStatus::Error).count();
    let does_not_exist = statuses
        .iter()
        .filter(|s| **s == ItemStatus::DoesNotExist)
        .count();
    let unsure = incomplete || statuses.iter().any(|s| *s == ItemStatus::NotCollected);

    match existence {
        Existence::AllExist => {
            if errors > 0 {
                Verdict::Error
            } else if exists == 0 || does_not_exist > 0 {
                Verdict::False
            } else if unsure {
                Verdict::Unknown
            } else {
                Verdict::True
            }
        }
        Existence::AnyExist => {
            if errors > 0 {
                Verdict::Error
            } else {
                Verdict::True
            }
        }
        Existence::AtLeastOneExists => {
            if exists > 0 {
                Verdict::True
            } else if errors > 0 {
                Verdict::Error
            } else if unsure {
                Verdict::Unknown
            } else {
                Verdict::False
            }
        }
        Existence::NoneExist => {
            if exists > 0 {
                Verdict::False
            } else if errors > 0 {
                Verdict::Error
            } else if unsure {
                Verdict::Unknown
            } else {
                Verdict::True
            }
        }
        Existence::OnlyOneExists => {
            if exists > 1 {
                Verdict::False
            } else if errors > 0 {
                Verdict::Error
            } else if unsure {
                Verdict::Unknown
            } else if exists == 1 {
                Verdict::True
            } else {
                Verdict::False
            }
        }
    }
}

fn fold_check(check: Check, item_results: &[Verdict], precedence: &Precedence) -> Verdict {
    match check {
        Check::All => combine(Operator::And, item_results, precedence),
        Check::AtLeastOne => combine(Operator::Or, item_results, precedence),
        Check::OnlyOne => combine(Operator::One, item_results, precedence),
        Check::NoneSatisfy => {
            let negated: Vec<Verdict> = item_results.iter().map(|v| v.negate()).collect();
            combine(Operator::And, &negated, precedence)
        }
    }
}

fn match_state(
    state: &StateDef,
    item: &SysItem,
    snapshot: &SystemCharacteristics,
    precedence: &Precedence,
    bindings: &mut Vec<VariableBinding>,
) -> (Verdict, Vec<Message>) {
    let mut messages = vec![];
    let mut results = Vec::with_capacity(state.entities.len());

    for entity in &state.entities {
        let Some(actual) = item.fields.get(&entity.name) else {
            messages.push(Message::error(format!(
                "item {} has no field {}",
                item.id, entity.name
            )));
            results.push(Verdict::Error);
            continue;
        };

        let expected = match expected_values(entity, snapshot, bindings) {
            Ok(values) => values,
            Err(msg) => {
                messages.push(Message::error(msg));
                results.push(Verdict::Error);
                continue;
            }
        };

        // Every expected value must match (var_check="all").
        let per_value: Vec<Verdict> = expected
            .iter()
            .map(|want| match compare(entity.operation, actual, want) {
                Ok(true) => Verdict::True,
                Ok(false) => Verdict::False,
                Err(msg) => {
                    messages.push(Message::error(format!("{}: {}", entity.name, msg)));
                    Verdict::Error
                }
            })
            .collect();
        results.push(combine(Operator::And, &per_value, precedence));
    }

    (combine(state.operator, &results, precedence), messages)
}

fn expected_values(
    entity: &StateEntity,
    snapshot: &SystemCharacteristics,
    bindings: &mut Vec<VariableBinding>,
) -> Result<Vec<String>, String> {
    if let Some(var_id) = &entity.var_ref {
        let var = snapshot
            .variable(var_id)
            .ok_or_else(|| format!("variable {} has no value in {}", var_id, snapshot.id))?;
        if var.values.is_empty() {
            return Err(format!("variable {} has no value in {}", var_id, snapshot.id));
        }
        for value in &var.values {
            let binding = VariableBinding::new(var_id.clone(), value.clone());
            if !bindings.contains(&binding) {
                bindings.push(binding);
            }
        }
        return Ok(var.values.clone());
    }

    entity
        .value
        .clone()
        .map(|v| vec![v])
        .ok_or_else(|| format!("state entity {} has neither value nor var_ref", entity.name))
}

fn compare(op: EntityOperation, actual: &str, expected: &str) -> Result<bool, String> {
    match op {
        EntityOperation::Equals => Ok(actual == expected),
        EntityOperation::NotEqual => Ok(actual != expected),
        EntityOperation::CaseInsensitiveEquals => {
            Ok(actual.to_lowercase() == expected.to_lowercase())
        }
        EntityOperation::PatternMatch => {
            let re = Regex::new(expected)
                .map_err(|e| format!("invalid pattern {}: {}", expected, e))?;
            Ok(re.is_match(actual))
        }
        EntityOperation::GreaterThan
        | EntityOperation::LessThan
        | EntityOperation::GreaterThanOrEqual
        | EntityOperation::LessThanOrEqual => {
            let a = parse_number(actual)?;
            let b = parse_number(expected)?;
            Ok(match op {
                EntityOperation::GreaterThan => a > b,
                EntityOperation::LessThan => a < b,
                EntityOperation::GreaterThanOrEqual => a >= b,
                _ => a <= b,
            })
        }
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("{:?} is not numeric", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovaleval_types::{CollectedObject, VariableValue};
    use std::collections::BTreeMap;

    fn item(id: &str, status: ItemStatus, fields: &[(&str, &str)]) -> SysItem {
        SysItem {
            id: id.into(),
            status,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            message: None,
        }
    }

    fn snapshot(flag: CollectedFlag, items: Vec<SysItem>) -> SystemCharacteristics {
        let mut sc = SystemCharacteristics::new("host-a");
        sc.objects.push(CollectedObject {
            id: "obj:1".into(),
            flag,
            item_refs: items.iter().map(|i| i.id.clone()).collect(),
            message: None,
        });
        sc.items = items;
        sc
    }

    fn test_def(check: Check, existence: Existence, state: Option<StateDef>) -> TestDef {
        TestDef {
            id: "tst:1".into(),
            comment: None,
            object_ref: "obj:1".into(),
            check,
            check_existence: existence,
            state,
        }
    }

    fn equals(name: &str, value: &str) -> StateDef {
        StateDef {
            operator: Operator::And,
            entities: vec![StateEntity {
                name: name.into(),
                operation: EntityOperation::Equals,
                value: Some(value.into()),
                var_ref: None,
            }],
        }
    }

    fn eval(t: &TestDef, sc: &SystemCharacteristics) -> TestOutcome {
        evaluate_test(t, sc, &Precedence::default())
    }

    #[test]
    fn missing_object_is_unknown() {
        let sc = SystemCharacteristics::new("host-a");
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::Unknown);
        assert!(out.message.is_some());
    }

    #[test]
    fn object_error_is_error() {
        let sc = snapshot(CollectedFlag::Error, vec![]);
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        assert_eq!(eval(&t, &sc).result, Verdict::Error);
    }

    #[test]
    fn not_applicable_object_passes_through() {
        let sc = snapshot(CollectedFlag::NotApplicable, vec![]);
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        assert_eq!(eval(&t, &sc).result, Verdict::NotApplicable);
    }

    #[test]
    fn existence_only_test_true_when_item_exists() {
        let sc = snapshot(CollectedFlag::Complete, vec![item("i:1", ItemStatus::Exists, &[])]);
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::True);
        assert_eq!(out.items[0].result(), Verdict::True);
    }

    #[test]
    fn none_exist_with_no_items_is_true() {
        let sc = snapshot(CollectedFlag::DoesNotExist, vec![]);
        let t = test_def(Check::All, Existence::NoneExist, None);
        assert_eq!(eval(&t, &sc).result, Verdict::True);
    }

    #[test]
    fn all_exist_with_no_items_is_false() {
        let sc = snapshot(CollectedFlag::DoesNotExist, vec![]);
        let t = test_def(Check::All, Existence::AllExist, None);
        assert_eq!(eval(&t, &sc).result, Verdict::False);
    }

    #[test]
    fn incomplete_collection_makes_none_exist_unknown() {
        let sc = snapshot(CollectedFlag::Incomplete, vec![]);
        let t = test_def(Check::All, Existence::NoneExist, None);
        assert_eq!(eval(&t, &sc).result, Verdict::Unknown);
    }

    #[test]
    fn item_error_makes_test_error() {
        let sc = snapshot(CollectedFlag::Complete, vec![item("i:1", ItemStatus::Error, &[])]);
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        assert_eq!(eval(&t, &sc).result, Verdict::Error);
    }

    #[test]
    fn check_all_fails_on_one_mismatch() {
        let sc = snapshot(
            CollectedFlag::Complete,
            vec![
                item("i:1", ItemStatus::Exists, &[("value", "7")]),
                item("i:2", ItemStatus::Exists, &[("value", "8")]),
            ],
        );
        let t = test_def(Check::All, Existence::AtLeastOneExists, Some(equals("value", "7")));
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::False);
        assert_eq!(out.items[0].result(), Verdict::True);
        assert_eq!(out.items[1].result(), Verdict::False);
    }

    #[test]
    fn check_at_least_one_passes_on_one_match() {
        let sc = snapshot(
            CollectedFlag::Complete,
            vec![
                item("i:1", ItemStatus::Exists, &[("value", "7")]),
                item("i:2", ItemStatus::Exists, &[("value", "8")]),
            ],
        );
        let t = test_def(Check::AtLeastOne, Existence::AtLeastOneExists, Some(equals("value", "7")));
        assert_eq!(eval(&t, &sc).result, Verdict::True);
    }

    #[test]
    fn check_none_satisfy() {
        let sc = snapshot(
            CollectedFlag::Complete,
            vec![item("i:1", ItemStatus::Exists, &[("value", "8")])],
        );
        let t = test_def(Check::NoneSatisfy, Existence::AtLeastOneExists, Some(equals("value", "7")));
        assert_eq!(eval(&t, &sc).result, Verdict::True);
    }

    #[test]
    fn missing_field_is_item_error() {
        let sc = snapshot(CollectedFlag::Complete, vec![item("i:1", ItemStatus::Exists, &[])]);
        let t = test_def(Check::All, Existence::AtLeastOneExists, Some(equals("value", "7")));
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::Error);
        assert!(!out.items[0].messages().is_empty());
    }

    #[test]
    fn var_ref_values_are_bound() {
        let mut sc = snapshot(
            CollectedFlag::Complete,
            vec![item("i:1", ItemStatus::Exists, &[("value", "14")])],
        );
        sc.variables.push(VariableValue {
            variable_id: "var:min".into(),
            values: vec!["12".into()],
        });
        let state = StateDef {
            operator: Operator::And,
            entities: vec![StateEntity {
                name: "value".into(),
                operation: EntityOperation::GreaterThanOrEqual,
                value: None,
                var_ref: Some("var:min".into()),
            }],
        };
        let t = test_def(Check::All, Existence::AtLeastOneExists, Some(state));
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::True);
        assert_eq!(out.bindings, vec![VariableBinding::new("var:min", "12")]);
    }

    #[test]
    fn pattern_match_and_bad_pattern() {
        assert_eq!(compare(EntityOperation::PatternMatch, "PermitRootLogin no", "^Permit"), Ok(true));
        assert!(compare(EntityOperation::PatternMatch, "x", "(").is_err());
        assert!(compare(EntityOperation::LessThan, "abc", "1").is_err());
        assert_eq!(compare(EntityOperation::CaseInsensitiveEquals, "YES", "yes"), Ok(true));
    }

    #[test]
    fn dangling_item_ref_is_error() {
        let mut sc = snapshot(CollectedFlag::Complete, vec![]);
        sc.objects[0].item_refs.push("i:ghost".into());
        let t = test_def(Check::All, Existence::AtLeastOneExists, None);
        let out = eval(&t, &sc);
        assert_eq!(out.result, Verdict::Error);
        assert_eq!(out.items[0].result(), Verdict::Error);
    }
}
