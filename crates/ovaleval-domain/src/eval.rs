//! Criteria evaluation.
//!
//! The evaluator only reads the systems it is given; everything it computes
//! lands in an [`EvalOutcome`] that the caller applies afterwards. Test and
//! definition results are memoized by `(system, id)`, and the same keys on
//! the recursion stack detect extend_definition cycles.

use std::collections::BTreeMap;

use ovaleval_types::{Message, ResultsError, Verdict};

use crate::criteria::{CriteriaNode, DefinitionRef, NodeKind};
use crate::leaf::{evaluate_test, TestOutcome};
use crate::logic::{combine, Precedence};
use crate::system::ResultSystem;

type Key = (usize, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefinitionOutcome {
    pub result: Verdict,
    pub node_results: Vec<Verdict>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default)]
pub(crate) struct EvalOutcome {
    pub definitions: BTreeMap<Key, DefinitionOutcome>,
    pub tests: BTreeMap<Key, TestOutcome>,
    pub problems: BTreeMap<usize, Vec<ResultsError>>,
}

impl EvalOutcome {
    /// Split off everything recorded for system `sys`.
    pub fn take_system(&mut self, sys: usize) -> EvalOutcome {
        let mut problems = BTreeMap::new();
        if let Some(p) = self.problems.remove(&sys) {
            problems.insert(sys, p);
        }
        EvalOutcome {
            definitions: take_range(&mut self.definitions, sys),
            tests: take_range(&mut self.tests, sys),
            problems,
        }
    }
}

fn take_range<V>(map: &mut BTreeMap<Key, V>, sys: usize) -> BTreeMap<Key, V> {
    let mut taken = map.split_off(&(sys, String::new()));
    let mut rest = taken.split_off(&(sys + 1, String::new()));
    map.append(&mut rest);
    taken
}

pub(crate) struct Evaluator<'a> {
    systems: &'a [ResultSystem],
    precedence: &'a Precedence,
    current: usize,
    stack: Vec<Key>,
    cycles: BTreeMap<Key, Vec<String>>,
    out: EvalOutcome,
}

impl<'a> Evaluator<'a> {
    pub fn new(systems: &'a [ResultSystem], precedence: &'a Precedence) -> Self {
        Self {
            systems,
            precedence,
            current: 0,
            stack: vec![],
            cycles: BTreeMap::new(),
            out: EvalOutcome::default(),
        }
    }

    /// Evaluate every definition of system `sys`, in insertion order.
    pub fn evaluate_system(&mut self, sys: usize) {
        let systems = self.systems;
        self.current = sys;
        tracing::debug!(
            system = %systems[sys].snapshot_id(),
            definitions = systems[sys].definition_count(),
            "evaluating system"
        );
        for def in systems[sys].definitions() {
            self.definition(sys, def.definition_id());
        }
    }

    /// Evaluate one definition of system `sys` (plus whatever it reaches).
    pub fn evaluate_definition(&mut self, sys: usize, id: &str) -> Verdict {
        self.current = sys;
        self.definition(sys, id)
    }

    pub fn finish(self) -> EvalOutcome {
        self.out
    }

    fn problem(&mut self, err: ResultsError) {
        self.out.problems.entry(self.current).or_default().push(err);
    }

    fn definition(&mut self, sys: usize, id: &str) -> Verdict {
        let key: Key = (sys, id.to_string());
        if let Some(done) = self.out.definitions.get(&key) {
            return done.result;
        }
        if let Some(pos) = self.stack.iter().position(|k| *k == key) {
            self.record_cycle(pos, &key);
            return Verdict::Error;
        }

        let systems = self.systems;
        let Some(def) = systems[sys].definition(id) else {
            self.problem(ResultsError::UnknownDefinition(id.to_string()));
            return Verdict::Error;
        };

        self.stack.push(key.clone());
        let (mut result, mut node_results) = match def.criteria() {
            Some(root) => {
                let mut node_results = vec![];
                let v = self.node(sys, root, &mut node_results);
                (v, node_results)
            }
            // Imported thin results keep their verdict; nothing to recompute.
            None if def.result().is_valid() => (def.result(), vec![]),
            None => (Verdict::NotEvaluated, vec![]),
        };
        self.stack.pop();

        let mut messages = vec![];
        if let Some(path) = self.cycles.get(&key) {
            result = Verdict::Error;
            if let Some(root) = def.criteria() {
                let mut idx = 0;
                self.mark_cycle(sys, root, &mut node_results, &mut idx);
                if let Some(first) = node_results.first_mut() {
                    *first = Verdict::Error;
                }
            }
            messages.push(Message::error(format!(
                "extend_definition cycle: {}",
                path.join(" -> ")
            )));
        } else if def.criteria().is_none() && !def.result().is_valid() {
            messages.push(Message::warning(format!("definition {} has no criteria", id)));
        }

        self.out.definitions.insert(
            key,
            DefinitionOutcome {
                result,
                node_results,
                messages,
            },
        );
        result
    }

    fn record_cycle(&mut self, pos: usize, key: &Key) {
        let mut path: Vec<String> = self.stack[pos..]
            .iter()
            .map(|(s, id)| self.label(*s, id))
            .collect();
        path.push(self.label(key.0, &key.1));
        tracing::warn!(cycle = %path.join(" -> "), "extend_definition cycle detected");

        for member in self.stack[pos..].to_vec() {
            self.cycles.insert(member, path.clone());
        }
        self.problem(ResultsError::Cycle(path));
    }

    /// Set every node from the root down to an extend_definition into the
    /// cycle to `Error`. Returns whether `node` lies on such a path.
    fn mark_cycle(
        &self,
        sys: usize,
        node: &CriteriaNode,
        results: &mut [Verdict],
        idx: &mut usize,
    ) -> bool {
        let slot = *idx;
        *idx += 1;
        let on_path = match node.kind() {
            NodeKind::Criterion { .. } => false,
            NodeKind::Criteria { children, .. } => {
                let mut any = false;
                for child in children {
                    any |= self.mark_cycle(sys, child, results, idx);
                }
                any
            }
            NodeKind::ExtendDefinition { target } => {
                let target_sys = match &target.system {
                    None => Some(sys),
                    Some(snapshot_id) => self
                        .systems
                        .iter()
                        .position(|s| s.snapshot_id() == snapshot_id.as_str()),
                };
                target_sys.is_some_and(|t| {
                    self.cycles
                        .contains_key(&(t, target.definition_id.clone()))
                })
            }
        };
        if on_path {
            if let Some(r) = results.get_mut(slot) {
                *r = Verdict::Error;
            }
        }
        on_path
    }

    fn label(&self, sys: usize, id: &str) -> String {
        if sys == self.current {
            id.to_string()
        } else {
            format!("{}@{}", id, self.systems[sys].snapshot_id())
        }
    }

    fn node(&mut self, sys: usize, node: &'a CriteriaNode, out: &mut Vec<Verdict>) -> Verdict {
        let slot = out.len();
        out.push(Verdict::Invalid);

        let raw = match node.kind() {
            NodeKind::Criterion { test_ref } => self.test(sys, test_ref),
            NodeKind::Criteria { operator, children } => {
                let mut results = Vec::with_capacity(children.len());
                for child in children {
                    results.push(self.node(sys, child, out));
                }
                combine(*operator, &results, self.precedence)
            }
            NodeKind::ExtendDefinition { target } => match self.resolve(sys, target) {
                Some(target_sys) => self.definition(target_sys, &target.definition_id),
                None => Verdict::Error,
            },
        };

        let v = raw.negate_if(node.negate());
        out[slot] = v;
        v
    }

    fn resolve(&mut self, sys: usize, target: &DefinitionRef) -> Option<usize> {
        let Some(snapshot_id) = &target.system else {
            return Some(sys);
        };
        let found = self
            .systems
            .iter()
            .position(|s| s.snapshot_id() == snapshot_id.as_str());
        if found.is_none() {
            self.problem(ResultsError::UnknownSystem(snapshot_id.clone()));
        }
        found
    }

    fn test(&mut self, sys: usize, test_id: &str) -> Verdict {
        let key: Key = (sys, test_id.to_string());
        if let Some(done) = self.out.tests.get(&key) {
            return done.result;
        }

        let systems = self.systems;
        let system = &systems[sys];
        let outcome = match system.catalog().test(test_id) {
            Some(def) => evaluate_test(def, system.snapshot(), self.precedence),
            None => {
                self.problem(ResultsError::UnknownTest(test_id.to_string()));
                TestOutcome::error(format!("test {} is not in the definition catalog", test_id))
            }
        };
        let result = outcome.result;
        self.out.tests.insert(key, outcome);
        result
    }
}
