//! Results for one evaluated target system.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ovaleval_types::{DefinitionCatalog, ResultsError, SystemCharacteristics, SystemDoc, Verdict};

use crate::criteria::{CriteriaNode, DefinitionRef};
use crate::definition::ResultDefinition;
use crate::directives::ResultDirectives;
use crate::eval::{EvalOutcome, Evaluator};
use crate::logic::Precedence;
use crate::test::ResultTest;

/// Definitions and tests evaluated against one snapshot.
///
/// Every definition and test id must exist in the catalog, and every item
/// reference must exist in the snapshot; the adders enforce this.
#[derive(Debug, Clone)]
pub struct ResultSystem {
    catalog: Arc<DefinitionCatalog>,
    snapshot: Arc<SystemCharacteristics>,
    definitions: Vec<ResultDefinition>,
    definition_index: BTreeMap<String, usize>,
    tests: Vec<ResultTest>,
    test_index: BTreeMap<String, usize>,
}

impl PartialEq for ResultSystem {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot_id() == other.snapshot_id()
            && self.definitions == other.definitions
            && self.tests == other.tests
    }
}

impl ResultSystem {
    pub fn new(catalog: Arc<DefinitionCatalog>, snapshot: Arc<SystemCharacteristics>) -> Self {
        Self {
            catalog,
            snapshot,
            definitions: vec![],
            definition_index: BTreeMap::new(),
            tests: vec![],
            test_index: BTreeMap::new(),
        }
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot.id
    }

    pub fn snapshot(&self) -> &SystemCharacteristics {
        &self.snapshot
    }

    pub(crate) fn snapshot_handle(&self) -> Arc<SystemCharacteristics> {
        Arc::clone(&self.snapshot)
    }

    pub fn catalog(&self) -> &DefinitionCatalog {
        &self.catalog
    }

    pub(crate) fn catalog_handle(&self) -> &Arc<DefinitionCatalog> {
        &self.catalog
    }

    pub fn add_definition(&mut self, definition: ResultDefinition) -> Result<(), ResultsError> {
        let id = definition.definition_id().to_string();
        if self.catalog.definition(&id).is_none() {
            return Err(ResultsError::UnknownDefinition(id));
        }
        if self.definition_index.contains_key(&id) {
            return Err(ResultsError::Duplicate {
                kind: "definition",
                id,
            });
        }
        self.definition_index.insert(id, self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn add_test(&mut self, test: ResultTest) -> Result<(), ResultsError> {
        let id = test.test_id().to_string();
        if self.catalog.test(&id).is_none() {
            return Err(ResultsError::UnknownTest(id));
        }
        if self.test_index.contains_key(&id) {
            return Err(ResultsError::Duplicate { kind: "test", id });
        }
        if let Some(item) = test
            .items()
            .iter()
            .find(|i| self.snapshot.item(i.item_ref()).is_none())
        {
            return Err(ResultsError::UnknownItem(item.item_ref().to_string()));
        }
        self.test_index.insert(id, self.tests.len());
        self.tests.push(test);
        Ok(())
    }

    pub fn definition(&self, id: &str) -> Option<&ResultDefinition> {
        self.definition_index.get(id).map(|i| &self.definitions[*i])
    }

    pub fn definition_mut(&mut self, id: &str) -> Option<&mut ResultDefinition> {
        let i = *self.definition_index.get(id)?;
        Some(&mut self.definitions[i])
    }

    /// Definitions in insertion order.
    pub fn definitions(&self) -> std::slice::Iter<'_, ResultDefinition> {
        self.definitions.iter()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn test(&self, id: &str) -> Option<&ResultTest> {
        self.test_index.get(id).map(|i| &self.tests[*i])
    }

    pub fn test_mut(&mut self, id: &str) -> Option<&mut ResultTest> {
        let i = *self.test_index.get(id)?;
        Some(&mut self.tests[i])
    }

    /// Tests in insertion order.
    pub fn tests(&self) -> std::slice::Iter<'_, ResultTest> {
        self.tests.iter()
    }

    /// Evaluate every definition in the catalog against this system's snapshot.
    ///
    /// Only this system is in scope: an extend_definition that names another
    /// system resolves to `Error`. Use [`crate::ResultsModel::eval`] for
    /// cross-system references.
    pub fn eval(&mut self) -> Result<(), ResultsError> {
        self.eval_with(&Precedence::default())
    }

    pub fn eval_with(&mut self, precedence: &Precedence) -> Result<(), ResultsError> {
        let mut problems = self.materialize_all();
        let outcome = {
            let mut evaluator = Evaluator::new(std::slice::from_ref(self), precedence);
            evaluator.evaluate_system(0);
            evaluator.finish()
        };
        problems.extend(self.apply(0, outcome, true));
        self.check(problems)
    }

    /// Evaluate one definition on demand and return its verdict.
    ///
    /// Results reached along the way are kept even when this returns an error.
    pub fn eval_definition(&mut self, id: &str) -> Result<Verdict, ResultsError> {
        self.eval_definition_with(id, &Precedence::default())
    }

    pub fn eval_definition_with(
        &mut self,
        id: &str,
        precedence: &Precedence,
    ) -> Result<Verdict, ResultsError> {
        self.materialize(id)?;
        let (verdict, outcome) = {
            let mut evaluator = Evaluator::new(std::slice::from_ref(self), precedence);
            let v = evaluator.evaluate_definition(0, id);
            (v, evaluator.finish())
        };
        let problems = self.apply(0, outcome, true);
        match problems.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(verdict),
        }
    }

    pub(crate) fn check(&self, problems: Vec<ResultsError>) -> Result<(), ResultsError> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ResultsError::Evaluation {
                system: self.snapshot_id().to_string(),
                problems,
            })
        }
    }

    /// Create result entries for every catalog definition not yet present.
    pub(crate) fn materialize_all(&mut self) -> Vec<ResultsError> {
        let catalog = Arc::clone(&self.catalog);
        let mut visited = BTreeSet::new();
        let mut problems = vec![];
        for def in &catalog.definitions {
            if let Err(e) = self.materialize_from(&def.id, &mut visited) {
                problems.push(e);
            }
        }
        problems
    }

    pub(crate) fn materialize(&mut self, id: &str) -> Result<(), ResultsError> {
        self.materialize_from(id, &mut BTreeSet::new())
    }

    fn materialize_from(
        &mut self,
        id: &str,
        visited: &mut BTreeSet<String>,
    ) -> Result<(), ResultsError> {
        if !visited.insert(id.to_string()) {
            return Ok(());
        }
        let catalog = Arc::clone(&self.catalog);
        let Some(def) = catalog.definition(id) else {
            // Imported entries may carry their own criteria.
            return if self.definition(id).is_some() {
                Ok(())
            } else {
                Err(ResultsError::UnknownDefinition(id.to_string()))
            };
        };

        let needs_criteria = self.definition(id).map_or(true, |d| d.criteria().is_none());
        if !needs_criteria {
            return self.materialize_children(id, visited);
        }

        let criteria = def.criteria.as_ref().map(CriteriaNode::from_def);
        match self.definition_mut(id) {
            Some(existing) => existing.set_criteria(criteria),
            None => {
                let mut fresh = ResultDefinition::new(id);
                fresh.set_criteria(criteria);
                self.add_definition(fresh)?;
            }
        }
        self.materialize_children(id, visited)
    }

    fn materialize_children(
        &mut self,
        id: &str,
        visited: &mut BTreeSet<String>,
    ) -> Result<(), ResultsError> {
        let (test_refs, extends): (Vec<String>, Vec<String>) = match self
            .definition(id)
            .and_then(|d| d.criteria())
        {
            Some(root) => (
                root.test_refs().into_iter().map(str::to_string).collect(),
                root.extend_refs()
                    .into_iter()
                    .filter(|r| r.system.is_none())
                    .map(|r| r.definition_id.clone())
                    .collect(),
            ),
            None => return Ok(()),
        };

        for test_ref in test_refs {
            // Unknown tests are reported by the evaluator, with a verdict.
            if self.test(&test_ref).is_none() && self.catalog.test(&test_ref).is_some() {
                self.add_test(ResultTest::new(test_ref))?;
            }
        }
        for ext in extends {
            if self.catalog.definition(&ext).is_some() {
                self.materialize_from(&ext, visited)?;
            }
        }
        Ok(())
    }

    /// System-qualified extend_definition targets reachable from `id`
    /// without leaving this system.
    pub(crate) fn foreign_refs(&self, id: &str) -> Vec<DefinitionRef> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![id.to_string()];
        let mut out = vec![];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(root) = self.definition(&current).and_then(|d| d.criteria()) else {
                continue;
            };
            for r in root.extend_refs() {
                match &r.system {
                    Some(_) => out.push(r.clone()),
                    None => pending.push(r.definition_id.clone()),
                }
            }
        }
        out
    }

    /// Write evaluator results for system `sys` back into this system.
    ///
    /// With `structural = false` (locked model) only entities that already
    /// exist are refreshed.
    pub(crate) fn apply(
        &mut self,
        sys: usize,
        mut outcome: EvalOutcome,
        structural: bool,
    ) -> Vec<ResultsError> {
        let mut problems = outcome.problems.remove(&sys).unwrap_or_default();
        for ((s, id), test) in std::mem::take(&mut outcome.tests) {
            if s != sys {
                continue;
            }
            if self.test(&id).is_none() {
                if !structural || self.catalog.test(&id).is_none() {
                    continue;
                }
                if let Err(err) = self.add_test(ResultTest::new(id.clone())) {
                    problems.push(err);
                    continue;
                }
            }
            if let Some(target) = self.test_mut(&id) {
                target.refresh(test.result, test.message, test.items, test.bindings);
            }
        }
        for ((s, id), def) in std::mem::take(&mut outcome.definitions) {
            if s != sys {
                continue;
            }
            if let Some(target) = self.definition_mut(&id) {
                target.refresh(def.result, def.node_results, def.messages);
            }
        }
        problems
    }

    /// Deep copy bound to `catalog`/`snapshot`, re-resolving every reference.
    pub fn clone_into(
        &self,
        catalog: Arc<DefinitionCatalog>,
        snapshot: Arc<SystemCharacteristics>,
    ) -> Result<ResultSystem, ResultsError> {
        let mut out = ResultSystem::new(catalog, snapshot);
        for test in &self.tests {
            out.add_test(test.clone())?;
        }
        for def in &self.definitions {
            out.add_definition(def.clone())?;
        }
        Ok(out)
    }

    pub fn to_doc(&self, directives: &ResultDirectives) -> SystemDoc {
        SystemDoc {
            snapshot_id: self.snapshot_id().to_string(),
            snapshot: if directives.any_full() {
                Some((*self.snapshot).clone())
            } else {
                None
            },
            definitions: self
                .definitions
                .iter()
                .filter(|d| directives.reported(d.result()))
                .map(|d| d.to_doc(directives.is_full(d.result())))
                .collect(),
            tests: self
                .tests
                .iter()
                .filter(|t| directives.reported(t.result()))
                .map(|t| t.to_doc(directives.is_full(t.result())))
                .collect(),
        }
    }

    /// Rebuild a system from a document, resolving against `catalog`/`snapshot`.
    pub fn from_doc(
        doc: &SystemDoc,
        catalog: Arc<DefinitionCatalog>,
        snapshot: Arc<SystemCharacteristics>,
    ) -> Result<ResultSystem, ResultsError> {
        let mut out = ResultSystem::new(catalog, snapshot);
        for t in &doc.tests {
            out.add_test(ResultTest::from_doc(t))?;
        }
        for d in &doc.definitions {
            let def = ResultDefinition::from_doc(d);
            // Criteria may reference tests that were filtered out on export.
            if let Some(root) = def.criteria() {
                for test_ref in root.test_refs() {
                    if out.test(test_ref).is_none() {
                        out.add_test(ResultTest::new(test_ref))?;
                    }
                }
            }
            out.add_definition(def)?;
        }
        Ok(out)
    }
}
