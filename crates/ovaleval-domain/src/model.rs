//! The results model: every system evaluated against one definition catalog.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ovaleval_types::{
    DefinitionCatalog, GeneratorMeta, HostMeta, ResultsDocument, ResultsError,
    SystemCharacteristics, Verdict, SCHEMA_ID, TOOL_NAME,
};

use crate::directives::ResultDirectives;
use crate::eval::Evaluator;
use crate::logic::Precedence;
use crate::system::ResultSystem;

/// Catalog, snapshots and the per-snapshot result systems.
///
/// Locking is one-way. A locked model rejects structural changes with
/// [`ResultsError::Locked`] and is safe to share between reader threads.
#[derive(Debug, Clone)]
pub struct ResultsModel {
    catalog: Arc<DefinitionCatalog>,
    snapshots: Vec<Arc<SystemCharacteristics>>,
    systems: Vec<ResultSystem>,
    precedence: Precedence,
    locked: bool,
}

impl ResultsModel {
    pub fn new(
        catalog: DefinitionCatalog,
        snapshots: impl IntoIterator<Item = SystemCharacteristics>,
    ) -> Result<Self, ResultsError> {
        let mut model = Self {
            catalog: Arc::new(catalog),
            snapshots: vec![],
            systems: vec![],
            precedence: Precedence::default(),
            locked: false,
        };
        for sc in snapshots {
            model.add_snapshot(sc)?;
        }
        Ok(model)
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn precedence(&self) -> &Precedence {
        &self.precedence
    }

    pub fn catalog(&self) -> &DefinitionCatalog {
        &self.catalog
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &SystemCharacteristics> {
        self.snapshots.iter().map(|s| s.as_ref())
    }

    pub fn snapshot(&self, id: &str) -> Option<&SystemCharacteristics> {
        self.snapshot_handle(id).map(|s| s.as_ref())
    }

    fn snapshot_handle(&self, id: &str) -> Option<&Arc<SystemCharacteristics>> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    fn ensure_unlocked(&self) -> Result<(), ResultsError> {
        if self.locked {
            Err(ResultsError::Locked)
        } else {
            Ok(())
        }
    }

    pub fn add_snapshot(&mut self, snapshot: SystemCharacteristics) -> Result<(), ResultsError> {
        self.ensure_unlocked()?;
        if self.snapshot(&snapshot.id).is_some() {
            return Err(ResultsError::Duplicate {
                kind: "snapshot",
                id: snapshot.id,
            });
        }
        self.snapshots.push(Arc::new(snapshot));
        Ok(())
    }

    /// Attach an existing system, re-resolving it against this model.
    ///
    /// A snapshot the model does not know yet is adopted from the system.
    pub fn add_system(&mut self, system: ResultSystem) -> Result<(), ResultsError> {
        self.ensure_unlocked()?;
        let id = system.snapshot_id().to_string();
        if self.system(&id).is_some() {
            return Err(ResultsError::Duplicate { kind: "system", id });
        }
        let (snapshot, adopted) = match self.snapshot_handle(&id) {
            Some(s) => (Arc::clone(s), false),
            None => (system.snapshot_handle(), true),
        };
        let resolved = system.clone_into(Arc::clone(&self.catalog), Arc::clone(&snapshot))?;
        if adopted {
            self.snapshots.push(snapshot);
        }
        self.systems.push(resolved);
        Ok(())
    }

    /// Create an empty system for a snapshot already in the model.
    pub fn new_system(&mut self, snapshot_id: &str) -> Result<&mut ResultSystem, ResultsError> {
        self.ensure_unlocked()?;
        if self.system(snapshot_id).is_some() {
            return Err(ResultsError::Duplicate {
                kind: "system",
                id: snapshot_id.to_string(),
            });
        }
        let snapshot = self
            .snapshot_handle(snapshot_id)
            .cloned()
            .ok_or_else(|| ResultsError::UnknownSystem(snapshot_id.to_string()))?;
        self.systems
            .push(ResultSystem::new(Arc::clone(&self.catalog), snapshot));
        let last = self.systems.len() - 1;
        Ok(&mut self.systems[last])
    }

    pub fn lock(&mut self) {
        if !self.locked {
            tracing::debug!(systems = self.systems.len(), "results model locked");
        }
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Systems in insertion order.
    pub fn systems(&self) -> std::slice::Iter<'_, ResultSystem> {
        self.systems.iter()
    }

    pub fn system(&self, snapshot_id: &str) -> Option<&ResultSystem> {
        self.systems.iter().find(|s| s.snapshot_id() == snapshot_id)
    }

    pub fn system_mut(&mut self, snapshot_id: &str) -> Result<&mut ResultSystem, ResultsError> {
        self.ensure_unlocked()?;
        self.systems
            .iter_mut()
            .find(|s| s.snapshot_id() == snapshot_id)
            .ok_or_else(|| ResultsError::UnknownSystem(snapshot_id.to_string()))
    }

    fn index_of(&self, snapshot_id: &str) -> Option<usize> {
        self.systems
            .iter()
            .position(|s| s.snapshot_id() == snapshot_id)
    }

    /// Evaluate every system.
    ///
    /// While unlocked, snapshots without a system get one and missing
    /// definitions/tests are created from the catalog first. Partial results
    /// are kept for every system; the error lists each failing system.
    pub fn eval(&mut self) -> Result<(), ResultsError> {
        let structural = !self.locked;
        let mut problems: Vec<Vec<ResultsError>> = vec![];

        if structural {
            let missing: Vec<Arc<SystemCharacteristics>> = self
                .snapshots
                .iter()
                .filter(|s| self.system(&s.id).is_none())
                .cloned()
                .collect();
            for snapshot in missing {
                self.systems
                    .push(ResultSystem::new(Arc::clone(&self.catalog), snapshot));
            }
            for system in &mut self.systems {
                problems.push(system.materialize_all());
            }
        } else {
            problems.resize_with(self.systems.len(), Vec::new);
        }

        let mut outcome = {
            let mut evaluator = Evaluator::new(&self.systems, &self.precedence);
            for sys in 0..self.systems.len() {
                evaluator.evaluate_system(sys);
            }
            evaluator.finish()
        };

        let mut failures = vec![];
        for (sys, system) in self.systems.iter_mut().enumerate() {
            let part = outcome.take_system(sys);
            let mut found = std::mem::take(&mut problems[sys]);
            found.extend(system.apply(sys, part, structural));
            if let Err(e) = system.check(found) {
                tracing::warn!(system = %system.snapshot_id(), error = %e, "evaluation problems");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ResultsError::Batch(failures))
        }
    }

    /// Evaluate one definition of one system on demand.
    ///
    /// Results reached along the way are kept even when this returns an
    /// error; the error is the first problem encountered.
    pub fn eval_definition(
        &mut self,
        snapshot_id: &str,
        definition_id: &str,
    ) -> Result<Verdict, ResultsError> {
        let sys = self
            .index_of(snapshot_id)
            .ok_or_else(|| ResultsError::UnknownSystem(snapshot_id.to_string()))?;
        let structural = !self.locked;

        if structural {
            self.systems[sys].materialize(definition_id)?;
            self.materialize_foreign(sys, definition_id);
        } else if self.systems[sys].definition(definition_id).is_none() {
            return Err(ResultsError::UnknownDefinition(definition_id.to_string()));
        }

        let (verdict, mut outcome) = {
            let mut evaluator = Evaluator::new(&self.systems, &self.precedence);
            let v = evaluator.evaluate_definition(sys, definition_id);
            (v, evaluator.finish())
        };

        let mut first = None;
        for (idx, system) in self.systems.iter_mut().enumerate() {
            let part = outcome.take_system(idx);
            let problems = system.apply(idx, part, structural);
            if idx == sys {
                first = problems.into_iter().next();
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(verdict),
        }
    }

    /// Create targets of system-qualified extend_definition references.
    ///
    /// Failures are left for the evaluator to report.
    fn materialize_foreign(&mut self, sys: usize, definition_id: &str) {
        let mut seen = BTreeSet::new();
        let mut pending = vec![(sys, definition_id.to_string())];
        while let Some((idx, id)) = pending.pop() {
            if !seen.insert((idx, id.clone())) {
                continue;
            }
            for r in self.systems[idx].foreign_refs(&id) {
                let Some(target) = r.system.as_deref().and_then(|s| self.index_of(s)) else {
                    continue;
                };
                if self.systems[target].materialize(&r.definition_id).is_ok() {
                    pending.push((target, r.definition_id));
                }
            }
        }
    }

    /// Deep copy against the same catalog. The copy is unlocked.
    pub fn fork(&self) -> ResultsModel {
        ResultsModel {
            locked: false,
            ..self.clone()
        }
    }

    /// Deep copy re-resolved against another catalog and snapshot set.
    ///
    /// Fails if any definition, test, item or snapshot reference is missing
    /// from the target.
    pub fn clone_onto(
        &self,
        catalog: DefinitionCatalog,
        snapshots: impl IntoIterator<Item = SystemCharacteristics>,
    ) -> Result<ResultsModel, ResultsError> {
        let mut out =
            ResultsModel::new(catalog, snapshots)?.with_precedence(self.precedence);
        for system in &self.systems {
            let snapshot = out
                .snapshot_handle(system.snapshot_id())
                .cloned()
                .ok_or_else(|| ResultsError::UnknownSystem(system.snapshot_id().to_string()))?;
            let copy = system.clone_into(Arc::clone(&out.catalog), snapshot)?;
            out.systems.push(copy);
        }
        Ok(out)
    }

    pub fn to_document(
        &self,
        directives: &ResultDirectives,
        generator: GeneratorMeta,
    ) -> ResultsDocument {
        ResultsDocument {
            schema: SCHEMA_ID.to_string(),
            generator,
            directives: directives.to_doc(),
            systems: self.systems.iter().map(|s| s.to_doc(directives)).collect(),
        }
    }

    /// Write the results as JSON, filtered by `directives`.
    pub fn export<W: Write>(
        &self,
        directives: &ResultDirectives,
        writer: W,
    ) -> Result<(), ResultsError> {
        let doc = self.to_document(directives, generator_meta(Utc::now(), None));
        serde_json::to_writer_pretty(writer, &doc).map_err(|e| ResultsError::Io(e.to_string()))
    }

    /// Read a results document and attach its systems.
    ///
    /// Nothing is attached unless the whole document resolves against this
    /// model's catalog and snapshots (or the snapshots embedded in it).
    pub fn import<R: Read>(&mut self, reader: R) -> Result<ResultDirectives, ResultsError> {
        self.ensure_unlocked()?;
        let doc: ResultsDocument =
            serde_json::from_reader(reader).map_err(|e| ResultsError::Parse(e.to_string()))?;
        self.import_document(&doc)
    }

    pub fn import_document(
        &mut self,
        doc: &ResultsDocument,
    ) -> Result<ResultDirectives, ResultsError> {
        self.ensure_unlocked()?;
        if doc.schema != SCHEMA_ID {
            return Err(ResultsError::Parse(format!(
                "unsupported schema '{}', expected '{}'",
                doc.schema, SCHEMA_ID
            )));
        }

        let mut new_snapshots: Vec<Arc<SystemCharacteristics>> = vec![];
        let mut new_systems = vec![];
        for sys_doc in &doc.systems {
            let id = &sys_doc.snapshot_id;
            let taken = self.system(id).is_some()
                || new_systems.iter().any(|s: &ResultSystem| s.snapshot_id() == id);
            if taken {
                return Err(ResultsError::Duplicate {
                    kind: "system",
                    id: id.clone(),
                });
            }
            let snapshot = match self.snapshot_handle(id) {
                Some(s) => Arc::clone(s),
                None => {
                    let embedded = sys_doc
                        .snapshot
                        .clone()
                        .ok_or_else(|| ResultsError::UnknownSystem(id.clone()))?;
                    if embedded.id != *id {
                        return Err(ResultsError::Parse(format!(
                            "embedded snapshot '{}' does not match system '{}'",
                            embedded.id, id
                        )));
                    }
                    let handle = Arc::new(embedded);
                    new_snapshots.push(Arc::clone(&handle));
                    handle
                }
            };
            new_systems.push(ResultSystem::from_doc(
                sys_doc,
                Arc::clone(&self.catalog),
                snapshot,
            )?);
        }

        tracing::debug!(systems = new_systems.len(), "imported results document");
        self.snapshots.extend(new_snapshots);
        self.systems.extend(new_systems);
        Ok(ResultDirectives::from_doc(&doc.directives))
    }
}

/// Generator block for exported documents.
pub fn generator_meta(timestamp: DateTime<Utc>, host: Option<HostMeta>) -> GeneratorMeta {
    GeneratorMeta {
        name: TOOL_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
        host,
    }
}
