//! Criteria tree: one sum type, dispatched centrally by the evaluator.

use ovaleval_types::{CriteriaDef, CriteriaDoc, Operator, Verdict};

/// Reference to a definition, optionally in another system of the same model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DefinitionRef {
    pub definition_id: String,
    /// Snapshot id of the owning system; `None` means "same system".
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Criterion { test_ref: String },
    Criteria { operator: Operator, children: Vec<CriteriaNode> },
    ExtendDefinition { target: DefinitionRef },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaNode {
    kind: NodeKind,
    negate: bool,
    result: Verdict,
}

impl CriteriaNode {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            kind,
            negate: false,
            result: Verdict::Invalid,
        }
    }

    pub fn criterion(test_ref: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Criterion {
            test_ref: test_ref.into(),
        })
    }

    pub fn criteria(operator: Operator, children: Vec<CriteriaNode>) -> Self {
        Self::with_kind(NodeKind::Criteria { operator, children })
    }

    pub fn extend(definition_id: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::ExtendDefinition {
            target: DefinitionRef {
                definition_id: definition_id.into(),
                system: None,
            },
        })
    }

    /// Extend a definition that lives in the system evaluated against `snapshot_id`.
    pub fn extend_in(snapshot_id: impl Into<String>, definition_id: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::ExtendDefinition {
            target: DefinitionRef {
                definition_id: definition_id.into(),
                system: Some(snapshot_id.into()),
            },
        })
    }

    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn set_negate(&mut self, negate: bool) {
        self.negate = negate;
    }

    /// Cached result of the last evaluation (`Invalid` before any).
    pub fn result(&self) -> Verdict {
        self.result
    }

    pub fn set_result(&mut self, result: Verdict) {
        self.result = result;
    }

    pub fn operator(&self) -> Option<Operator> {
        match &self.kind {
            NodeKind::Criteria { operator, .. } => Some(*operator),
            _ => None,
        }
    }

    pub fn set_operator(&mut self, op: Operator) {
        if let NodeKind::Criteria { operator, .. } = &mut self.kind {
            *operator = op;
        }
    }

    pub fn children(&self) -> &[CriteriaNode] {
        match &self.kind {
            NodeKind::Criteria { children, .. } => children,
            _ => &[],
        }
    }

    /// Appends a child; no-op on leaf nodes.
    pub fn add_child(&mut self, child: CriteriaNode) {
        if let NodeKind::Criteria { children, .. } = &mut self.kind {
            children.push(child);
        }
    }

    pub fn test_ref(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Criterion { test_ref } => Some(test_ref),
            _ => None,
        }
    }

    pub fn extends(&self) -> Option<&DefinitionRef> {
        match &self.kind {
            NodeKind::ExtendDefinition { target } => Some(target),
            _ => None,
        }
    }

    /// Every test id referenced under this node, in preorder.
    pub fn test_refs(&self) -> Vec<&str> {
        let mut out = vec![];
        self.walk(&mut |n| {
            if let Some(t) = n.test_ref() {
                out.push(t);
            }
        });
        out
    }

    /// Every extend_definition target under this node, in preorder.
    pub fn extend_refs(&self) -> Vec<&DefinitionRef> {
        let mut out = vec![];
        self.walk(&mut |n| {
            if let Some(r) = n.extends() {
                out.push(r);
            }
        });
        out
    }

    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a CriteriaNode)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Assign cached results from a preorder list produced by the evaluator.
    pub(crate) fn apply_results(&mut self, results: &mut impl Iterator<Item = Verdict>) {
        if let Some(v) = results.next() {
            self.result = v;
        }
        if let NodeKind::Criteria { children, .. } = &mut self.kind {
            for child in children {
                child.apply_results(results);
            }
        }
    }

    pub fn from_def(def: &CriteriaDef) -> Self {
        match def {
            CriteriaDef::Criteria {
                operator,
                negate,
                children,
            } => CriteriaNode::criteria(*operator, children.iter().map(Self::from_def).collect())
                .negated(*negate),
            CriteriaDef::Criterion { test_ref, negate } => {
                CriteriaNode::criterion(test_ref.clone()).negated(*negate)
            }
            CriteriaDef::ExtendDefinition {
                definition_ref,
                negate,
            } => CriteriaNode::extend(definition_ref.clone()).negated(*negate),
        }
    }

    pub fn to_doc(&self) -> CriteriaDoc {
        match &self.kind {
            NodeKind::Criterion { test_ref } => CriteriaDoc::Criterion {
                test_ref: test_ref.clone(),
                negate: self.negate,
                result: self.result,
            },
            NodeKind::Criteria { operator, children } => CriteriaDoc::Criteria {
                operator: *operator,
                negate: self.negate,
                result: self.result,
                children: children.iter().map(Self::to_doc).collect(),
            },
            NodeKind::ExtendDefinition { target } => CriteriaDoc::ExtendDefinition {
                definition_ref: target.definition_id.clone(),
                system_ref: target.system.clone(),
                negate: self.negate,
                result: self.result,
            },
        }
    }

    pub fn from_doc(doc: &CriteriaDoc) -> Self {
        let (mut node, result) = match doc {
            CriteriaDoc::Criteria {
                operator,
                negate,
                result,
                children,
            } => (
                CriteriaNode::criteria(*operator, children.iter().map(Self::from_doc).collect())
                    .negated(*negate),
                *result,
            ),
            CriteriaDoc::Criterion {
                test_ref,
                negate,
                result,
            } => (CriteriaNode::criterion(test_ref.clone()).negated(*negate), *result),
            CriteriaDoc::ExtendDefinition {
                definition_ref,
                system_ref,
                negate,
                result,
            } => {
                let node = match system_ref {
                    Some(sys) => CriteriaNode::extend_in(sys.clone(), definition_ref.clone()),
                    None => CriteriaNode::extend(definition_ref.clone()),
                };
                (node.negated(*negate), *result)
            }
        };
        node.result = result;
        node
    }
}
