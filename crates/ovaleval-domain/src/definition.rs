//! Definition results.

use ovaleval_types::{DefinitionDoc, Message, Verdict};

use crate::criteria::CriteriaNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDefinition {
    definition_id: String,
    instance: u32,
    result: Verdict,
    messages: Vec<Message>,
    criteria: Option<CriteriaNode>,
}

impl ResultDefinition {
    pub fn new(definition_id: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            instance: 0,
            result: Verdict::Invalid,
            messages: vec![],
            criteria: None,
        }
    }

    pub fn with_criteria(mut self, criteria: CriteriaNode) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn set_instance(&mut self, instance: u32) {
        self.instance = instance;
    }

    /// Cached verdict of the last evaluation; `Invalid` before any.
    pub fn result(&self) -> Verdict {
        self.result
    }

    pub fn set_result(&mut self, result: Verdict) {
        self.result = result;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn criteria(&self) -> Option<&CriteriaNode> {
        self.criteria.as_ref()
    }

    pub fn set_criteria(&mut self, criteria: Option<CriteriaNode>) {
        self.criteria = criteria;
    }

    pub(crate) fn refresh(
        &mut self,
        result: Verdict,
        node_results: Vec<Verdict>,
        messages: Vec<Message>,
    ) {
        self.result = result;
        self.messages = messages;
        if let Some(root) = self.criteria.as_mut() {
            root.apply_results(&mut node_results.into_iter());
        }
    }

    pub fn to_doc(&self, full: bool) -> DefinitionDoc {
        DefinitionDoc {
            id: self.definition_id.clone(),
            instance: self.instance,
            result: self.result,
            messages: if full { self.messages.clone() } else { vec![] },
            criteria: if full {
                self.criteria.as_ref().map(CriteriaNode::to_doc)
            } else {
                None
            },
        }
    }

    pub fn from_doc(doc: &DefinitionDoc) -> Self {
        Self {
            definition_id: doc.id.clone(),
            instance: doc.instance,
            result: doc.result,
            messages: doc.messages.clone(),
            criteria: doc.criteria.as_ref().map(CriteriaNode::from_doc),
        }
    }
}
