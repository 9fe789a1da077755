//! Serialized results document (the import/export wire format).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ContentLevel, Message, Operator, SystemCharacteristics, VariableBinding, Verdict,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsDocument {
    pub schema: String,
    pub generator: GeneratorMeta,
    #[serde(default)]
    pub directives: Vec<DirectiveDoc>,
    #[serde(default)]
    pub systems: Vec<SystemDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorMeta {
    pub name: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostMeta {
    pub os: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectiveDoc {
    pub result: Verdict,
    pub reported: bool,
    #[serde(default)]
    pub content: ContentLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemDoc {
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SystemCharacteristics>,
    #[serde(default)]
    pub definitions: Vec<DefinitionDoc>,
    #[serde(default)]
    pub tests: Vec<TestDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionDoc {
    pub id: String,
    #[serde(default)]
    pub instance: u32,
    pub result: Verdict,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<CriteriaDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriteriaDoc {
    Criteria {
        operator: Operator,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        result: Verdict,
        #[serde(default)]
        children: Vec<CriteriaDoc>,
    },
    Criterion {
        test_ref: String,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        result: Verdict,
    },
    ExtendDefinition {
        definition_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_ref: Option<String>,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        result: Verdict,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestDoc {
    pub id: String,
    #[serde(default)]
    pub instance: u32,
    pub result: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<VariableBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDoc {
    pub item_ref: String,
    pub result: Verdict,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}
