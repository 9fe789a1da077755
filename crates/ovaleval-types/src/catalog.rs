//! Definition catalog: the tests and definitions being evaluated.

use serde::{Deserialize, Serialize};

use crate::Operator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DefinitionCatalog {
    #[serde(default)]
    pub definitions: Vec<Definition>,
    #[serde(default)]
    pub tests: Vec<TestDef>,
}

impl DefinitionCatalog {
    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn test(&self, id: &str) -> Option<&TestDef> {
        self.tests.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Definition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<CriteriaDef>,
}

/// Criteria tree as written in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriteriaDef {
    Criteria {
        #[serde(default)]
        operator: Operator,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        children: Vec<CriteriaDef>,
    },
    Criterion {
        test_ref: String,
        #[serde(default)]
        negate: bool,
    },
    ExtendDefinition {
        definition_ref: String,
        #[serde(default)]
        negate: bool,
    },
}

/// How many collected items must satisfy the state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Check {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "at least one")]
    AtLeastOne,
    #[serde(rename = "none satisfy")]
    NoneSatisfy,
    #[serde(rename = "only one")]
    OnlyOne,
}

/// How many collected items must exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Existence {
    AllExist,
    AnyExist,
    #[default]
    AtLeastOneExists,
    NoneExist,
    OnlyOneExists,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub object_ref: String,
    #[serde(default)]
    pub check: Check,
    #[serde(default)]
    pub check_existence: Existence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateDef {
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub entities: Vec<StateEntity>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EntityOperation {
    #[default]
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "not equal")]
    NotEqual,
    #[serde(rename = "case insensitive equals")]
    CaseInsensitiveEquals,
    #[serde(rename = "pattern match")]
    PatternMatch,
    #[serde(rename = "greater than")]
    GreaterThan,
    #[serde(rename = "less than")]
    LessThan,
    #[serde(rename = "greater than or equal")]
    GreaterThanOrEqual,
    #[serde(rename = "less than or equal")]
    LessThanOrEqual,
}

/// Expectation on one item field. Exactly one of `value` / `var_ref` is
/// expected; `var_ref` wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateEntity {
    pub name: String,
    #[serde(default)]
    pub operation: EntityOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_ref: Option<String>,
}
