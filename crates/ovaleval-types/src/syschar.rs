//! System-characteristics snapshot: facts collected from one target system.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemCharacteristics {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,
    #[serde(default)]
    pub objects: Vec<CollectedObject>,
    #[serde(default)]
    pub items: Vec<SysItem>,
    #[serde(default)]
    pub variables: Vec<VariableValue>,
}

impl SystemCharacteristics {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_info: None,
            objects: vec![],
            items: vec![],
            variables: vec![],
        }
    }

    pub fn object(&self, id: &str) -> Option<&CollectedObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&SysItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn variable(&self, id: &str) -> Option<&VariableValue> {
        self.variables.iter().find(|v| v.variable_id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectedFlag {
    Error,
    Complete,
    Incomplete,
    DoesNotExist,
    NotCollected,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectedObject {
    pub id: String,
    pub flag: CollectedFlag,
    #[serde(default)]
    pub item_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Exists,
    DoesNotExist,
    NotCollected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SysItem {
    pub id: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableValue {
    pub variable_id: String,
    #[serde(default)]
    pub values: Vec<String>,
}
