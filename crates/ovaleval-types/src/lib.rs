//! Shared DTOs and stable codes for ovaleval.
//!
//! This crate is deliberately boring: it should be safe to depend on from
//! any layer (domain, substitution, renderers, adapters).

pub mod catalog;
pub mod report;
pub mod syschar;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use catalog::{
    Check, CriteriaDef, Definition, DefinitionCatalog, EntityOperation, Existence, StateDef,
    StateEntity, TestDef,
};
pub use report::{
    CriteriaDoc, DefinitionDoc, DirectiveDoc, GeneratorMeta, HostMeta, ItemDoc, ResultsDocument,
    SystemDoc, TestDoc,
};
pub use syschar::{
    CollectedFlag, CollectedObject, ItemStatus, SysItem, SystemCharacteristics, SystemInfo,
    VariableValue,
};

pub const TOOL_NAME: &str = "ovaleval";
pub const SCHEMA_ID: &str = "ovaleval.results.v1";

/// Six-valued evaluation outcome, plus the `Invalid` placeholder for
/// "not computed yet".
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub enum Verdict {
    #[default]
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "not evaluated")]
    NotEvaluated,
    #[serde(rename = "not applicable")]
    NotApplicable,
}

impl Verdict {
    pub const ALL: [Verdict; 7] = [
        Verdict::Invalid,
        Verdict::True,
        Verdict::False,
        Verdict::Unknown,
        Verdict::Error,
        Verdict::NotEvaluated,
        Verdict::NotApplicable,
    ];

    /// Stable report text. Keep these stable, they are part of the output format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Invalid => "invalid",
            Verdict::True => "true",
            Verdict::False => "false",
            Verdict::Unknown => "unknown",
            Verdict::Error => "error",
            Verdict::NotEvaluated => "not evaluated",
            Verdict::NotApplicable => "not applicable",
        }
    }

    /// Dense index, usable for per-verdict tables.
    pub fn index(self) -> usize {
        match self {
            Verdict::Invalid => 0,
            Verdict::True => 1,
            Verdict::False => 2,
            Verdict::Unknown => 3,
            Verdict::Error => 4,
            Verdict::NotEvaluated => 5,
            Verdict::NotApplicable => 6,
        }
    }

    /// Flips `True`/`False`; every other value passes through.
    pub fn negate(self) -> Verdict {
        match self {
            Verdict::True => Verdict::False,
            Verdict::False => Verdict::True,
            other => other,
        }
    }

    pub fn negate_if(self, negate: bool) -> Verdict {
        if negate {
            self.negate()
        } else {
            self
        }
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, Verdict::True | Verdict::False)
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, Verdict::Invalid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().replace('_', " ");
        Verdict::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(&needle))
            .ok_or_else(|| format!("invalid verdict: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentLevel {
    Unknown,
    Thin,
    #[default]
    Full,
}

impl ContentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentLevel::Unknown => "unknown",
            ContentLevel::Thin => "thin",
            ContentLevel::Full => "full",
        }
    }
}

/// Boolean-like combinator over child verdicts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    #[default]
    And,
    Or,
    One,
    Xor,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::One => "ONE",
            Operator::Xor => "XOR",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
}

impl Message {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, text)
    }
}

/// A variable value that was used while evaluating a test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariableBinding {
    pub variable_id: String,
    pub value: String,
}

impl VariableBinding {
    pub fn new(variable_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            variable_id: variable_id.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultsError {
    #[error("results model is locked")]
    Locked,
    #[error("unknown definition: {0}")]
    UnknownDefinition(String),
    #[error("unknown test: {0}")]
    UnknownTest(String),
    #[error("unknown system: {0}")]
    UnknownSystem(String),
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("extend_definition cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("evaluation of system {system} reported {} problem(s)", .problems.len())]
    Evaluation {
        system: String,
        problems: Vec<ResultsError>,
    },
    #[error("{} system(s) failed to evaluate", .0.len())]
    Batch(Vec<ResultsError>),
    #[error("invalid precedence: {0}")]
    InvalidPrecedence(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ResultsError {
    pub fn code(&self) -> &'static str {
        match self {
            ResultsError::Locked => codes::RESULTS_LOCKED,
            ResultsError::UnknownDefinition(_) => codes::RESULTS_UNKNOWN_DEFINITION,
            ResultsError::UnknownTest(_) => codes::RESULTS_UNKNOWN_TEST,
            ResultsError::UnknownSystem(_) => codes::RESULTS_UNKNOWN_SYSTEM,
            ResultsError::UnknownItem(_) => codes::RESULTS_UNKNOWN_ITEM,
            ResultsError::Duplicate { .. } => codes::RESULTS_DUPLICATE,
            ResultsError::Cycle(_) => codes::RESULTS_EXTEND_CYCLE,
            ResultsError::Evaluation { .. } | ResultsError::Batch(_) => {
                codes::RESULTS_EVALUATION_FAILED
            }
            ResultsError::InvalidPrecedence(_) => codes::RESULTS_INVALID_PRECEDENCE,
            ResultsError::Parse(_) => codes::RESULTS_PARSE_ERROR,
            ResultsError::Io(_) => codes::RESULTS_IO_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstitutionError {
    #[error("the sub element MUST have a single non-empty @idref attribute")]
    MissingIdref,
    #[error("could not resolve sub/@idref='{0}'")]
    Unresolved(String),
    #[error("malformed text: {0}")]
    Malformed(String),
}

impl SubstitutionError {
    pub fn code(&self) -> &'static str {
        match self {
            SubstitutionError::MissingIdref => codes::SUB_MISSING_IDREF,
            SubstitutionError::Unresolved(_) => codes::SUB_UNRESOLVED_IDREF,
            SubstitutionError::Malformed(_) => codes::SUB_MALFORMED,
        }
    }
}

pub mod codes {
    // Keep these stable. This is the external API.
    pub const RESULTS_LOCKED: &str = "results.locked";
    pub const RESULTS_UNKNOWN_DEFINITION: &str = "results.unknown_definition";
    pub const RESULTS_UNKNOWN_TEST: &str = "results.unknown_test";
    pub const RESULTS_UNKNOWN_SYSTEM: &str = "results.unknown_system";
    pub const RESULTS_UNKNOWN_ITEM: &str = "results.unknown_item";
    pub const RESULTS_DUPLICATE: &str = "results.duplicate";
    pub const RESULTS_EXTEND_CYCLE: &str = "results.extend_cycle";
    pub const RESULTS_EVALUATION_FAILED: &str = "results.evaluation_failed";
    pub const RESULTS_INVALID_PRECEDENCE: &str = "results.invalid_precedence";
    pub const RESULTS_PARSE_ERROR: &str = "results.parse_error";
    pub const RESULTS_IO_ERROR: &str = "results.io_error";

    pub const SUB_MISSING_IDREF: &str = "sub.missing_idref";
    pub const SUB_UNRESOLVED_IDREF: &str = "sub.unresolved_idref";
    pub const SUB_MALFORMED: &str = "sub.malformed_xml";

    pub const ALL: &[&str] = &[
        RESULTS_LOCKED,
        RESULTS_UNKNOWN_DEFINITION,
        RESULTS_UNKNOWN_TEST,
        RESULTS_UNKNOWN_SYSTEM,
        RESULTS_UNKNOWN_ITEM,
        RESULTS_DUPLICATE,
        RESULTS_EXTEND_CYCLE,
        RESULTS_EVALUATION_FAILED,
        RESULTS_INVALID_PRECEDENCE,
        RESULTS_PARSE_ERROR,
        RESULTS_IO_ERROR,
        SUB_MISSING_IDREF,
        SUB_UNRESOLVED_IDREF,
        SUB_MALFORMED,
    ];
}
