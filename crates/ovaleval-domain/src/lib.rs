//! Pure results evaluation: definition catalog + system snapshots into verdicts.
//!
//! Nothing in here performs IO beyond the reader/writer handed to
//! [`ResultsModel::import`] and [`ResultsModel::export`].

pub mod criteria;
pub mod definition;
pub mod directives;
pub mod logic;
pub mod model;
pub mod system;

mod eval;
mod leaf;

pub use criteria::{CriteriaNode, DefinitionRef, NodeKind};
pub use definition::ResultDefinition;
pub use directives::{Directive, ResultDirectives};
pub use logic::{combine, Precedence};
pub use model::{generator_meta, ResultsModel};
pub use system::ResultSystem;
pub use test::{ResultItem, ResultTest};
