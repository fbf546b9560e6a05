//! Stage controllers and their output contracts.
//!
//! One [`StageController`] per [`StageKind`](crate::core::StageKind) owns the
//! stage's entry and exit contract: which artifacts the agent sees, how its
//! answer is validated, and what gets written to the store.

mod controller;
mod parse;
mod schema;

pub use controller::{StageController, StageEnvironment};
pub use parse::{extract_json_field, parse_file_sections, parse_modules, parse_verdicts, UnsafePath};
pub use schema::{input_kinds, validate, ValidatedOutput};
