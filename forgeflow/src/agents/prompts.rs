//! Default role preambles.
//!
//! Each preamble names the role and the output format its stage controller
//! parses. Wording is deliberately plain; callers can replace it through
//! [`LlmAgent::with_preamble`](super::LlmAgent::with_preamble).

use crate::core::StageKind;

const FILE_FORMAT: &str = "Write every file as a line `FILE: <relative/path>` followed by \
a fenced code block holding the complete file content. Paths must be relative and must \
not contain `..`.";

/// Returns the system preamble for the agent serving `stage`.
#[must_use]
pub fn role_preamble(stage: StageKind) -> String {
    let task = match stage {
        StageKind::Requirements => {
            "Turn the project request into a requirements document in markdown: \
             goals, functional requirements, constraints and acceptance criteria."
                .to_string()
        }
        StageKind::Architecture => {
            "Design the architecture for the requirements: modules, data model and \
             file layout. List every module either as lines `MODULE: <name> - <purpose>` \
             or in a fenced json block `{\"modules\": [\"name\", ...]}`."
                .to_string()
        }
        StageKind::Implementation => format!(
            "Implement the project following the architecture. {FILE_FORMAT} \
             When failing test details are provided, fix the code so those tests pass."
        ),
        StageKind::Testing => format!(
            "Write tests for the source files and run them. {FILE_FORMAT} Then report \
             one line per test as `TEST <name>: PASS` or `TEST <name>: FAIL - <details>`, \
             or a fenced json block `{{\"tests\": [{{\"name\": ..., \"passed\": ..., \
             \"details\": ...}}]}}`."
        ),
        StageKind::Documentation => format!(
            "Write user documentation for the project: a README with setup and usage, \
             plus any further guides. {FILE_FORMAT}"
        ),
        StageKind::Review => {
            "Review the requirements, architecture, code, tests and documentation. \
             Report issues and improvement suggestions as markdown notes."
                .to_string()
        }
    };
    format!("You are an expert {}. {task}", stage.role_name())
}
