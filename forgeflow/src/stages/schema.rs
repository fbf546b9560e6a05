//! Output contracts of each stage.

use super::parse::{parse_file_sections, parse_modules, parse_verdicts, UnsafePath};
use crate::core::{ArtifactKind, FileSet, Payload, StageKind, TestReport};
use crate::errors::ValidationError;

/// Input artifact kinds a stage reads, in canonical order.
#[must_use]
pub fn input_kinds(stage: StageKind) -> &'static [ArtifactKind] {
    use ArtifactKind::{
        ArchitectureDoc, Documentation, RequirementsSpec, SourceFiles, TestFiles, TestReport,
    };
    match stage {
        StageKind::Requirements => &[],
        StageKind::Architecture => &[RequirementsSpec],
        StageKind::Implementation => &[RequirementsSpec, ArchitectureDoc, SourceFiles, TestReport],
        StageKind::Testing => &[RequirementsSpec, SourceFiles],
        StageKind::Documentation => &[RequirementsSpec, ArchitectureDoc, SourceFiles],
        StageKind::Review => &[
            RequirementsSpec,
            ArchitectureDoc,
            SourceFiles,
            TestFiles,
            TestReport,
            Documentation,
        ],
    }
}

/// Agent output that passed its stage schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOutput {
    /// Artifacts to persist, in write order.
    pub artifacts: Vec<(ArtifactKind, Payload)>,
    /// The parsed test report, Testing only.
    pub test_report: Option<TestReport>,
}

impl ValidatedOutput {
    fn single(kind: ArtifactKind, payload: Payload) -> Self {
        Self {
            artifacts: vec![(kind, payload)],
            test_report: None,
        }
    }

    /// Failing test details, if the report has any failing verdict.
    #[must_use]
    pub fn test_failures(&self) -> Option<String> {
        self.test_report
            .as_ref()
            .filter(|report| !report.all_passed())
            .map(TestReport::failure_summary)
    }
}

/// Validates agent text against the schema of `stage`.
pub fn validate(stage: StageKind, text: &str) -> Result<ValidatedOutput, ValidationError> {
    let text = text.trim();
    let invalid = |message: &str| ValidationError::new(stage, message);

    match stage {
        StageKind::Requirements | StageKind::Review => {
            if text.is_empty() {
                return Err(invalid("empty document"));
            }
            let kind = if stage == StageKind::Requirements {
                ArtifactKind::RequirementsSpec
            } else {
                ArtifactKind::ReviewNotes
            };
            Ok(ValidatedOutput::single(kind, Payload::text(text)))
        }
        StageKind::Architecture => {
            if parse_modules(text).is_empty() {
                return Err(invalid(
                    "no module list found; expected MODULE: lines or a json modules block",
                ));
            }
            Ok(ValidatedOutput::single(
                ArtifactKind::ArchitectureDoc,
                Payload::text(text),
            ))
        }
        StageKind::Implementation => {
            let files = files_of(stage, text)?;
            if files.is_empty() {
                return Err(invalid("no FILE: sections found"));
            }
            Ok(ValidatedOutput::single(
                ArtifactKind::SourceFiles,
                Payload::from_files(&files),
            ))
        }
        StageKind::Testing => {
            let verdicts = parse_verdicts(text);
            if verdicts.is_empty() {
                return Err(invalid(
                    "no test verdicts found; expected TEST <name>: PASS|FAIL lines or a json tests block",
                ));
            }
            let files = files_of(stage, text)?;
            let report = TestReport::new(verdicts);
            let report_json = serde_json::to_value(&report)
                .map_err(|e| ValidationError::new(stage, e.to_string()))?;

            let mut artifacts = Vec::with_capacity(2);
            if !files.is_empty() {
                artifacts.push((ArtifactKind::TestFiles, Payload::from_files(&files)));
            }
            artifacts.push((ArtifactKind::TestReport, Payload::Json(report_json)));
            Ok(ValidatedOutput {
                artifacts,
                test_report: Some(report),
            })
        }
        StageKind::Documentation => {
            let mut files = files_of(stage, text)?;
            if files.is_empty() {
                if text.is_empty() {
                    return Err(invalid("empty documentation"));
                }
                files.insert("README.md".to_string(), text.to_string());
            }
            Ok(ValidatedOutput::single(
                ArtifactKind::Documentation,
                Payload::from_files(&files),
            ))
        }
    }
}

fn files_of(stage: StageKind, text: &str) -> Result<FileSet, ValidationError> {
    parse_file_sections(text)
        .map_err(|UnsafePath(path)| ValidationError::new(stage, format!("unsafe file path '{path}'")))
}
