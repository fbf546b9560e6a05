//! Test assertions for run outcomes and traces.

use crate::core::{RunOutcome, RunStatus, StageKind, StageResult, StageStatus};

/// Asserts that the run ended with `expected`.
pub fn assert_run_status(outcome: &RunOutcome, expected: RunStatus) {
    assert_eq!(
        outcome.status, expected,
        "Expected run status {:?}, got {:?} (reason: {:?})",
        expected, outcome.status, outcome.reason
    );
}

/// Asserts that the run completed.
pub fn assert_run_completed(outcome: &RunOutcome) {
    assert_run_status(outcome, RunStatus::Completed);
    assert!(!outcome.cancelled, "Completed run flagged as cancelled");
}

/// Asserts the trace's stage/status sequence.
pub fn assert_trace(outcome: &RunOutcome, expected: &[(StageKind, StageStatus)]) {
    let actual: Vec<(StageKind, StageStatus)> =
        outcome.trace.iter().map(|r| (r.stage, r.status)).collect();
    assert_eq!(
        actual, expected,
        "Trace mismatch.\n  actual:   {actual:?}\n  expected: {expected:?}"
    );
}

/// Asserts that each stage's attempt numbers in the trace strictly increase.
pub fn assert_iterations_increase(trace: &[StageResult]) {
    for stage in StageKind::ALL {
        let iterations: Vec<u32> = trace
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.iteration)
            .collect();
        assert!(
            iterations.windows(2).all(|pair| pair[0] < pair[1]),
            "Iterations of {stage} do not increase: {iterations:?}"
        );
    }
}

/// Asserts that `stage` never appears in the trace.
pub fn assert_stage_not_run(outcome: &RunOutcome, stage: StageKind) {
    assert!(
        outcome.trace.iter().all(|r| r.stage != stage),
        "Expected {stage} not to run, trace: {:?}",
        outcome.stage_sequence()
    );
}

/// Asserts that no stage exceeded `max` revisions.
pub fn assert_within_revision_budget(outcome: &RunOutcome, max: u32) {
    for (stage, count) in &outcome.iteration_counts {
        assert!(
            *count <= max,
            "{stage} used {count} revisions, budget is {max}"
        );
    }
}
