//! End-to-end workflow tests over scripted agents.

#[cfg(test)]
mod tests {
    use crate::agents::{AgentAdapter, AgentRegistry};
    use crate::core::{
        ArtifactKind, RequestOptions, RunStatus, StageKind, StageStatus, ToolCallRecord,
    };
    use crate::errors::AgentError;
    use crate::events::{names, CollectingEventSink};
    use crate::session::RunSession;
    use crate::store::ArtifactStore;
    use crate::testing::{
        assert_iterations_increase, assert_run_completed, assert_run_status,
        assert_stage_not_run, assert_trace, assert_within_revision_budget, fixtures,
        FailingAgent, ScriptedAgent,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    use StageKind::{Architecture, Documentation, Implementation, Requirements, Review, Testing};
    use StageStatus::{Cancelled, Failure, NeedsRevision, Success};

    fn log_search(ctx: &crate::agents::AgentContext) {
        ctx.record_tool_call(ToolCallRecord {
            stage: ctx.stage,
            tool: "web_search".into(),
            call_id: None,
            ok: true,
            error: None,
            duration_ms: 5,
            truncated: false,
        });
    }

    async fn run_with(
        agent: &Arc<ScriptedAgent>,
        options: RequestOptions,
    ) -> crate::core::RunOutcome {
        RunSession::new(fixtures::calculator_request_with(options), fixtures::registry_of(agent))
            .unwrap()
            .run()
            .await
    }

    #[tokio::test]
    async fn test_testing_failure_loops_back_to_implementation() {
        let agent = Arc::new(
            ScriptedAgent::new()
                .with_response(Testing, fixtures::FAILING_TEST_REPORT)
                .with_response(Testing, fixtures::PASSING_TEST_REPORT),
        );

        let outcome = run_with(&agent, RequestOptions::new()).await;

        assert_run_completed(&outcome);
        assert_trace(
            &outcome,
            &[
                (Requirements, Success),
                (Architecture, Success),
                (Implementation, Success),
                (Testing, Failure),
                (Implementation, Success),
                (Testing, Success),
                (Documentation, Success),
                (Review, Success),
            ],
        );
        assert_eq!(outcome.iteration_counts.get(&Implementation), Some(&1));
        assert_eq!(outcome.iteration_counts.get(&Testing), Some(&0));
        assert_iterations_increase(&outcome.trace);

        let implementation: Vec<_> = agent
            .invocations()
            .into_iter()
            .filter(|inv| inv.stage == Implementation)
            .collect();
        assert_eq!(implementation.len(), 2);
        assert!(implementation[0].diagnostics.is_empty());
        assert_eq!(implementation[1].iteration, 2);
        assert!(implementation[1].diagnostics[0].contains("FAILED test_div_by_zero"));
        assert!(implementation[1].inputs.contains(&ArtifactKind::TestReport));
    }

    #[tokio::test]
    async fn test_final_artifacts_of_completed_run() {
        let agent = Arc::new(ScriptedAgent::new());
        let outcome = run_with(&agent, RequestOptions::new()).await;

        assert_run_completed(&outcome);
        let files = &outcome.final_artifacts.files;
        assert!(files.contains_key("calc/ops.py"));
        assert!(files.contains_key("tests/test_ops.py"));
        assert!(files.contains_key("README.md"));
        assert!(outcome.final_artifacts.test_report.is_some());
        assert!(outcome
            .final_artifacts
            .get(ArtifactKind::ReviewNotes)
            .is_some());
    }

    #[tokio::test]
    async fn test_permanent_error_aborts_before_implementation() {
        let scripted: Arc<dyn AgentAdapter> = Arc::new(ScriptedAgent::new());
        let failing = Arc::new(FailingAgent::permanent("malformed response after repair"));
        let agents = AgentRegistry::uniform(scripted)
            .with_agent(Architecture, Arc::clone(&failing) as Arc<dyn AgentAdapter>);

        let outcome = RunSession::new(fixtures::calculator_request(), agents)
            .unwrap()
            .run()
            .await;

        assert_run_status(&outcome, RunStatus::Aborted);
        assert_stage_not_run(&outcome, Implementation);
        assert_eq!(failing.call_count(), 1);
        assert_eq!(
            outcome.final_artifacts.kinds(),
            vec![ArtifactKind::RequirementsSpec]
        );
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_zero_revision_budget_aborts_on_first_failure() {
        let agent = Arc::new(ScriptedAgent::new().with_response(Architecture, "Prose only."));
        let outcome = run_with(
            &agent,
            RequestOptions::new().with_max_iterations_per_stage(0),
        )
        .await;

        assert_run_status(&outcome, RunStatus::Aborted);
        assert_trace(&outcome, &[(Requirements, Success), (Architecture, NeedsRevision)]);
        assert_eq!(agent.invocation_count(Architecture), 1);
    }

    #[tokio::test]
    async fn test_stage_budget_exhaustion_is_budget_exceeded() {
        let agent = Arc::new(ScriptedAgent::new().with_response(Testing, fixtures::FAILING_TEST_REPORT));
        let outcome = run_with(
            &agent,
            RequestOptions::new().with_max_iterations_per_stage(2),
        )
        .await;

        assert_run_status(&outcome, RunStatus::BudgetExceeded);
        assert_within_revision_budget(&outcome, 2);
        assert_eq!(outcome.iteration_counts.get(&Implementation), Some(&2));
        // Three implementation attempts ran; the fourth was refused.
        assert_eq!(agent.invocation_count(Implementation), 3);
        assert_eq!(agent.invocation_count(Testing), 3);
        let last = outcome.trace.last().unwrap();
        assert_eq!(last.stage, Implementation);
        assert_eq!(last.status, Failure);
        assert_eq!(last.iteration, 4);
        assert_iterations_increase(&outcome.trace);
    }

    #[tokio::test]
    async fn test_run_budget_exhaustion_is_budget_exceeded() {
        let agent = Arc::new(ScriptedAgent::new());
        let outcome = run_with(
            &agent,
            RequestOptions::new().with_max_total_iterations(3),
        )
        .await;

        assert_run_status(&outcome, RunStatus::BudgetExceeded);
        assert_eq!(agent.invocations().len(), 3);
        assert_eq!(
            outcome.stage_sequence(),
            vec![Requirements, Architecture, Implementation, Testing]
        );
        assert_stage_not_run(&outcome, Documentation);
    }

    #[tokio::test]
    async fn test_cancellation_between_implementation_and_testing() {
        let agent = Arc::new(ScriptedAgent::new().with_hook(Implementation, |ctx| {
            ctx.cancel.cancel("operator stop");
        }));
        let sink = Arc::new(CollectingEventSink::new());
        let session = RunSession::builder(fixtures::calculator_request(), fixtures::registry_of(&agent))
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = session.run().await;

        assert_run_status(&outcome, RunStatus::Aborted);
        assert!(outcome.cancelled);
        assert_eq!(outcome.reason.as_deref(), Some("operator stop"));
        assert_trace(
            &outcome,
            &[
                (Requirements, Success),
                (Architecture, Success),
                (Implementation, Success),
                (Testing, Cancelled),
            ],
        );
        assert_eq!(agent.invocation_count(Testing), 0);
        assert!(outcome
            .final_artifacts
            .get(ArtifactKind::SourceFiles)
            .is_some());
        assert_eq!(sink.types().last().map(String::as_str), Some(names::RUN_CANCELLED));
    }

    #[tokio::test]
    async fn test_cancellation_from_another_task() {
        let agent = Arc::new(ScriptedAgent::new().with_delay(Duration::from_millis(30)));
        let session = RunSession::new(fixtures::calculator_request(), fixtures::registry_of(&agent))
            .unwrap();
        let handle = session.cancellation_handle();

        let run = tokio::spawn(session.run());
        tokio::time::sleep(Duration::from_millis(45)).await;
        handle.cancel("shutdown");
        let outcome = run.await.unwrap();

        assert!(outcome.cancelled);
        assert_run_status(&outcome, RunStatus::Aborted);
        assert_eq!(outcome.trace.last().unwrap().status, Cancelled);
        assert!(outcome.trace.len() < StageKind::ALL.len());
    }

    #[tokio::test]
    async fn test_transient_stage_failure_is_revised() {
        let agent = Arc::new(
            ScriptedAgent::new()
                .with_error(Review, AgentError::transient("429 rate limited"))
                .with_response(Review, fixtures::REVIEW),
        );
        let outcome = run_with(&agent, RequestOptions::new()).await;

        assert_run_completed(&outcome);
        assert_eq!(outcome.iteration_counts.get(&Review), Some(&1));
        let review: Vec<_> = outcome.trace.iter().filter(|r| r.stage == Review).collect();
        assert_eq!(review.len(), 2);
        assert_eq!(review[0].status, Failure);
        assert!(review[0].diagnostics.contains("429"));
    }

    #[tokio::test]
    async fn test_parallel_sessions_share_nothing() {
        let failing = Arc::new(ScriptedAgent::new().with_response(Testing, fixtures::FAILING_TEST_REPORT));
        let passing = Arc::new(ScriptedAgent::new());

        let (a, b) = tokio::join!(
            run_with(&failing, RequestOptions::new().with_max_iterations_per_stage(1)),
            run_with(&passing, RequestOptions::new()),
        );

        assert_run_status(&a, RunStatus::BudgetExceeded);
        assert_run_completed(&b);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(b.trace.len(), StageKind::ALL.len());
        assert!(b.trace.iter().all(|r| r.iteration == 1));
    }

    #[tokio::test]
    async fn test_store_log_replays_run() {
        let agent = Arc::new(
            ScriptedAgent::new()
                .with_response(Testing, fixtures::FAILING_TEST_REPORT)
                .with_response(Testing, fixtures::PASSING_TEST_REPORT),
        );
        let session = RunSession::new(fixtures::calculator_request(), fixtures::registry_of(&agent))
            .unwrap();
        let store = session.store();
        let outcome = session.run().await;
        assert_run_completed(&outcome);

        let mut log = Vec::new();
        store.export_log(&mut log).unwrap();
        let replayed = ArtifactStore::replay(log.as_slice()).unwrap();

        assert_eq!(replayed.len(), store.len());
        for result in &outcome.trace {
            for reference in &result.produced_artifacts {
                assert_eq!(
                    replayed.get(reference).unwrap().payload,
                    store.get(reference).unwrap().payload
                );
            }
        }
    }

    #[tokio::test]
    async fn test_trace_keeps_tool_calls_of_every_outcome() {
        let agent = Arc::new(
            ScriptedAgent::new()
                .with_hook(Requirements, log_search)
                .with_hook(Architecture, log_search)
                .with_error(Architecture, AgentError::permanent("400 bad request")),
        );
        let outcome = run_with(&agent, RequestOptions::new()).await;

        assert_run_status(&outcome, RunStatus::Aborted);
        assert_trace(&outcome, &[(Requirements, Success), (Architecture, Failure)]);
        for result in &outcome.trace {
            assert_eq!(result.tool_calls.len(), 1, "{}", result.stage);
            assert_eq!(result.tool_calls[0].stage, result.stage);
        }
    }

    #[tokio::test]
    async fn test_unclosed_fence_is_revised_not_fatal() {
        let agent = Arc::new(
            ScriptedAgent::new().with_response(Implementation, "FILE: calc/ops.py\n````\n"),
        );
        let outcome = run_with(
            &agent,
            RequestOptions::new().with_max_iterations_per_stage(0),
        )
        .await;

        assert_run_status(&outcome, RunStatus::Aborted);
        assert_trace(
            &outcome,
            &[
                (Requirements, Success),
                (Architecture, Success),
                (Implementation, NeedsRevision),
            ],
        );
        assert!(outcome.trace[2].diagnostics.contains("FILE:"));
    }
}
