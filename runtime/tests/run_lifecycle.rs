//! End-to-end run lifecycle through the file-backed engine.
//!
//! Drives a mission from start to terminal: issued steps, an input decision,
//! an audit checkpoint with an authority denial, and the event log left
//! behind.

use std::collections::BTreeMap;

use mission_runtime::core::error::RuntimeError;
use mission_runtime::core::mission::AuditStep;
use mission_runtime::core::policy::PolicySnapshot;
use mission_runtime::core::decision::AnswerRequest;
use mission_runtime::core::types::{ActorIdentity, ActorType, NextDecision, StepResult};
use mission_runtime::engine::{Engine, StartOptions, StepReport};
use mission_runtime::io::event_log::JsonlEventLog;
use mission_runtime::io::run_state::RunPaths;
use mission_runtime::test_support::{OWNER_ID, audit_step, mission, owner_inputs, prompt_step};

fn start_options(run_id: &str) -> StartOptions {
    StartOptions {
        run_id: run_id.to_string(),
        inputs: owner_inputs(OWNER_ID),
        actor: ActorIdentity::human(OWNER_ID),
        started_at: "2026-01-01T00:00:00Z".to_string(),
        template_source: None,
    }
}

fn report(step_id: &str, result: StepResult) -> Option<StepReport> {
    Some(StepReport {
        step_id: step_id.to_string(),
        result,
    })
}

fn answer(decision_id: &str, answer: &str, actor: ActorIdentity) -> AnswerRequest {
    AnswerRequest {
        decision_id: decision_id.to_string(),
        answer: answer.to_string(),
        actor,
        answered_at: "2026-01-01T00:05:00Z".to_string(),
        participants: Vec::new(),
    }
}

/// Full lifecycle:
///
/// ```text
/// a ──► b (requires input `target`) ──► review (blocking audit)
/// ```
///
/// Tests: step issue/complete, input decision and re-polling, authority
/// denial on the audit, approval, terminal, and the exact event log.
#[test]
fn full_lifecycle_reaches_terminal_with_audit_trail() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut b = prompt_step("b", &["a"]);
    b.requires_inputs = vec!["target".to_string()];
    let review: AuditStep = audit_step("review", &["b"], true);
    let template = mission(vec![prompt_step("a", &[]), b], vec![review]);

    let mut engine = Engine::new(temp.path());
    let run = engine
        .start_run(
            &template,
            &PolicySnapshot::default(),
            start_options("run-1"),
        )
        .expect("start")
        .run_id;

    let first = engine
        .next(&run, None, BTreeMap::new(), "t1")
        .expect("next");
    assert_eq!(first.step_id(), Some("a"));

    let input = engine
        .next(
            &run,
            report("a", StepResult::Success),
            BTreeMap::new(),
            "t2",
        )
        .expect("next");
    assert_eq!(input.decision_id(), Some("input:target"));
    let again = engine
        .next(&run, None, BTreeMap::new(), "t3")
        .expect("next");
    assert_eq!(again, input);

    engine
        .answer(
            &run,
            &answer("input:target", "staging", ActorIdentity::human(OWNER_ID)),
        )
        .expect("answer input");
    let step_b = engine
        .next(&run, None, BTreeMap::new(), "t4")
        .expect("next");
    match &step_b {
        NextDecision::Step { step_id, context, .. } => {
            assert_eq!(step_id, "b");
            assert_eq!(
                context.inputs.get("target").and_then(|v| v.as_str()),
                Some("staging")
            );
        }
        other => panic!("expected step b, got {other:?}"),
    }

    let gate = engine
        .next(
            &run,
            report("b", StepResult::Success),
            BTreeMap::new(),
            "t5",
        )
        .expect("next");
    assert_eq!(gate.decision_id(), Some("audit:review"));

    let err = engine
        .answer(
            &run,
            &answer(
                "audit:review",
                "approve",
                ActorIdentity::new(ActorType::Llm, "agent-7"),
            ),
        )
        .expect_err("llm cannot approve");
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::AuthorityDenied(_))
    ));
    assert!(engine.show(&run).expect("show").snapshot.is_pending("audit:review"));

    engine
        .answer(
            &run,
            &answer("audit:review", "approve", ActorIdentity::human(OWNER_ID)),
        )
        .expect("approve");
    let done = engine
        .next(&run, None, BTreeMap::new(), "t6")
        .expect("next");
    assert!(matches!(done, NextDecision::Terminal { .. }));
    engine
        .next(&run, None, BTreeMap::new(), "t7")
        .expect("next");

    let log = JsonlEventLog::new(RunPaths::new(temp.path(), &run).events_path);
    let records = log.read_all().expect("read log");
    let approval = &records[10];
    assert_eq!(approval.event_type, "StepCompleted");
    assert_eq!(approval.payload["actor"]["actor_id"], OWNER_ID);
    assert_eq!(records[1].payload["actor"]["actor_type"], "llm");
    let types: Vec<String> = records
        .into_iter()
        .map(|record| record.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            "MissionRunStarted",
            "NextStepIssued",
            "StepCompleted",
            "DecisionInputRequested",
            "DecisionInputAnswered",
            "NextStepIssued",
            "StepCompleted",
            "DecisionInputRequested",
            "DecisionAuthorityDenied",
            "DecisionInputAnswered",
            "StepCompleted",
            "MissionRunCompleted",
        ]
    );
}

#[test]
fn failed_step_blocks_run_permanently() {
    let temp = tempfile::tempdir().expect("tempdir");
    let template = mission(
        vec![prompt_step("a", &[]), prompt_step("b", &["a"])],
        Vec::new(),
    );
    let mut engine = Engine::new(temp.path());
    let run = engine
        .start_run(
            &template,
            &PolicySnapshot::default(),
            start_options("run-1"),
        )
        .expect("start")
        .run_id;

    engine
        .next(&run, None, BTreeMap::new(), "t1")
        .expect("next");
    let blocked = engine
        .next(&run, report("a", StepResult::Failed), BTreeMap::new(), "t2")
        .expect("next");
    assert_eq!(
        blocked,
        NextDecision::Blocked {
            reason: "Previous step 'a' failed; manual intervention required.".to_string()
        }
    );
    let still = engine
        .next(&run, None, BTreeMap::new(), "t3")
        .expect("next");
    assert_eq!(still, blocked);
}

#[test]
fn reporting_a_step_that_was_not_issued_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let template = mission(
        vec![prompt_step("a", &[]), prompt_step("b", &["a"])],
        Vec::new(),
    );
    let mut engine = Engine::new(temp.path());
    let run = engine
        .start_run(
            &template,
            &PolicySnapshot::default(),
            start_options("run-1"),
        )
        .expect("start")
        .run_id;
    engine
        .next(&run, None, BTreeMap::new(), "t1")
        .expect("next");

    let err = engine
        .next(
            &run,
            report("b", StepResult::Success),
            BTreeMap::new(),
            "t2",
        )
        .expect_err("b not issued");
    assert!(matches!(
        err.downcast_ref::<RuntimeError>(),
        Some(RuntimeError::StepNotIssued { .. })
    ));
    let snapshot = engine.show(&run).expect("show").snapshot;
    assert_eq!(snapshot.issued_step_id.as_deref(), Some("a"));
    assert!(snapshot.completed_steps.is_empty());
}

#[test]
fn missing_mission_owner_fails_closed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let template = mission(vec![prompt_step("a", &[])], Vec::new());
    let mut engine = Engine::new(temp.path());
    let mut options = start_options("run-1");
    options.inputs.clear();
    let run = engine
        .start_run(&template, &PolicySnapshot::default(), options)
        .expect("start")
        .run_id;

    let err = engine
        .next(&run, None, BTreeMap::new(), "t1")
        .expect_err("owner unresolved");
    match err.downcast_ref::<RuntimeError>() {
        Some(RuntimeError::UnresolvedRole(escalation)) => {
            assert_eq!(escalation.step_id, "a");
            assert_eq!(
                escalation.resolution_hint,
                "Provide 'mission_owner_id' in mission inputs"
            );
        }
        other => panic!("expected unresolved role, got {other:?}"),
    }
    assert_eq!(
        engine.show(&run).expect("show").snapshot.issued_step_id,
        None
    );
}

#[test]
fn start_suffixes_taken_run_ids() {
    let temp = tempfile::tempdir().expect("tempdir");
    let template = mission(vec![prompt_step("a", &[])], Vec::new());
    let mut engine = Engine::new(temp.path());
    let first = engine
        .start_run(
            &template,
            &PolicySnapshot::default(),
            start_options("run-1"),
        )
        .expect("start");
    let second = engine
        .start_run(
            &template,
            &PolicySnapshot::default(),
            start_options("run-1"),
        )
        .expect("start");
    assert_eq!(first.run_id, "run-1");
    assert_ne!(second.run_id, first.run_id);
    assert!(second.run_id.starts_with("run-1"));
}
