//! File-backed mission run lifecycle.
//!
//! The engine is the host around the deterministic core: it loads a run from
//! the store, applies one core transition, writes the new snapshot back
//! atomically, and appends the transition's events to the run's
//! `events.jsonl` and to a caller-supplied sink.
//!
//! Callers must serialize writes to a given run; the engine takes no locks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::decision::{AnswerRequest, answer_decision};
use crate::core::error::RuntimeError;
use crate::core::escalation::{TimeoutEscalationResult, notify_timeout};
use crate::core::events::{EventSink, NullSink, RunStartedPayload, RuntimeEvent};
use crate::core::invariants::validate_mission;
use crate::core::mission::{MissionTemplate, StepRef};
use crate::core::planner::{complete_step, plan, run_completed_event};
use crate::core::policy::PolicySnapshot;
use crate::core::snapshot::RunSnapshot;
use crate::core::types::{ActorIdentity, NextDecision, StepResult};
use crate::io::event_log::JsonlEventLog;
use crate::io::mission_store::mission_digest;
use crate::io::run_state::{
    RunPaths, StoredRun, create_run, load_run, unique_run_id, write_snapshot,
};

/// Reason returned while the mission file differs from the one the run
/// started from.
pub const TEMPLATE_DRIFT_REASON: &str = "Template changed during active run. Migration required.";

/// Options for starting a run.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Preferred run id; a numeric suffix is appended if it is taken.
    pub run_id: String,
    /// Initial inputs (mission owner, agent id, context values).
    pub inputs: BTreeMap<String, Value>,
    pub actor: ActorIdentity,
    pub started_at: String,
    /// Mission file `template` was loaded from. When set, its digest is
    /// recorded and `next` blocks once the file changes.
    pub template_source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
}

/// Host report for the issued step, applied before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step_id: String,
    pub result: StepResult,
}

pub struct Engine<S: EventSink = NullSink> {
    store: PathBuf,
    sink: S,
}

impl Engine<NullSink> {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self::with_sink(store, NullSink)
    }
}

impl<S: EventSink> Engine<S> {
    pub fn with_sink(store: impl Into<PathBuf>, sink: S) -> Self {
        Self {
            store: store.into(),
            sink,
        }
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Validate `template` and `policy`, then create a run with a frozen copy
    /// of both.
    pub fn start_run(
        &mut self,
        template: &MissionTemplate,
        policy: &PolicySnapshot,
        options: StartOptions,
    ) -> Result<StartOutcome> {
        policy.validate()?;
        let errors = validate_mission(template, &policy.routing_table()?);
        if !errors.is_empty() {
            return Err(RuntimeError::InvalidMission(errors).into());
        }

        let run_id = unique_run_id(&self.store, &options.run_id)?;
        let mut snapshot = RunSnapshot::new(run_id.clone(), template.mission.key.clone())
            .with_inputs(options.inputs);
        if let Some(source) = options.template_source {
            let hash = mission_digest(&source)?;
            snapshot = snapshot.with_template_source(source, hash);
        }
        let paths = create_run(
            &self.store,
            &StoredRun {
                snapshot,
                template: template.clone(),
                policy: policy.clone(),
            },
        )?;

        let event = RuntimeEvent::MissionRunStarted(RunStartedPayload {
            run_id: run_id.clone(),
            mission_key: template.mission.key.clone(),
            actor: options.actor,
        });
        self.emit_all(&paths, &options.started_at, &[event])?;
        info!(run_id = %run_id, mission_key = %template.mission.key, "run started");
        Ok(StartOutcome {
            run_id,
            run_dir: paths.dir,
        })
    }

    /// Apply an optional step report and context inputs, then plan the next
    /// decision and persist it.
    pub fn next(
        &mut self,
        run_id: &str,
        report: Option<StepReport>,
        context: BTreeMap<String, Value>,
        at: &str,
    ) -> Result<NextDecision> {
        let (paths, run) = load_run(&self.store, run_id)?;
        let mut events = Vec::new();
        let mut snapshot = run.snapshot.with_inputs(context);

        if let Some(report) = report {
            let (completed, event) = complete_step(snapshot, &report.step_id, report.result)?;
            snapshot = completed;
            events.push(event);
        }

        if !snapshot.is_blocked() && template_drifted(&snapshot)? {
            warn!(run_id, "mission file changed since the run started");
            self.persist(&paths, &snapshot, at, &events)?;
            return Ok(NextDecision::Blocked {
                reason: TEMPLATE_DRIFT_REASON.to_string(),
            });
        }

        let planned = match plan(&run.template, snapshot.clone(), &run.policy) {
            Ok(planned) => planned,
            Err(err) => {
                // Keep the step report even when planning fails closed.
                self.persist(&paths, &snapshot, at, &events)?;
                return Err(err.into());
            }
        };

        events.extend(planned.events);
        if matches!(planned.decision, NextDecision::Terminal { .. })
            && !completion_logged(&paths)?
        {
            events.push(run_completed_event(&planned.snapshot));
        }

        self.persist(&paths, &planned.snapshot, at, &events)?;
        debug!(
            run_id,
            kind = planned.decision.kind(),
            "planned next decision"
        );
        Ok(planned.decision)
    }

    /// Answer a pending decision. Authority denials are appended to the event
    /// log before the error is returned; the snapshot is left untouched.
    pub fn answer(&mut self, run_id: &str, request: &AnswerRequest) -> Result<RunSnapshot> {
        let (paths, run) = load_run(&self.store, run_id)?;
        match answer_decision(run.snapshot, request) {
            Ok(answered) => {
                self.persist(
                    &paths,
                    &answered.snapshot,
                    &request.answered_at,
                    &answered.events,
                )?;
                Ok(answered.snapshot)
            }
            Err(RuntimeError::AuthorityDenied(denial)) => {
                let event = RuntimeEvent::DecisionAuthorityDenied((*denial).clone());
                self.emit_all(&paths, &request.answered_at, &[event])?;
                Err(RuntimeError::AuthorityDenied(denial).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Record a host-reported timeout for a significance gate and return the
    /// escalation for out-of-band delivery.
    pub fn notify_timeout(
        &mut self,
        run_id: &str,
        decision_id: &str,
        actor: &ActorIdentity,
        at: &str,
    ) -> Result<TimeoutEscalationResult> {
        let (paths, run) = load_run(&self.store, run_id)?;
        let per_decision = decision_timeout(&run.template, decision_id);
        let timeout = run.policy.timeout_policy(per_decision)?;
        let (result, snapshot) = notify_timeout(run.snapshot, decision_id, actor, &timeout, at)?;
        let event = RuntimeEvent::DecisionTimeoutExpired(result.timeout_expired_payload.clone());
        self.persist(&paths, &snapshot, at, &[event])?;
        info!(
            run_id,
            decision_id,
            band = %result.band,
            targets = result.escalation_targets.len(),
            "timeout escalation recorded"
        );
        Ok(result)
    }

    /// Load the stored run without changing it.
    pub fn show(&self, run_id: &str) -> Result<StoredRun> {
        let (_, run) = load_run(&self.store, run_id)?;
        Ok(run)
    }

    fn persist(
        &mut self,
        paths: &RunPaths,
        snapshot: &RunSnapshot,
        at: &str,
        events: &[RuntimeEvent],
    ) -> Result<()> {
        let errors = snapshot.check();
        if !errors.is_empty() {
            bail!(
                "refusing to persist inconsistent run state:\n- {}",
                errors.join("\n- ")
            );
        }
        write_snapshot(&paths.state_path, snapshot)?;
        self.emit_all(paths, at, events)
    }

    fn emit_all(&mut self, paths: &RunPaths, at: &str, events: &[RuntimeEvent]) -> Result<()> {
        let mut log = JsonlEventLog::new(&paths.events_path);
        for event in events {
            log.emit(at, event)?;
            self.sink.emit(at, event)?;
        }
        Ok(())
    }
}

/// True once the run's log already announces completion.
fn completion_logged(paths: &RunPaths) -> Result<bool> {
    let records = JsonlEventLog::new(&paths.events_path).read_all()?;
    Ok(records
        .iter()
        .any(|record| record.event_type == "MissionRunCompleted"))
}

/// True when the recorded mission file still exists and its bytes changed.
fn template_drifted(snapshot: &RunSnapshot) -> Result<bool> {
    let (Some(path), Some(recorded)) = (&snapshot.template_path, &snapshot.template_hash) else {
        return Ok(false);
    };
    if !path.exists() {
        return Ok(false);
    }
    Ok(mission_digest(path)? != *recorded)
}

/// Per-gate timeout declared on the audit step behind `decision_id`.
fn decision_timeout(template: &MissionTemplate, decision_id: &str) -> Option<i64> {
    let step_id = decision_id.strip_prefix("audit:")?;
    match template.find_step(step_id)? {
        StepRef::Audit(step) => step.significance.as_ref()?.timeout_seconds,
        StepRef::Ordinary(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::CollectingSink;
    use crate::io::mission_store::write_mission;
    use crate::test_support::{OWNER_ID, mission, owner_inputs, prompt_step};

    fn options() -> StartOptions {
        StartOptions {
            run_id: "run-test".to_string(),
            inputs: owner_inputs(OWNER_ID),
            actor: ActorIdentity::human(OWNER_ID),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            template_source: None,
        }
    }

    #[test]
    fn start_rejects_invalid_mission() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut engine = Engine::new(temp.path());
        let template = mission(vec![prompt_step("a", &["missing"])], Vec::new());
        let err = engine
            .start_run(&template, &PolicySnapshot::default(), options())
            .expect_err("invalid");
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::InvalidMission(_))
        ));
        assert!(!temp.path().join("run-test").exists());
    }

    #[test]
    fn next_issues_then_completes_to_terminal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut engine = Engine::with_sink(temp.path(), CollectingSink::default());
        let template = mission(vec![prompt_step("a", &[])], Vec::new());
        let started = engine
            .start_run(&template, &PolicySnapshot::default(), options())
            .expect("start");

        let first = engine
            .next(&started.run_id, None, BTreeMap::new(), "t1")
            .expect("next");
        assert_eq!(first.step_id(), Some("a"));

        let report = StepReport {
            step_id: "a".to_string(),
            result: StepResult::Success,
        };
        let done = engine
            .next(&started.run_id, Some(report), BTreeMap::new(), "t2")
            .expect("next");
        assert!(matches!(done, NextDecision::Terminal { .. }));

        let again = engine
            .next(&started.run_id, None, BTreeMap::new(), "t3")
            .expect("next");
        assert_eq!(again, done);
        assert_eq!(
            engine.sink().event_types(),
            vec![
                "MissionRunStarted",
                "NextStepIssued",
                "StepCompleted",
                "MissionRunCompleted"
            ]
        );
    }

    #[test]
    fn edited_mission_file_blocks_next() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("mission.json");
        let template = mission(
            vec![prompt_step("a", &[]), prompt_step("b", &["a"])],
            Vec::new(),
        );
        write_mission(&source, &template).expect("write mission");

        let mut engine = Engine::new(temp.path().join("runs"));
        let started = engine
            .start_run(
                &template,
                &PolicySnapshot::default(),
                StartOptions {
                    template_source: Some(source.clone()),
                    ..options()
                },
            )
            .expect("start");
        let run = started.run_id;
        let snapshot = engine.show(&run).expect("show").snapshot;
        assert_eq!(snapshot.template_path.as_deref(), Some(source.as_path()));
        assert_eq!(snapshot.template_hash.as_ref().map(String::len), Some(64));

        let first = engine
            .next(&run, None, BTreeMap::new(), "t1")
            .expect("next");
        assert_eq!(first.step_id(), Some("a"));

        let edited = mission(vec![prompt_step("a", &[])], Vec::new());
        write_mission(&source, &edited).expect("rewrite mission");
        let report = StepReport {
            step_id: "a".to_string(),
            result: StepResult::Success,
        };
        let blocked = engine
            .next(&run, Some(report), BTreeMap::new(), "t2")
            .expect("next");
        assert_eq!(
            blocked,
            NextDecision::Blocked {
                reason: TEMPLATE_DRIFT_REASON.to_string()
            }
        );
        let snapshot = engine.show(&run).expect("show").snapshot;
        assert!(snapshot.is_completed("a"));
        assert!(!snapshot.is_blocked());

        write_mission(&source, &template).expect("restore mission");
        let resumed = engine
            .next(&run, None, BTreeMap::new(), "t3")
            .expect("next");
        assert_eq!(resumed.step_id(), Some("b"));
    }

    #[test]
    fn missing_mission_file_is_not_drift() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("mission.json");
        let template = mission(vec![prompt_step("a", &[])], Vec::new());
        write_mission(&source, &template).expect("write mission");

        let mut engine = Engine::new(temp.path().join("runs"));
        let run = engine
            .start_run(
                &template,
                &PolicySnapshot::default(),
                StartOptions {
                    template_source: Some(source.clone()),
                    ..options()
                },
            )
            .expect("start")
            .run_id;
        std::fs::remove_file(&source).expect("remove mission");
        let next = engine
            .next(&run, None, BTreeMap::new(), "t1")
            .expect("next");
        assert_eq!(next.step_id(), Some("a"));
    }

    #[test]
    fn decision_timeout_reads_gate_override() {
        let mut gate = crate::test_support::significant_audit(
            "gate",
            &[],
            crate::test_support::dimension_scores(8),
            &[],
        );
        if let Some(significance) = gate.significance.as_mut() {
            significance.timeout_seconds = Some(45);
        }
        let template = mission(Vec::new(), vec![gate]);
        assert_eq!(decision_timeout(&template, "audit:gate"), Some(45));
        assert_eq!(decision_timeout(&template, "input:gate"), None);
        assert_eq!(decision_timeout(&template, "audit:missing"), None);
    }
}
