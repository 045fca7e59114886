//! Deterministic step planner.
//!
//! Given a mission definition, a run snapshot and the policy in force, the
//! planner produces exactly one [`NextDecision`] plus the snapshot that
//! records it (issued step, new pending request, RACI binding, significance
//! evaluation, low-band auto-completions).
//!
//! Order of checks:
//! 1. `blocked_reason` set: `Blocked`, always.
//! 2. Any pending decision: re-emit the request with the smallest id.
//! 3. An issued step not yet reported complete: re-emit it.
//! 4. Walk ordinary steps then audit steps in template order, skipping
//!    completed steps and steps with unmet dependencies. The first remaining
//!    step is the candidate.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::core::error::RuntimeError;
use crate::core::events::{
    DecisionRequestedPayload, RunCompletedPayload, RuntimeEvent, SignificanceEvaluatedPayload,
    StepCompletedPayload, StepIssuedPayload,
};
use crate::core::mission::{
    AuditStep, MissionTemplate, OrdinaryStep, SignificanceDeclaration, StepRef, input_decision_id,
};
use crate::core::policy::{BandName, MAX_COMPOSITE_SCORE, PolicySnapshot, RoutingTable};
use crate::core::raci::{RaciBinding, agent_identity, resolve_raci};
use crate::core::significance::{SignificanceScore, evaluate_with_table};
use crate::core::snapshot::{LedgerKey, RunSnapshot};
use crate::core::types::{DecisionRequest, NextDecision, StepContext, StepResult};

pub const BINARY_OPTIONS: [&str; 2] = ["approve", "reject"];
pub const SOFT_GATE_OPTIONS: [&str; 3] = ["decide_solo", "open_stand_up", "defer"];

pub const TERMINAL_REASON: &str = "All mission steps completed";
pub const UNSCHEDULABLE_REASON: &str =
    "No eligible steps: remaining steps have unmet dependencies.";

/// Planner output: the decision, the snapshot recording it, and the events
/// the transition produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub decision: NextDecision,
    pub snapshot: RunSnapshot,
    pub events: Vec<RuntimeEvent>,
}

/// Decide what happens next. Pure: identical inputs give identical plans.
pub fn plan(
    template: &MissionTemplate,
    snapshot: RunSnapshot,
    policy: &PolicySnapshot,
) -> Result<Plan, RuntimeError> {
    let table = policy.routing_table()?;
    Planner {
        template,
        table,
        snapshot,
        events: Vec::new(),
    }
    .run()
}

/// Decision-only view of [`plan`].
pub fn plan_next(
    template: &MissionTemplate,
    snapshot: &RunSnapshot,
    policy: &PolicySnapshot,
) -> Result<NextDecision, RuntimeError> {
    Ok(plan(template, snapshot.clone(), policy)?.decision)
}

struct Planner<'a> {
    template: &'a MissionTemplate,
    table: RoutingTable,
    snapshot: RunSnapshot,
    events: Vec<RuntimeEvent>,
}

impl<'a> Planner<'a> {
    fn run(mut self) -> Result<Plan, RuntimeError> {
        if let Some(reason) = &self.snapshot.blocked_reason {
            let decision = NextDecision::Blocked {
                reason: reason.clone(),
            };
            return Ok(self.finish(decision));
        }

        if let Some(request) = self.snapshot.first_pending() {
            debug!(decision_id = %request.decision_id, "re-emitting pending decision");
            let decision = request.to_decision();
            return Ok(self.finish(decision));
        }

        if let Some(issued) = self.snapshot.issued_step_id.clone() {
            let step = self
                .template
                .find_step(&issued)
                .ok_or_else(|| RuntimeError::UnknownStep(issued.clone()))?;
            debug!(step_id = %issued, "re-emitting issued step");
            return self.issue(step);
        }

        loop {
            let Some(step) = self.next_eligible() else {
                return Ok(self.exhausted());
            };
            match step {
                StepRef::Ordinary(ordinary) => return self.ordinary(ordinary),
                StepRef::Audit(audit) if !audit.is_blocking() => return self.issue(step),
                StepRef::Audit(audit) => {
                    if let Some(decision) = self.gate(audit)? {
                        return Ok(self.finish(decision));
                    }
                    // Low-band gate auto-completed; later steps may now be eligible.
                }
            }
        }
    }

    fn finish(self, decision: NextDecision) -> Plan {
        Plan {
            decision,
            snapshot: self.snapshot,
            events: self.events,
        }
    }

    /// Earliest step in the combined sequence that is not completed and
    /// whose dependencies are all completed.
    fn next_eligible(&self) -> Option<StepRef<'a>> {
        self.template.sequence().into_iter().find(|step| {
            !self.snapshot.is_completed(step.id())
                && step
                    .depends_on()
                    .iter()
                    .all(|dep| self.snapshot.is_completed(dep))
        })
    }

    fn exhausted(self) -> Plan {
        let remaining = self
            .template
            .sequence()
            .into_iter()
            .any(|step| !self.snapshot.is_completed(step.id()));
        let decision = if remaining {
            NextDecision::Blocked {
                reason: UNSCHEDULABLE_REASON.to_string(),
            }
        } else {
            NextDecision::Terminal {
                reason: TERMINAL_REASON.to_string(),
            }
        };
        self.finish(decision)
    }

    fn ordinary(mut self, step: &'a OrdinaryStep) -> Result<Plan, RuntimeError> {
        let missing = step
            .requires_inputs
            .iter()
            .find(|key| !self.snapshot.inputs.contains_key(key.as_str()));
        let Some(missing) = missing else {
            return self.issue(StepRef::Ordinary(step));
        };

        let request = DecisionRequest {
            decision_id: input_decision_id(missing),
            step_id: step.id.clone(),
            question: format!(
                "Input required before step '{}': provide value for '{missing}'.",
                step.id
            ),
            options: Vec::new(),
            input_key: Some(missing.clone()),
        };
        let decision = self.raise(request);
        Ok(self.finish(decision))
    }

    /// Issue `step` to the host, binding its RACI roles first.
    fn issue(mut self, step: StepRef<'a>) -> Result<Plan, RuntimeError> {
        let raci = self.bind_raci(step)?;
        let (prompt, expected_output) = match step {
            StepRef::Ordinary(ordinary) => {
                let prompt = ordinary.prompt.clone().unwrap_or_else(|| {
                    format!("Execute step '{}': {}", ordinary.id, ordinary.title)
                });
                (prompt, ordinary.expected_output.clone())
            }
            StepRef::Audit(audit) => (
                format!("Execute audit step '{}': {}", audit.id, audit.title),
                None,
            ),
        };
        let inputs: BTreeMap<String, Value> = match step {
            StepRef::Ordinary(ordinary) => ordinary
                .requires_inputs
                .iter()
                .filter_map(|key| Some((key.clone(), self.snapshot.inputs.get(key)?.clone())))
                .collect(),
            StepRef::Audit(_) => BTreeMap::new(),
        };
        let context = StepContext {
            run_id: self.snapshot.run_id.clone(),
            mission_key: self.snapshot.mission_key.clone(),
            step_id: step.id().to_string(),
            step_title: step.title().to_string(),
            step_description: step.description().to_string(),
            expected_output,
            inputs,
            raci,
        };

        if self.snapshot.issued_step_id.as_deref() != Some(step.id()) {
            self.events.push(RuntimeEvent::NextStepIssued(StepIssuedPayload {
                run_id: self.snapshot.run_id.clone(),
                step_id: step.id().to_string(),
                actor: agent_identity(&self.snapshot.inputs),
            }));
            let issued = Some(step.id().to_string());
            self.snapshot = std::mem::take(&mut self.snapshot).with_issued(issued);
        }

        let decision = NextDecision::Step {
            step_id: step.id().to_string(),
            title: step.title().to_string(),
            prompt,
            context: Box::new(context),
        };
        Ok(self.finish(decision))
    }

    /// Handle a blocking audit step. Returns `None` when a low-band gate was
    /// auto-completed and the walk should continue.
    fn gate(&mut self, step: &'a AuditStep) -> Result<Option<NextDecision>, RuntimeError> {
        self.bind_raci(StepRef::Audit(step))?;
        let decision_id = step.decision_id();

        let Some(declaration) = &step.significance else {
            let request = DecisionRequest {
                decision_id,
                step_id: step.id.clone(),
                question: format!("Audit checkpoint: {}. Approve to continue?", step.title),
                options: BINARY_OPTIONS.iter().map(|o| o.to_string()).collect(),
                input_key: None,
            };
            return Ok(Some(self.raise(request)));
        };

        let score = self.significance(step, &decision_id, declaration)?;
        let request = match score.effective_band {
            BandName::Low => {
                info!(
                    step_id = %step.id,
                    composite = score.composite,
                    "auto-completing low-significance gate"
                );
                self.events.push(RuntimeEvent::StepCompleted(StepCompletedPayload {
                    run_id: self.snapshot.run_id.clone(),
                    step_id: step.id.clone(),
                    result: StepResult::Success,
                    auto_completed: true,
                    actor: agent_identity(&self.snapshot.inputs),
                }));
                self.snapshot = std::mem::take(&mut self.snapshot).with_completed(&step.id);
                return Ok(None);
            }
            BandName::Medium => DecisionRequest {
                decision_id,
                step_id: step.id.clone(),
                question: format!(
                    "Significance gate '{}' (medium, composite {}/{MAX_COMPOSITE_SCORE}). \
                     Choose decide_solo, open_stand_up or defer.",
                    step.title, score.composite
                ),
                options: SOFT_GATE_OPTIONS.iter().map(|o| o.to_string()).collect(),
                input_key: None,
            },
            BandName::High => DecisionRequest {
                decision_id,
                step_id: step.id.clone(),
                question: high_band_question(&step.title, &score),
                options: BINARY_OPTIONS.iter().map(|o| o.to_string()).collect(),
                input_key: None,
            },
        };
        Ok(Some(self.raise(request)))
    }

    /// Record a new pending decision and announce it.
    fn raise(&mut self, request: DecisionRequest) -> NextDecision {
        self.events.push(RuntimeEvent::DecisionInputRequested(DecisionRequestedPayload {
            run_id: self.snapshot.run_id.clone(),
            decision_id: request.decision_id.clone(),
            step_id: request.step_id.clone(),
            question: request.question.clone(),
            options: request.options.clone(),
            input_key: request.input_key.clone(),
            actor: agent_identity(&self.snapshot.inputs),
        }));
        let decision = request.to_decision();
        self.snapshot = std::mem::take(&mut self.snapshot).with_pending(request);
        decision
    }

    /// Evaluate and record significance for a gate, reusing an earlier
    /// evaluation if one is already in the ledger.
    fn significance(
        &mut self,
        step: &AuditStep,
        decision_id: &str,
        declaration: &SignificanceDeclaration,
    ) -> Result<SignificanceScore, RuntimeError> {
        let key = LedgerKey::Significance(decision_id.to_string());
        if let Some(score) = self.snapshot.record::<SignificanceScore>(&key)? {
            return Ok(score);
        }
        let triggers = &declaration.hard_triggers;
        let score = evaluate_with_table(&declaration.dimensions, triggers, &self.table)?;
        self.events.push(RuntimeEvent::SignificanceEvaluated(SignificanceEvaluatedPayload {
            run_id: self.snapshot.run_id.clone(),
            decision_id: decision_id.to_string(),
            step_id: step.id.clone(),
            significance_score: score.clone(),
            effective_band: score.effective_band,
        }));
        self.snapshot = std::mem::take(&mut self.snapshot).with_record(&key, &score)?;
        Ok(score)
    }

    /// Resolve and record the step's RACI binding once; later calls reuse it.
    fn bind_raci(&mut self, step: StepRef<'_>) -> Result<RaciBinding, RuntimeError> {
        let key = LedgerKey::Raci(step.id().to_string());
        if let Some(binding) = self.snapshot.record::<RaciBinding>(&key)? {
            return Ok(binding);
        }
        let binding = resolve_raci(&self.snapshot.run_id, step, &self.snapshot.inputs)?;
        self.snapshot = std::mem::take(&mut self.snapshot)
            .with_record(&key, &binding)?;
        Ok(binding)
    }
}

fn high_band_question(title: &str, score: &SignificanceScore) -> String {
    let triggers: Vec<&str> = score
        .hard_trigger_classes
        .iter()
        .map(|class| class.class_id())
        .collect();
    if triggers.is_empty() {
        format!(
            "High-significance checkpoint '{title}' (composite {}/{MAX_COMPOSITE_SCORE}). \
             Approve to continue?",
            score.composite
        )
    } else {
        format!(
            "High-significance checkpoint '{title}' \
             (composite {}/{MAX_COMPOSITE_SCORE}, hard triggers: {}). Approve to continue?",
            score.composite,
            triggers.join(", ")
        )
    }
}

/// Apply the host's report for the issued step.
///
/// Success marks the step complete. Failed and blocked results block the
/// run. Reporting on a step that is not the issued one is rejected.
pub fn complete_step(
    snapshot: RunSnapshot,
    step_id: &str,
    result: StepResult,
) -> Result<(RunSnapshot, RuntimeEvent), RuntimeError> {
    if snapshot.issued_step_id.as_deref() != Some(step_id) {
        return Err(RuntimeError::StepNotIssued {
            step_id: step_id.to_string(),
            issued: snapshot
                .issued_step_id
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        });
    }
    let event = RuntimeEvent::StepCompleted(StepCompletedPayload {
        run_id: snapshot.run_id.clone(),
        step_id: step_id.to_string(),
        result,
        auto_completed: false,
        actor: agent_identity(&snapshot.inputs),
    });
    let snapshot = match result {
        StepResult::Success => snapshot.with_completed(step_id),
        StepResult::Failed => snapshot.with_issued(None).with_blocked(format!(
            "Previous step '{step_id}' failed; manual intervention required."
        )),
        StepResult::Blocked => snapshot
            .with_issued(None)
            .with_blocked(format!("Previous step '{step_id}' reported blocked state.")),
    };
    Ok((snapshot, event))
}

/// Event for a run that has just reached its terminal state.
pub fn run_completed_event(snapshot: &RunSnapshot) -> RuntimeEvent {
    RuntimeEvent::MissionRunCompleted(RunCompletedPayload {
        run_id: snapshot.run_id.clone(),
        mission_key: snapshot.mission_key.clone(),
        actor: agent_identity(&snapshot.inputs),
    })
}
