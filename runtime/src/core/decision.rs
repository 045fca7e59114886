//! Decision engine: applies an answer to a pending decision.
//!
//! Three families of decision:
//! - `input:<key>` writes the answer into the run inputs.
//! - `audit:<step>` without a significance record is a binary approve/reject
//!   gate answered by the accountable human.
//! - `audit:<step>` with a significance record routes on its effective band:
//!   medium is a soft gate (decide_solo, open_stand_up, defer), high is
//!   approve/reject.
//!
//! Every resolution leaves a structured record in the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::RuntimeError;
use crate::core::events::{DecisionAnsweredPayload, RuntimeEvent, StepCompletedPayload};
use crate::core::policy::BandName;
use crate::core::raci::{RaciBinding, RaciSource, validate_actor};
use crate::core::significance::SignificanceScore;
use crate::core::snapshot::{LedgerKey, RunSnapshot};
use crate::core::types::{ActorIdentity, AuthorityRole, StepResult};

/// An answer submitted by the host on behalf of an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub decision_id: String,
    pub answer: String,
    pub actor: ActorIdentity,
    pub answered_at: String,
    /// Stand-up participants; only meaningful for `open_stand_up`.
    #[serde(default)]
    pub participants: Vec<String>,
}

/// Result of applying an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Answered {
    pub snapshot: RunSnapshot,
    pub events: Vec<RuntimeEvent>,
}

/// Record stored under `input:<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAnswer {
    pub decision_id: String,
    pub answer: String,
    pub answered_by: ActorIdentity,
    pub answered_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditVerdict {
    Approve,
    Reject,
}

/// Record stored under `audit:<step>` for approve/reject resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDecision {
    pub decision_id: String,
    pub step_id: String,
    pub answer: AuditVerdict,
    pub actor: ActorIdentity,
    pub authority_role: AuthorityRole,
    pub raci_source: RaciSource,
    pub override_reason: Option<String>,
    pub significance: Option<SignificanceScore>,
    pub decided_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftGateAction {
    DecideSolo,
    OpenStandUp,
    Defer,
}

impl SoftGateAction {
    fn parse(answer: &str) -> Option<Self> {
        match answer {
            "decide_solo" => Some(SoftGateAction::DecideSolo),
            "open_stand_up" => Some(SoftGateAction::OpenStandUp),
            "defer" => Some(SoftGateAction::Defer),
            _ => None,
        }
    }
}

impl fmt::Display for SoftGateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SoftGateAction::DecideSolo => "decide_solo",
            SoftGateAction::OpenStandUp => "open_stand_up",
            SoftGateAction::Defer => "defer",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftGateOutcome {
    Cleared,
    StandUpOpen,
    Deferred,
}

/// Earlier action on the same soft gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftGateEntry {
    pub action: SoftGateAction,
    pub actor: ActorIdentity,
    #[serde(default)]
    pub participants: Vec<String>,
    pub decided_at: String,
}

/// Record stored under `soft_gate:<decision_id>`. The latest action wins;
/// earlier ones move to `prior_actions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftGateDecision {
    pub decision_id: String,
    pub step_id: String,
    pub action: SoftGateAction,
    pub outcome: SoftGateOutcome,
    pub actor: ActorIdentity,
    pub authority_role: AuthorityRole,
    pub raci_source: RaciSource,
    pub override_reason: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub significance: SignificanceScore,
    pub decided_at: String,
    #[serde(default)]
    pub prior_actions: Vec<SoftGateEntry>,
}

/// Apply `request` to `snapshot`.
///
/// The decision must be pending. Audit answers require the acting party to
/// hold the accountable role in the step's recorded RACI binding; a denial is
/// returned as [`RuntimeError::AuthorityDenied`] and leaves the snapshot
/// untouched.
pub fn answer_decision(
    snapshot: RunSnapshot,
    request: &AnswerRequest,
) -> Result<Answered, RuntimeError> {
    if !snapshot.is_pending(&request.decision_id) {
        return Err(RuntimeError::DecisionNotPending {
            run_id: snapshot.run_id.clone(),
            decision_id: request.decision_id.clone(),
        });
    }

    if let Some(key) = request.decision_id.strip_prefix("input:") {
        return answer_input(snapshot, key, request);
    }
    if let Some(step_id) = request.decision_id.strip_prefix("audit:") {
        return answer_audit(snapshot, step_id, request);
    }
    Err(RuntimeError::UnsupportedDecision(request.decision_id.clone()))
}

fn answer_input(
    snapshot: RunSnapshot,
    key: &str,
    request: &AnswerRequest,
) -> Result<Answered, RuntimeError> {
    debug!(decision_id = %request.decision_id, key, "recording input answer");
    let record = InputAnswer {
        decision_id: request.decision_id.clone(),
        answer: request.answer.clone(),
        answered_by: request.actor.clone(),
        answered_at: request.answered_at.clone(),
    };
    let snapshot = snapshot
        .without_pending(&request.decision_id)
        .with_input(key, request.answer.clone().into())
        .with_record(&LedgerKey::Answer(request.decision_id.clone()), &record)?;
    let events = vec![answered_event(&snapshot, request)];
    Ok(Answered { snapshot, events })
}

fn answer_audit(
    snapshot: RunSnapshot,
    step_id: &str,
    request: &AnswerRequest,
) -> Result<Answered, RuntimeError> {
    let decision_id = request.decision_id.as_str();
    let binding: RaciBinding = snapshot
        .record(&LedgerKey::Raci(step_id.to_string()))?
        .ok_or_else(|| RuntimeError::MissingRaciBinding {
            step_id: step_id.to_string(),
            decision_id: decision_id.to_string(),
        })?;
    validate_actor(
        &snapshot.run_id,
        decision_id,
        &binding,
        &request.actor,
        AuthorityRole::Accountable,
    )
    .map_err(RuntimeError::AuthorityDenied)?;

    let significance_key = LedgerKey::Significance(decision_id.to_string());
    let score: Option<SignificanceScore> = snapshot.record(&significance_key)?;
    let invalid = |reason: &str| RuntimeError::InvalidAnswer {
        decision_id: decision_id.to_string(),
        answer: request.answer.clone(),
        reason: reason.to_string(),
    };

    match score {
        None => {
            let verdict = parse_verdict(&request.answer)
                .ok_or_else(|| invalid("Invalid audit answer: expected approve or reject"))?;
            resolve_binary(snapshot, step_id, &binding, verdict, None, request)
        }
        Some(score) => match score.effective_band {
            BandName::High => {
                let verdict = parse_verdict(&request.answer)
                    .ok_or_else(|| invalid("High-band gate accepts approve or reject"))?;
                resolve_binary(snapshot, step_id, &binding, verdict, Some(score), request)
            }
            BandName::Medium => {
                let action = SoftGateAction::parse(&request.answer).ok_or_else(|| {
                    invalid("Medium-band gate accepts decide_solo, open_stand_up or defer")
                })?;
                resolve_soft_gate(snapshot, step_id, &binding, action, score, request)
            }
            BandName::Low => Err(RuntimeError::MalformedRecord {
                key: significance_key.to_string(),
                reason: "low-band gate cannot be pending".to_string(),
            }),
        },
    }
}

fn parse_verdict(answer: &str) -> Option<AuditVerdict> {
    match answer {
        "approve" => Some(AuditVerdict::Approve),
        "reject" => Some(AuditVerdict::Reject),
        _ => None,
    }
}

fn resolve_binary(
    snapshot: RunSnapshot,
    step_id: &str,
    binding: &RaciBinding,
    verdict: AuditVerdict,
    significance: Option<SignificanceScore>,
    request: &AnswerRequest,
) -> Result<Answered, RuntimeError> {
    let record = AuditDecision {
        decision_id: request.decision_id.clone(),
        step_id: step_id.to_string(),
        answer: verdict,
        actor: request.actor.clone(),
        authority_role: AuthorityRole::Accountable,
        raci_source: binding.source,
        override_reason: binding.override_reason.clone(),
        significance,
        decided_at: request.answered_at.clone(),
    };
    let snapshot = snapshot
        .without_pending(&request.decision_id)
        .with_record(&LedgerKey::Answer(request.decision_id.clone()), &record)?;

    let mut events = vec![answered_event(&snapshot, request)];
    let snapshot = match verdict {
        AuditVerdict::Approve => {
            events.push(completed_event(&snapshot, step_id, &request.actor));
            snapshot.with_completed(step_id)
        }
        AuditVerdict::Reject => {
            info!(step_id, actor_id = %request.actor.actor_id, "audit rejected; blocking run");
            snapshot.with_blocked(format!(
                "Audit '{step_id}' rejected by {} '{}'; manual intervention required.",
                request.actor.actor_type, request.actor.actor_id
            ))
        }
    };
    Ok(Answered { snapshot, events })
}

fn resolve_soft_gate(
    snapshot: RunSnapshot,
    step_id: &str,
    binding: &RaciBinding,
    action: SoftGateAction,
    significance: SignificanceScore,
    request: &AnswerRequest,
) -> Result<Answered, RuntimeError> {
    let key = LedgerKey::SoftGate(request.decision_id.clone());
    let prior_actions = match snapshot.record::<SoftGateDecision>(&key)? {
        Some(previous) => {
            let mut history = previous.prior_actions;
            history.push(SoftGateEntry {
                action: previous.action,
                actor: previous.actor,
                participants: previous.participants,
                decided_at: previous.decided_at,
            });
            history
        }
        None => Vec::new(),
    };
    let outcome = match action {
        SoftGateAction::DecideSolo => SoftGateOutcome::Cleared,
        SoftGateAction::OpenStandUp => SoftGateOutcome::StandUpOpen,
        SoftGateAction::Defer => SoftGateOutcome::Deferred,
    };
    debug!(decision_id = %request.decision_id, action = %action, "soft gate action");

    let record = SoftGateDecision {
        decision_id: request.decision_id.clone(),
        step_id: step_id.to_string(),
        action,
        outcome,
        actor: request.actor.clone(),
        authority_role: AuthorityRole::Accountable,
        raci_source: binding.source,
        override_reason: binding.override_reason.clone(),
        participants: match action {
            SoftGateAction::OpenStandUp => request.participants.clone(),
            SoftGateAction::DecideSolo | SoftGateAction::Defer => Vec::new(),
        },
        significance,
        decided_at: request.answered_at.clone(),
        prior_actions,
    };
    let snapshot = snapshot.with_record(&key, &record)?;
    let mut events = vec![answered_event(&snapshot, request)];

    // Stand-ups and deferrals keep the gate pending; only decide_solo clears it.
    let snapshot = match outcome {
        SoftGateOutcome::Cleared => {
            events.push(completed_event(&snapshot, step_id, &request.actor));
            snapshot
                .without_pending(&request.decision_id)
                .with_completed(step_id)
        }
        SoftGateOutcome::StandUpOpen | SoftGateOutcome::Deferred => snapshot,
    };
    Ok(Answered { snapshot, events })
}

fn answered_event(snapshot: &RunSnapshot, request: &AnswerRequest) -> RuntimeEvent {
    RuntimeEvent::DecisionInputAnswered(DecisionAnsweredPayload {
        run_id: snapshot.run_id.clone(),
        decision_id: request.decision_id.clone(),
        answer: request.answer.clone(),
        actor: request.actor.clone(),
    })
}

fn completed_event(snapshot: &RunSnapshot, step_id: &str, actor: &ActorIdentity) -> RuntimeEvent {
    RuntimeEvent::StepCompleted(StepCompletedPayload {
        run_id: snapshot.run_id.clone(),
        step_id: step_id.to_string(),
        result: StepResult::Success,
        auto_completed: false,
        actor: actor.clone(),
    })
}
