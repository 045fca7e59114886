//! Escalation targets and fail-closed timeout handling.
//!
//! The host owns wall-clock timers. When it reports that a gate exceeded its
//! timeout, this module computes who must be notified and records the
//! expiry. The run's pending and blocked state never changes here.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::RuntimeError;
use crate::core::policy::{BandName, TimeoutPolicy};
use crate::core::raci::RaciBinding;
use crate::core::significance::SignificanceScore;
use crate::core::snapshot::{LedgerKey, RunSnapshot};
use crate::core::types::{Actor, ActorIdentity};

/// Payload handed to the host for out-of-band notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutExpiredPayload {
    pub run_id: String,
    pub decision_id: String,
    pub step_id: String,
    pub significance_score: SignificanceScore,
    pub effective_band: BandName,
    pub timeout_configured_seconds: u64,
    pub escalation_targets: Vec<Actor>,
    pub raci_snapshot: RaciBinding,
    pub actor: ActorIdentity,
    pub expired_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutEscalationResult {
    pub decision_id: String,
    pub escalation_targets: Vec<Actor>,
    pub band: BandName,
    pub timeout_expired_payload: TimeoutExpiredPayload,
}

/// Ledger record stored under `timeout:<decision_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutRecord {
    pub decision_id: String,
    pub step_id: String,
    pub effective_band: BandName,
    pub timeout_configured_seconds: u64,
    pub escalation_targets: Vec<Actor>,
    pub reported_by: ActorIdentity,
    pub expired_at: String,
    /// Whether the decision was still pending when the expiry was reported.
    pub was_pending: bool,
}

/// Who to notify for a gate at `band`.
///
/// Medium: the accountable actor. High: the accountable actor followed by
/// every consulted actor. Low gates never escalate.
pub fn compute_escalation_targets(binding: &RaciBinding, band: BandName) -> Vec<Actor> {
    match band {
        BandName::Low => Vec::new(),
        BandName::Medium => vec![binding.accountable.clone()],
        BandName::High => {
            if binding.consulted.is_empty() {
                info!(
                    step_id = %binding.step_id,
                    "high-band escalation has no consulted actors; notifying accountable only"
                );
            }
            std::iter::once(binding.accountable.clone())
                .chain(binding.consulted.iter().cloned())
                .collect()
        }
    }
}

/// Record a host-reported timeout for `decision_id`.
///
/// Both the RACI binding and the significance evaluation for the decision
/// must already be in the ledger; a missing record is an error, never a
/// default. Returns the escalation result and the snapshot with the timeout
/// record added.
pub fn notify_timeout(
    snapshot: RunSnapshot,
    decision_id: &str,
    actor: &ActorIdentity,
    timeout: &TimeoutPolicy,
    at: &str,
) -> Result<(TimeoutEscalationResult, RunSnapshot), RuntimeError> {
    let step_id = decision_id
        .strip_prefix("audit:")
        .ok_or_else(|| RuntimeError::UnsupportedDecision(decision_id.to_string()))?;

    let binding: RaciBinding = snapshot
        .record(&LedgerKey::Raci(step_id.to_string()))?
        .ok_or_else(|| RuntimeError::MissingRaciBinding {
            step_id: step_id.to_string(),
            decision_id: decision_id.to_string(),
        })?;
    let score: SignificanceScore = snapshot
        .record(&LedgerKey::Significance(decision_id.to_string()))?
        .ok_or_else(|| RuntimeError::MissingSignificance(decision_id.to_string()))?;

    let was_pending = snapshot.is_pending(decision_id);
    if !was_pending {
        warn!(
            run_id = %snapshot.run_id,
            decision_id,
            "timeout reported for a decision that is no longer pending"
        );
    }

    let band = score.effective_band;
    let escalation_targets = compute_escalation_targets(&binding, band);
    let timeout_configured_seconds = timeout.effective_timeout_seconds();

    let record = TimeoutRecord {
        decision_id: decision_id.to_string(),
        step_id: step_id.to_string(),
        effective_band: band,
        timeout_configured_seconds,
        escalation_targets: escalation_targets.clone(),
        reported_by: actor.clone(),
        expired_at: at.to_string(),
        was_pending,
    };
    let payload = TimeoutExpiredPayload {
        run_id: snapshot.run_id.clone(),
        decision_id: decision_id.to_string(),
        step_id: step_id.to_string(),
        significance_score: score,
        effective_band: band,
        timeout_configured_seconds,
        escalation_targets: escalation_targets.clone(),
        raci_snapshot: binding,
        actor: actor.clone(),
        expired_at: at.to_string(),
    };
    let snapshot = snapshot.with_record(&LedgerKey::Timeout(decision_id.to_string()), &record)?;

    Ok((
        TimeoutEscalationResult {
            decision_id: decision_id.to_string(),
            escalation_targets,
            band,
            timeout_expired_payload: payload,
        },
        snapshot,
    ))
}
