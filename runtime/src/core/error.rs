//! Typed failures raised by the deterministic core.
//!
//! Every failure is either a rejected call (validation, authority) or a
//! fail-closed refusal to proceed (unresolved role, missing ledger record).
//! Nothing here is retried automatically.

use thiserror::Error;

use crate::core::raci::{AuthorityDenial, RaciEscalation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Dimension scores missing, unexpected, or out of the 0..=3 range.
    #[error("invalid dimension scores: {0}")]
    InvalidDimensions(String),

    #[error("unknown hard-trigger class '{class_id}' (valid: {valid})")]
    UnknownHardTrigger { class_id: String, valid: String },

    #[error("invalid band cutoffs: {0}")]
    InvalidBandCutoffs(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    /// The answer value is not one of the options accepted by the gate.
    #[error("{reason} (decision '{decision_id}', got '{answer}')")]
    InvalidAnswer {
        decision_id: String,
        answer: String,
        reason: String,
    },

    #[error("invalid mission definition:\n- {}", .0.join("\n- "))]
    InvalidMission(Vec<String>),

    #[error("invalid explicit RACI for step '{step_id}': {}", .errors.join("; "))]
    InvalidRaci {
        step_id: String,
        errors: Vec<String>,
    },

    #[error(
        "authority denied for decision '{}': {} '{}' may not act as {}",
        .0.decision_id, .0.actor.actor_type, .0.actor.actor_id, .0.authority_role
    )]
    AuthorityDenied(Box<AuthorityDenial>),

    #[error("RACI escalation for step '{}': {}", .0.step_id, .0.reason)]
    UnresolvedRole(Box<RaciEscalation>),

    #[error("decision '{decision_id}' is not pending for run '{run_id}'")]
    DecisionNotPending { run_id: String, decision_id: String },

    #[error("unsupported decision id '{0}' (expected 'input:' or 'audit:' prefix)")]
    UnsupportedDecision(String),

    #[error("No RACI binding recorded for step '{step_id}' (decision '{decision_id}')")]
    MissingRaciBinding {
        step_id: String,
        decision_id: String,
    },

    #[error("No significance evaluation recorded for decision '{0}'")]
    MissingSignificance(String),

    #[error("ledger record '{key}' is malformed: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{step_id}' is not the issued step (issued: {issued})")]
    StepNotIssued { step_id: String, issued: String },
}
