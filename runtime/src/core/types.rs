//! Shared deterministic types for the mission runtime core.
//!
//! These types define stable contracts between core components and the host.
//! They carry no I/O and serialize with stable field names.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::raci::RaciBinding;

/// Kind of party that can hold a RACI role or act on a decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Human,
    Llm,
    Service,
}

impl ActorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorType::Human => "human",
            ActorType::Llm => "llm",
            ActorType::Service => "service",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role holder inside a RACI binding.
///
/// `actor_id` is `None` for a placeholder that has not been bound to a
/// concrete party yet (inferred roles before resolution, or optional
/// consulted/informed entries the inputs could not resolve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Actor {
    pub actor_type: ActorType,
    #[serde(default)]
    pub actor_id: Option<String>,
}

impl Actor {
    pub fn placeholder(actor_type: ActorType) -> Self {
        Self {
            actor_type,
            actor_id: None,
        }
    }

    pub fn bound(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: Some(actor_id.into()),
        }
    }

    pub fn is_human(&self) -> bool {
        self.actor_type == ActorType::Human
    }
}

/// Concrete identity of the party submitting an answer or a timeout report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub actor_id: String,
    pub actor_type: ActorType,
}

impl ActorIdentity {
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_type,
        }
    }

    pub fn human(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::Human, actor_id)
    }
}

/// RACI role exercised by an acting party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityRole {
    Responsible,
    Accountable,
    Consulted,
    Informed,
}

impl AuthorityRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityRole::Responsible => "responsible",
            AuthorityRole::Accountable => "accountable",
            AuthorityRole::Consulted => "consulted",
            AuthorityRole::Informed => "informed",
        }
    }
}

impl fmt::Display for AuthorityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-reported result for the issued step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    Success,
    Failed,
    Blocked,
}

impl StepResult {
    pub fn as_str(self) -> &'static str {
        match self {
            StepResult::Success => "success",
            StepResult::Failed => "failed",
            StepResult::Blocked => "blocked",
        }
    }
}

/// Context handed to whoever executes an issued step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub run_id: String,
    pub mission_key: String,
    pub step_id: String,
    pub step_title: String,
    pub step_description: String,
    pub expected_output: Option<String>,
    /// Resolved values for the step's required inputs, keyed by input name.
    pub inputs: BTreeMap<String, Value>,
    pub raci: RaciBinding,
}

/// The planner's sole output: exactly one of four outcomes per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextDecision {
    Step {
        step_id: String,
        title: String,
        prompt: String,
        context: Box<StepContext>,
    },
    DecisionRequired {
        step_id: String,
        decision_id: String,
        question: String,
        options: Vec<String>,
        input_key: Option<String>,
    },
    Blocked {
        reason: String,
    },
    Terminal {
        reason: String,
    },
}

impl NextDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            NextDecision::Step { .. } => "step",
            NextDecision::DecisionRequired { .. } => "decision_required",
            NextDecision::Blocked { .. } => "blocked",
            NextDecision::Terminal { .. } => "terminal",
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            NextDecision::Step { step_id, .. } | NextDecision::DecisionRequired { step_id, .. } => {
                Some(step_id)
            }
            NextDecision::Blocked { .. } | NextDecision::Terminal { .. } => None,
        }
    }

    pub fn decision_id(&self) -> Option<&str> {
        match self {
            NextDecision::DecisionRequired { decision_id, .. } => Some(decision_id),
            _ => None,
        }
    }
}

/// Persisted request for a pending decision, re-emitted on every re-poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision_id: String,
    pub step_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub input_key: Option<String>,
}

impl DecisionRequest {
    pub fn to_decision(&self) -> NextDecision {
        NextDecision::DecisionRequired {
            step_id: self.step_id.clone(),
            decision_id: self.decision_id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
            input_key: self.input_key.clone(),
        }
    }
}
