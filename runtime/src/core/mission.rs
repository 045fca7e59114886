//! Mission definition model.
//!
//! A mission is an ordered list of ordinary (prompt) steps followed by an
//! ordered list of audit steps. Together they form one combined sequence that
//! the planner walks in order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::raci::RaciDeclaration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissionMeta {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissionTemplate {
    pub mission: MissionMeta,
    #[serde(default)]
    pub steps: Vec<OrdinaryStep>,
    #[serde(default)]
    pub audit_steps: Vec<AuditStep>,
}

/// Prompt/work step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrdinaryStep {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub requires_inputs: Vec<String>,
    #[serde(default)]
    pub raci: Option<RaciDeclaration>,
    #[serde(default)]
    pub raci_override_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    Manual,
    PostMerge,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Advisory,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    pub trigger_mode: TriggerMode,
    pub enforcement: Enforcement,
    #[serde(default)]
    pub label: Option<String>,
}

/// Raw significance input declared on an audit step. Validated at evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignificanceDeclaration {
    pub dimensions: BTreeMap<String, i64>,
    #[serde(default)]
    pub hard_triggers: Vec<String>,
    /// Overrides the policy's default timeout for this gate.
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
}

/// Decision checkpoint step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditStep {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub audit: AuditConfig,
    #[serde(default)]
    pub significance: Option<SignificanceDeclaration>,
    #[serde(default)]
    pub raci: Option<RaciDeclaration>,
    #[serde(default)]
    pub raci_override_reason: Option<String>,
}

impl AuditStep {
    pub fn is_blocking(&self) -> bool {
        self.audit.enforcement == Enforcement::Blocking
    }

    /// Decision id of the gate this step raises when blocking.
    pub fn decision_id(&self) -> String {
        audit_decision_id(&self.id)
    }
}

pub fn audit_decision_id(step_id: &str) -> String {
    format!("audit:{step_id}")
}

pub fn input_decision_id(input_key: &str) -> String {
    format!("input:{input_key}")
}

/// Borrowed view over either step family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRef<'a> {
    Ordinary(&'a OrdinaryStep),
    Audit(&'a AuditStep),
}

impl<'a> StepRef<'a> {
    pub fn id(self) -> &'a str {
        match self {
            StepRef::Ordinary(step) => &step.id,
            StepRef::Audit(step) => &step.id,
        }
    }

    pub fn title(self) -> &'a str {
        match self {
            StepRef::Ordinary(step) => &step.title,
            StepRef::Audit(step) => &step.title,
        }
    }

    pub fn description(self) -> &'a str {
        match self {
            StepRef::Ordinary(step) => &step.description,
            StepRef::Audit(step) => &step.description,
        }
    }

    pub fn depends_on(self) -> &'a [String] {
        match self {
            StepRef::Ordinary(step) => &step.depends_on,
            StepRef::Audit(step) => &step.depends_on,
        }
    }

    pub fn raci(self) -> Option<&'a RaciDeclaration> {
        match self {
            StepRef::Ordinary(step) => step.raci.as_ref(),
            StepRef::Audit(step) => step.raci.as_ref(),
        }
    }

    pub fn raci_override_reason(self) -> Option<&'a str> {
        match self {
            StepRef::Ordinary(step) => step.raci_override_reason.as_deref(),
            StepRef::Audit(step) => step.raci_override_reason.as_deref(),
        }
    }

    /// Gate decision id for blocking audit steps.
    pub fn decision_id(self) -> Option<String> {
        match self {
            StepRef::Audit(step) if step.is_blocking() => Some(step.decision_id()),
            _ => None,
        }
    }
}

impl MissionTemplate {
    /// Ordinary steps in template order, then audit steps in template order.
    pub fn sequence(&self) -> Vec<StepRef<'_>> {
        self.steps
            .iter()
            .map(StepRef::Ordinary)
            .chain(self.audit_steps.iter().map(StepRef::Audit))
            .collect()
    }

    pub fn find_step(&self, step_id: &str) -> Option<StepRef<'_>> {
        let sequence = self.sequence();
        sequence.into_iter().find(|step| step.id() == step_id)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len() + self.audit_steps.len()
    }
}
