//! Test-only helpers for constructing missions, snapshots and score maps.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::mission::{
    AuditConfig, AuditStep, Enforcement, MissionMeta, MissionTemplate, OrdinaryStep,
    SignificanceDeclaration, TriggerMode,
};
use crate::core::policy::{DIMENSIONS, MAX_DIMENSION_SCORE};
use crate::core::raci::MISSION_OWNER_INPUT;
use crate::core::snapshot::RunSnapshot;

/// Mission key used by [`mission`] and [`owner_snapshot`].
pub const MISSION_KEY: &str = "test-mission";
/// Mission owner bound by [`owner_inputs`] and [`owner_snapshot`].
pub const OWNER_ID: &str = "owner-1";

/// Create a mission from the given step lists.
pub fn mission(steps: Vec<OrdinaryStep>, audit_steps: Vec<AuditStep>) -> MissionTemplate {
    MissionTemplate {
        mission: MissionMeta {
            key: MISSION_KEY.to_string(),
            name: "Test mission".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
        },
        steps,
        audit_steps,
    }
}

/// Create an ordinary step with deterministic title and description.
pub fn prompt_step(id: &str, depends_on: &[&str]) -> OrdinaryStep {
    OrdinaryStep {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        prompt: None,
        expected_output: None,
        depends_on: depends_on.iter().map(|dep| dep.to_string()).collect(),
        requires_inputs: Vec::new(),
        raci: None,
        raci_override_reason: None,
    }
}

/// Create an audit step without a significance declaration.
pub fn audit_step(id: &str, depends_on: &[&str], blocking: bool) -> AuditStep {
    AuditStep {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        depends_on: depends_on.iter().map(|dep| dep.to_string()).collect(),
        audit: AuditConfig {
            trigger_mode: TriggerMode::Manual,
            enforcement: if blocking {
                Enforcement::Blocking
            } else {
                Enforcement::Advisory
            },
            label: None,
        },
        significance: None,
        raci: None,
        raci_override_reason: None,
    }
}

/// Create a blocking audit step with a significance declaration.
pub fn significant_audit(
    id: &str,
    depends_on: &[&str],
    dimensions: BTreeMap<String, i64>,
    hard_triggers: &[&str],
) -> AuditStep {
    AuditStep {
        significance: Some(SignificanceDeclaration {
            dimensions,
            hard_triggers: hard_triggers.iter().map(|t| t.to_string()).collect(),
            timeout_seconds: None,
        }),
        ..audit_step(id, depends_on, true)
    }
}

/// Six-dimension score map summing to `total` (filled in name order, 3 per
/// dimension until exhausted). `total` must be within `0..=18`.
pub fn dimension_scores(total: i64) -> BTreeMap<String, i64> {
    let mut remaining = total;
    DIMENSIONS
        .iter()
        .map(|dim| {
            let score = remaining.clamp(0, MAX_DIMENSION_SCORE);
            remaining -= score;
            (dim.as_str().to_string(), score)
        })
        .collect()
}

/// Inputs binding the mission owner.
pub fn owner_inputs(owner_id: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([(MISSION_OWNER_INPUT.to_string(), Value::from(owner_id))])
}

/// Fresh snapshot with [`OWNER_ID`] bound as mission owner.
pub fn owner_snapshot() -> RunSnapshot {
    RunSnapshot::new("run-1", MISSION_KEY).with_inputs(owner_inputs(OWNER_ID))
}
