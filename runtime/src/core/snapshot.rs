//! Immutable run snapshot and its namespaced decisions ledger.
//!
//! Every transition consumes a snapshot and returns a new one; nothing here
//! mutates through a shared reference. Ledger entries are JSON values keyed by
//! `<namespace>:<id>` strings and accessed through [`LedgerKey`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::RuntimeError;
use crate::core::types::DecisionRequest;

/// Typed address of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerKey {
    /// `raci:<step_id>`
    Raci(String),
    /// `significance:<decision_id>`
    Significance(String),
    /// `soft_gate:<decision_id>`
    SoftGate(String),
    /// `timeout:<decision_id>`
    Timeout(String),
    /// Final answer to a decision, stored under the decision id itself
    /// (`input:<key>` or `audit:<step_id>`).
    Answer(String),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKey::Raci(step_id) => write!(f, "raci:{step_id}"),
            LedgerKey::Significance(decision_id) => write!(f, "significance:{decision_id}"),
            LedgerKey::SoftGate(decision_id) => write!(f, "soft_gate:{decision_id}"),
            LedgerKey::Timeout(decision_id) => write!(f, "timeout:{decision_id}"),
            LedgerKey::Answer(decision_id) => f.write_str(decision_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub mission_key: String,
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,
    /// Pending decision ids mapped to the request that raised them.
    #[serde(default)]
    pub pending_decisions: BTreeMap<String, DecisionRequest>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
    /// Step handed to the host and not yet reported complete.
    #[serde(default)]
    pub issued_step_id: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub decisions: BTreeMap<String, Value>,
    /// Mission file the run was started from.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Hex sha256 of the mission file bytes at start.
    #[serde(default)]
    pub template_hash: Option<String>,
}

impl RunSnapshot {
    pub fn new(run_id: impl Into<String>, mission_key: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            mission_key: mission_key.into(),
            ..Self::default()
        }
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.contains(step_id)
    }

    pub fn is_pending(&self, decision_id: &str) -> bool {
        self.pending_decisions.contains_key(decision_id)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }

    /// Merge host-supplied inputs (context bundle) over the existing ones.
    pub fn with_inputs(mut self, inputs: BTreeMap<String, Value>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// Mark a step complete, clearing it as the issued step if it was.
    pub fn with_completed(mut self, step_id: &str) -> Self {
        if self.issued_step_id.as_deref() == Some(step_id) {
            self.issued_step_id = None;
        }
        self.completed_steps.insert(step_id.to_string());
        self
    }

    pub fn with_template_source(mut self, path: PathBuf, hash: String) -> Self {
        self.template_path = Some(path);
        self.template_hash = Some(hash);
        self
    }

    pub fn with_issued(mut self, step_id: Option<String>) -> Self {
        self.issued_step_id = step_id;
        self
    }

    pub fn with_pending(mut self, request: DecisionRequest) -> Self {
        self.pending_decisions
            .insert(request.decision_id.clone(), request);
        self
    }

    pub fn without_pending(mut self, decision_id: &str) -> Self {
        self.pending_decisions.remove(decision_id);
        self
    }

    /// First blocking reason wins; later reasons do not overwrite it.
    pub fn with_blocked(mut self, reason: impl Into<String>) -> Self {
        if self.blocked_reason.is_none() {
            self.blocked_reason = Some(reason.into());
        }
        self
    }

    /// Lexicographically first pending request.
    pub fn first_pending(&self) -> Option<&DecisionRequest> {
        self.pending_decisions.values().next()
    }

    pub fn has_record(&self, key: &LedgerKey) -> bool {
        self.decisions.contains_key(&key.to_string())
    }

    /// Decode the record at `key`, if present.
    pub fn record<T: DeserializeOwned>(&self, key: &LedgerKey) -> Result<Option<T>, RuntimeError> {
        let key = key.to_string();
        self.decisions
            .get(&key)
            .map(|value| {
                T::deserialize(value).map_err(|err| RuntimeError::MalformedRecord {
                    key: key.clone(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    /// Store `record` at `key`, replacing any previous value.
    pub fn with_record<T: Serialize>(
        mut self,
        key: &LedgerKey,
        record: &T,
    ) -> Result<Self, RuntimeError> {
        let key = key.to_string();
        let value = serde_json::to_value(record).map_err(|err| RuntimeError::MalformedRecord {
            key: key.clone(),
            reason: err.to_string(),
        })?;
        self.decisions.insert(key, value);
        Ok(self)
    }

    /// Check the pending/ledger invariant: no decision is both pending and
    /// carries a terminal answer record.
    pub fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (decision_id, request) in &self.pending_decisions {
            if request.decision_id != *decision_id {
                errors.push(format!(
                    "pending decision '{decision_id}' holds request for '{}'",
                    request.decision_id
                ));
            }
            if self.has_record(&LedgerKey::Answer(decision_id.clone())) {
                errors.push(format!(
                    "decision '{decision_id}' is pending but already has an answer record"
                ));
            }
        }
        if let Some(issued) = &self.issued_step_id
            && self.completed_steps.contains(issued)
        {
            errors.push(format!("issued step '{issued}' is already completed"));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(decision_id: &str) -> DecisionRequest {
        DecisionRequest {
            decision_id: decision_id.to_string(),
            step_id: "s1".to_string(),
            question: "?".to_string(),
            options: Vec::new(),
            input_key: None,
        }
    }

    #[test]
    fn ledger_keys_use_namespaced_strings() {
        assert_eq!(LedgerKey::Raci("s1".into()).to_string(), "raci:s1");
        assert_eq!(
            LedgerKey::Significance("audit:s1".into()).to_string(),
            "significance:audit:s1"
        );
        assert_eq!(
            LedgerKey::SoftGate("audit:s1".into()).to_string(),
            "soft_gate:audit:s1"
        );
        assert_eq!(
            LedgerKey::Timeout("audit:s1".into()).to_string(),
            "timeout:audit:s1"
        );
        assert_eq!(LedgerKey::Answer("input:x".into()).to_string(), "input:x");
    }

    #[test]
    fn transitions_return_new_values() {
        let base = RunSnapshot::new("run-1", "mission");
        let next = base
            .clone()
            .with_issued(Some("s1".to_string()))
            .with_completed("s1");
        assert!(base.completed_steps.is_empty());
        assert!(next.is_completed("s1"));
        assert_eq!(next.issued_step_id, None);
    }

    #[test]
    fn first_blocked_reason_is_kept() {
        let snapshot = RunSnapshot::new("run-1", "m")
            .with_blocked("first")
            .with_blocked("second");
        assert_eq!(snapshot.blocked_reason.as_deref(), Some("first"));
    }

    #[test]
    fn first_pending_is_sorted_by_decision_id() {
        let snapshot = RunSnapshot::new("run-1", "m")
            .with_pending(request("input:zeta"))
            .with_pending(request("audit:alpha"));
        assert_eq!(
            snapshot.first_pending().map(|r| r.decision_id.as_str()),
            Some("audit:alpha")
        );
        let snapshot = snapshot.without_pending("audit:alpha");
        assert!(!snapshot.is_pending("audit:alpha"));
        assert!(snapshot.is_pending("input:zeta"));
    }

    #[test]
    fn typed_records_round_trip_and_report_malformed() {
        let key = LedgerKey::Timeout("audit:s1".into());
        let snapshot = RunSnapshot::new("run-1", "m")
            .with_record(&key, &json!({"decision_id": "audit:s1"}))
            .expect("store");
        let value: Option<Value> = snapshot.record(&key).expect("load");
        assert_eq!(value, Some(json!({"decision_id": "audit:s1"})));

        let missing: Option<Value> = snapshot
            .record(&LedgerKey::Raci("s1".into()))
            .expect("load");
        assert!(missing.is_none());

        let err = snapshot
            .record::<DecisionRequest>(&key)
            .expect_err("wrong shape");
        assert!(matches!(
            err,
            RuntimeError::MalformedRecord { ref key, .. } if key == "timeout:audit:s1"
        ));
    }

    #[test]
    fn check_flags_pending_decision_with_answer() {
        let snapshot = RunSnapshot::new("run-1", "m")
            .with_pending(request("input:x"))
            .with_record(
                &LedgerKey::Answer("input:x".into()),
                &json!({"answer": "y"}),
            )
            .expect("store");
        let errors = snapshot.check();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("already has an answer record"));
    }
}
