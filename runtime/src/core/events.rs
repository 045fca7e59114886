//! Runtime events and the sink they are emitted through.
//!
//! Events serialize as `{"event_type": ..., "payload": {...}}`. Sinks receive
//! the timestamp separately so the core never reads a clock.

use serde::{Deserialize, Serialize};

use crate::core::escalation::TimeoutExpiredPayload;
use crate::core::policy::BandName;
use crate::core::raci::AuthorityDenial;
use crate::core::significance::SignificanceScore;
use crate::core::types::{ActorIdentity, StepResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    pub run_id: String,
    pub mission_key: String,
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepIssuedPayload {
    pub run_id: String,
    pub step_id: String,
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompletedPayload {
    pub run_id: String,
    pub step_id: String,
    pub result: StepResult,
    /// Set when a low-significance gate completed without surfacing.
    pub auto_completed: bool,
    /// Agent that reported the step, or the approver of an audit.
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequestedPayload {
    pub run_id: String,
    pub decision_id: String,
    pub step_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub input_key: Option<String>,
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionAnsweredPayload {
    pub run_id: String,
    pub decision_id: String,
    pub answer: String,
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificanceEvaluatedPayload {
    pub run_id: String,
    pub decision_id: String,
    pub step_id: String,
    pub significance_score: SignificanceScore,
    pub effective_band: BandName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub run_id: String,
    pub mission_key: String,
    pub actor: ActorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum RuntimeEvent {
    MissionRunStarted(RunStartedPayload),
    NextStepIssued(StepIssuedPayload),
    StepCompleted(StepCompletedPayload),
    DecisionInputRequested(DecisionRequestedPayload),
    DecisionInputAnswered(DecisionAnsweredPayload),
    SignificanceEvaluated(SignificanceEvaluatedPayload),
    DecisionAuthorityDenied(AuthorityDenial),
    DecisionTimeoutExpired(TimeoutExpiredPayload),
    MissionRunCompleted(RunCompletedPayload),
}

impl RuntimeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RuntimeEvent::MissionRunStarted(_) => "MissionRunStarted",
            RuntimeEvent::NextStepIssued(_) => "NextStepIssued",
            RuntimeEvent::StepCompleted(_) => "StepCompleted",
            RuntimeEvent::DecisionInputRequested(_) => "DecisionInputRequested",
            RuntimeEvent::DecisionInputAnswered(_) => "DecisionInputAnswered",
            RuntimeEvent::SignificanceEvaluated(_) => "SignificanceEvaluated",
            RuntimeEvent::DecisionAuthorityDenied(_) => "DecisionAuthorityDenied",
            RuntimeEvent::DecisionTimeoutExpired(_) => "DecisionTimeoutExpired",
            RuntimeEvent::MissionRunCompleted(_) => "MissionRunCompleted",
        }
    }
}

/// Destination for runtime events.
pub trait EventSink {
    fn emit(&mut self, timestamp: &str, event: &RuntimeEvent) -> anyhow::Result<()>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _timestamp: &str, _event: &RuntimeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub events: Vec<(String, RuntimeEvent)>,
}

impl CollectingSink {
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(|(_, e)| e.event_type()).collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, timestamp: &str, event: &RuntimeEvent) -> anyhow::Result<()> {
        self.events.push((timestamp.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ActorType;

    #[test]
    fn serializes_with_event_type_and_payload() {
        let event = RuntimeEvent::NextStepIssued(StepIssuedPayload {
            run_id: "run-1".to_string(),
            step_id: "plan".to_string(),
            actor: ActorIdentity::new(ActorType::Llm, "agent-1"),
        });
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event_type"], "NextStepIssued");
        assert_eq!(value["payload"]["step_id"], "plan");
        assert_eq!(value["payload"]["actor"]["actor_id"], "agent-1");
        assert_eq!(event.event_type(), "NextStepIssued");
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let mut sink = CollectingSink::default();
        let completed = RuntimeEvent::MissionRunCompleted(RunCompletedPayload {
            run_id: "run-1".to_string(),
            mission_key: "m".to_string(),
            actor: ActorIdentity::new(ActorType::Llm, "agent-1"),
        });
        let issued = RuntimeEvent::NextStepIssued(StepIssuedPayload {
            run_id: "run-1".to_string(),
            step_id: "s".to_string(),
            actor: ActorIdentity::new(ActorType::Llm, "agent-1"),
        });
        sink.emit("t1", &issued).expect("emit");
        sink.emit("t2", &completed).expect("emit");
        assert_eq!(
            sink.event_types(),
            vec!["NextStepIssued", "MissionRunCompleted"]
        );
        NullSink
            .emit("t3", &completed)
            .expect("null sink accepts events");
    }
}
