//! RACI authority kernel.
//!
//! Resolves who is Responsible, Accountable, Consulted and Informed for a
//! step, either from an explicit declaration or from the fixed inference
//! table, and validates acting parties against a resolved binding.
//!
//! Invariant: `accountable` is always a human. A blocking audit step always
//! has a human `responsible`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::RuntimeError;
use crate::core::mission::StepRef;
use crate::core::types::{Actor, ActorIdentity, ActorType, AuthorityRole};

/// Input key holding the human mission owner's id.
pub const MISSION_OWNER_INPUT: &str = "mission_owner_id";
/// Input key holding the executing agent's id.
pub const AGENT_INPUT: &str = "agent_id";
/// Input key holding the service principal's id.
pub const SERVICE_INPUT: &str = "service_id";
/// Agent id used when the inputs do not name one.
pub const DEFAULT_AGENT_ID: &str = "runtime-agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaciSource {
    Inferred,
    Explicit,
}

impl fmt::Display for RaciSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RaciSource::Inferred => "inferred",
            RaciSource::Explicit => "explicit",
        })
    }
}

/// Row of the inference table that produced an inferred binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredRule {
    PromptDefault,
    AuditBlocking,
    AuditAdvisory,
}

/// RACI block declared on a step in the mission definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaciDeclaration {
    pub responsible: Actor,
    pub accountable: Actor,
    #[serde(default)]
    pub consulted: Vec<Actor>,
    #[serde(default)]
    pub informed: Vec<Actor>,
}

/// Role assignment for one step. Persisted under `raci:<step_id>` when the
/// step is issued and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaciBinding {
    pub step_id: String,
    pub responsible: Actor,
    pub accountable: Actor,
    #[serde(default)]
    pub consulted: Vec<Actor>,
    #[serde(default)]
    pub informed: Vec<Actor>,
    pub source: RaciSource,
    #[serde(default)]
    pub inferred_rule: Option<InferredRule>,
    #[serde(default)]
    pub override_reason: Option<String>,
}

impl RaciBinding {
    /// Structural checks on a binding: human accountable and a provenance
    /// field matching the source.
    pub fn check(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.accountable.is_human() {
            errors.push(format!(
                "accountable must be human, got '{}'",
                self.accountable.actor_type
            ));
        }
        match self.source {
            RaciSource::Explicit => {
                if !has_text(self.override_reason.as_deref()) {
                    errors.push(
                        "explicit binding requires a non-empty override_reason".to_string(),
                    );
                }
                if self.inferred_rule.is_some() {
                    errors.push("explicit binding must not carry an inferred_rule".to_string());
                }
            }
            RaciSource::Inferred => {
                if self.inferred_rule.is_none() {
                    errors.push("inferred binding requires an inferred_rule".to_string());
                }
                if self.override_reason.is_some() {
                    errors.push("inferred binding must not carry an override_reason".to_string());
                }
            }
        }
        errors
    }

    fn actors_for(&self, role: AuthorityRole) -> Vec<&Actor> {
        match role {
            AuthorityRole::Responsible => vec![&self.responsible],
            AuthorityRole::Accountable => vec![&self.accountable],
            AuthorityRole::Consulted => self.consulted.iter().collect(),
            AuthorityRole::Informed => self.informed.iter().collect(),
        }
    }
}

/// Structured description of a required role that could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaciEscalation {
    pub run_id: String,
    pub step_id: String,
    pub decision_id: Option<String>,
    pub unresolved_role: AuthorityRole,
    pub actor_type_expected: ActorType,
    pub reason: String,
    pub resolution_hint: String,
}

/// Audited record of an actor refused authority over a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDenial {
    pub run_id: String,
    pub decision_id: String,
    pub step_id: String,
    pub actor: ActorIdentity,
    pub authority_role: AuthorityRole,
    pub expected: Vec<Actor>,
    pub rationale: String,
    pub raci_source: RaciSource,
    pub override_reason: Option<String>,
}

/// Infer a binding from the step kind. Actor ids are left unbound.
///
/// | kind                      | responsible | accountable |
/// |---------------------------|-------------|-------------|
/// | ordinary                  | llm         | human       |
/// | audit, blocking           | human       | human       |
/// | audit, advisory           | llm         | human       |
pub fn infer_raci(step: StepRef<'_>) -> RaciBinding {
    let (rule, responsible) = match step {
        StepRef::Ordinary(_) => (InferredRule::PromptDefault, ActorType::Llm),
        StepRef::Audit(audit) if audit.is_blocking() => {
            (InferredRule::AuditBlocking, ActorType::Human)
        }
        StepRef::Audit(_) => (InferredRule::AuditAdvisory, ActorType::Llm),
    };
    RaciBinding {
        step_id: step.id().to_string(),
        responsible: Actor::placeholder(responsible),
        accountable: Actor::placeholder(ActorType::Human),
        consulted: Vec::new(),
        informed: Vec::new(),
        source: RaciSource::Inferred,
        inferred_rule: Some(rule),
        override_reason: None,
    }
}

/// Validate an explicit declaration for a step. Returns every problem found.
pub fn validate_declaration(
    step: StepRef<'_>,
    declaration: &RaciDeclaration,
    override_reason: Option<&str>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if !declaration.accountable.is_human() {
        errors.push(format!(
            "accountable must be human, got '{}'",
            declaration.accountable.actor_type
        ));
    }
    if let StepRef::Audit(audit) = step
        && audit.is_blocking()
        && !declaration.responsible.is_human()
    {
        errors.push(format!(
            "blocking audit requires a human responsible, got '{}'",
            declaration.responsible.actor_type
        ));
    }
    if !has_text(override_reason) {
        errors.push("explicit raci requires a non-empty raci_override_reason".to_string());
    }
    errors
}

/// Resolve the binding for `step`, binding placeholder ids from `inputs`.
///
/// Fails closed with [`RuntimeError::UnresolvedRole`] when `responsible` or
/// `accountable` cannot be bound. Consulted and informed entries that cannot
/// be bound are dropped.
pub fn resolve_raci(
    run_id: &str,
    step: StepRef<'_>,
    inputs: &BTreeMap<String, Value>,
) -> Result<RaciBinding, RuntimeError> {
    let unresolved = match step.raci() {
        Some(declaration) => {
            let errors = validate_declaration(step, declaration, step.raci_override_reason());
            if !errors.is_empty() {
                return Err(RuntimeError::InvalidRaci {
                    step_id: step.id().to_string(),
                    errors,
                });
            }
            RaciBinding {
                step_id: step.id().to_string(),
                responsible: declaration.responsible.clone(),
                accountable: declaration.accountable.clone(),
                consulted: declaration.consulted.clone(),
                informed: declaration.informed.clone(),
                source: RaciSource::Explicit,
                inferred_rule: None,
                override_reason: step.raci_override_reason().map(|r| r.trim().to_string()),
            }
        }
        None => infer_raci(step),
    };

    let escalate = |role: AuthorityRole, expected: ActorType| {
        let key = input_key_for(expected);
        RuntimeError::UnresolvedRole(Box::new(RaciEscalation {
            run_id: run_id.to_string(),
            step_id: step.id().to_string(),
            decision_id: step.decision_id(),
            unresolved_role: role,
            actor_type_expected: expected,
            reason: format!("Cannot resolve {role} actor: '{key}' not found in inputs"),
            resolution_hint: format!("Provide '{key}' in mission inputs"),
        }))
    };

    let responsible = bind_actor(&unresolved.responsible, inputs).ok_or_else(|| {
        escalate(
            AuthorityRole::Responsible,
            unresolved.responsible.actor_type,
        )
    })?;
    let accountable = bind_actor(&unresolved.accountable, inputs).ok_or_else(|| {
        escalate(
            AuthorityRole::Accountable,
            unresolved.accountable.actor_type,
        )
    })?;
    let consulted = bind_optional(&unresolved.consulted, inputs);
    let informed = bind_optional(&unresolved.informed, inputs);

    debug!(
        step_id = step.id(),
        source = %unresolved.source,
        responsible = responsible.actor_id.as_deref().unwrap_or_default(),
        accountable = accountable.actor_id.as_deref().unwrap_or_default(),
        "resolved RACI binding"
    );

    Ok(RaciBinding {
        responsible,
        accountable,
        consulted,
        informed,
        ..unresolved
    })
}

/// Check that `actor` holds `role` in `binding`.
///
/// Denials carry the full record; the caller is expected to audit them.
pub fn validate_actor(
    run_id: &str,
    decision_id: &str,
    binding: &RaciBinding,
    actor: &ActorIdentity,
    role: AuthorityRole,
) -> Result<(), Box<AuthorityDenial>> {
    let expected = binding.actors_for(role);
    let matches = expected.iter().any(|holder| {
        holder.actor_type == actor.actor_type
            && holder.actor_id.as_deref() == Some(actor.actor_id.as_str())
    });
    if matches {
        return Ok(());
    }

    let rationale = match expected.as_slice() {
        [] => format!(
            "no actor holds the {role} role for step '{}'",
            binding.step_id
        ),
        [holder] if holder.actor_type != actor.actor_type => format!(
            "{role} role requires a {} actor, got {}",
            holder.actor_type, actor.actor_type
        ),
        [holder] => format!(
            "{role} role is bound to '{}', got '{}'",
            holder.actor_id.as_deref().unwrap_or("<unbound>"),
            actor.actor_id
        ),
        _ => format!("actor '{}' is not among the {role} actors", actor.actor_id),
    };
    warn!(
        decision_id,
        actor_id = %actor.actor_id,
        actor_type = %actor.actor_type,
        role = %role,
        "authority denied"
    );
    Err(Box::new(AuthorityDenial {
        run_id: run_id.to_string(),
        decision_id: decision_id.to_string(),
        step_id: binding.step_id.clone(),
        actor: actor.clone(),
        authority_role: role,
        expected: expected.into_iter().cloned().collect(),
        rationale,
        raci_source: binding.source,
        override_reason: binding.override_reason.clone(),
    }))
}

/// The agent driving the run: `agent_id` from inputs, else
/// [`DEFAULT_AGENT_ID`].
pub fn agent_identity(inputs: &BTreeMap<String, Value>) -> ActorIdentity {
    let id = lookup_input(inputs, AGENT_INPUT).unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());
    ActorIdentity::new(ActorType::Llm, id)
}

fn input_key_for(actor_type: ActorType) -> &'static str {
    match actor_type {
        ActorType::Human => MISSION_OWNER_INPUT,
        ActorType::Llm => AGENT_INPUT,
        ActorType::Service => SERVICE_INPUT,
    }
}

/// Actor ids bind only from non-empty strings.
fn lookup_input(inputs: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    let text = inputs.get(key)?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn bind_actor(actor: &Actor, inputs: &BTreeMap<String, Value>) -> Option<Actor> {
    if let Some(id) = actor.actor_id.as_deref().map(str::trim)
        && !id.is_empty()
    {
        return Some(Actor::bound(actor.actor_type, id));
    }
    let id = lookup_input(inputs, input_key_for(actor.actor_type)).or_else(|| {
        (actor.actor_type == ActorType::Llm).then(|| DEFAULT_AGENT_ID.to_string())
    })?;
    Some(Actor::bound(actor.actor_type, id))
}

fn bind_optional(actors: &[Actor], inputs: &BTreeMap<String, Value>) -> Vec<Actor> {
    actors
        .iter()
        .filter_map(|actor| bind_actor(actor, inputs))
        .collect()
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}
