//! Semantic invariants of a mission definition that serde alone cannot enforce.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::core::mission::{MissionTemplate, StepRef};
use crate::core::policy::RoutingTable;
use crate::core::raci::validate_declaration;
use crate::core::significance::evaluate_with_table;

/// Check semantic invariants of a mission definition:
/// - At least one step, non-empty key and ids
/// - No duplicate ids across ordinary and audit steps
/// - `depends_on` resolves, never names the step itself, and has no cycles
/// - `raci` and `raci_override_reason` appear together, and explicit RACI
///   passes the authority rules
/// - Significance declarations evaluate under `table`
pub fn validate_mission(template: &MissionTemplate, table: &RoutingTable) -> Vec<String> {
    let mut errors = Vec::new();
    if template.mission.key.trim().is_empty() {
        errors.push("mission.key must not be empty".to_string());
    }

    let sequence = template.sequence();
    if sequence.is_empty() {
        errors.push("mission must declare at least one step".to_string());
        return errors;
    }

    let mut seen = HashSet::new();
    for step in &sequence {
        if step.id().trim().is_empty() {
            errors.push("step id must not be empty".to_string());
        } else if !seen.insert(step.id()) {
            errors.push(format!("duplicate step id '{}'", step.id()));
        }
    }

    for step in &sequence {
        validate_step(*step, &seen, table, &mut errors);
    }

    if let Some(cycle) = find_cycle(&sequence) {
        errors.push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }
    errors
}

fn validate_step(
    step: StepRef<'_>,
    ids: &HashSet<&str>,
    table: &RoutingTable,
    errors: &mut Vec<String>,
) {
    let id = step.id();
    for dep in step.depends_on() {
        if dep == id {
            errors.push(format!("{id}: depends on itself"));
        } else if !ids.contains(dep.as_str()) {
            errors.push(format!("{id}: depends_on references unknown step '{dep}'"));
        }
    }

    match (step.raci(), step.raci_override_reason()) {
        (Some(declaration), reason) => {
            for problem in validate_declaration(step, declaration, reason) {
                errors.push(format!("{id}: {problem}"));
            }
        }
        (None, Some(_)) => {
            errors.push(format!("{id}: raci_override_reason given without raci"));
        }
        (None, None) => {}
    }

    if let StepRef::Audit(audit) = step
        && let Some(significance) = &audit.significance
    {
        let dimensions = &significance.dimensions;
        if let Err(err) = evaluate_with_table(dimensions, &significance.hard_triggers, table) {
            errors.push(format!("{id}: {err}"));
        }
        if let Some(secs) = significance.timeout_seconds
            && secs <= 0
        {
            errors.push(format!("{id}: significance.timeout_seconds must be > 0, got {secs}"));
        }
    }
}

/// Depth-first search over `depends_on` edges; returns the first cycle found
/// as a closed path of step ids.
fn find_cycle(sequence: &[StepRef<'_>]) -> Option<Vec<String>> {
    let edges: BTreeMap<&str, &[String]> = sequence
        .iter()
        .map(|step| (step.id(), step.depends_on()))
        .collect();

    let mut done = BTreeSet::new();
    for step in sequence {
        let mut path = Vec::new();
        if let Some(cycle) = visit(step.id(), &edges, &mut path, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    id: &'a str,
    edges: &BTreeMap<&'a str, &'a [String]>,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|seen| *seen == id) {
        let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
        cycle.push(id.to_string());
        return Some(cycle);
    }
    if done.contains(id) {
        return None;
    }
    path.push(id);
    for dep in edges.get(id).copied().unwrap_or_default() {
        // Self-dependencies and unknown ids are reported separately.
        if dep == id || !edges.contains_key(dep.as_str()) {
            continue;
        }
        if let Some(cycle) = visit(dep, edges, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(id);
    None
}
