//! Significance evaluation: dimension scores to composite, band and
//! effective band.
//!
//! Pure function. No I/O, no clock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::RuntimeError;
use crate::core::policy::{
    BandName, DIMENSIONS, Dimension, HardTriggerClass, MAX_DIMENSION_SCORE, RoutingTable,
    resolve_hard_triggers,
};

/// Immutable result of one evaluation, persisted under `significance:<decision_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignificanceScore {
    /// Keyed by dimension; serializes sorted by name.
    pub dimensions: BTreeMap<Dimension, u8>,
    pub composite: u32,
    pub band: BandName,
    pub hard_trigger_classes: Vec<HardTriggerClass>,
    pub effective_band: BandName,
}

impl SignificanceScore {
    pub fn has_hard_trigger(&self) -> bool {
        !self.hard_trigger_classes.is_empty()
    }

    /// Consistency checks against `table`; empty when the score is coherent.
    pub fn check(&self, table: &RoutingTable) -> Vec<String> {
        let mut errors = Vec::new();
        if self.dimensions.len() != DIMENSIONS.len() {
            errors.push(format!(
                "expected {} dimensions, got {}",
                DIMENSIONS.len(),
                self.dimensions.len()
            ));
        }
        let sum: u32 = self.dimensions.values().copied().map(u32::from).sum();
        if sum != self.composite {
            errors.push(format!("composite {} != dimension sum {sum}", self.composite));
        }
        if table.band_for(self.composite) != Some(self.band) {
            errors.push(format!(
                "band '{}' does not contain composite {}",
                self.band, self.composite
            ));
        }
        let expected_effective = if self.has_hard_trigger() {
            table.highest()
        } else {
            self.band
        };
        if self.effective_band != expected_effective {
            errors.push(format!(
                "effective_band '{}' should be '{expected_effective}'",
                self.effective_band
            ));
        }
        errors
    }
}

/// Evaluate with optional custom band cutoffs (validated here).
pub fn evaluate(
    dimension_scores: &BTreeMap<String, i64>,
    hard_trigger_ids: &[String],
    band_cutoffs: Option<&BTreeMap<String, Vec<i64>>>,
) -> Result<SignificanceScore, RuntimeError> {
    let table = match band_cutoffs {
        Some(cutoffs) => RoutingTable::from_cutoffs(cutoffs)?,
        None => RoutingTable::default(),
    };
    evaluate_with_table(dimension_scores, hard_trigger_ids, &table)
}

/// Evaluate against an already validated routing table.
pub fn evaluate_with_table(
    dimension_scores: &BTreeMap<String, i64>,
    hard_trigger_ids: &[String],
    table: &RoutingTable,
) -> Result<SignificanceScore, RuntimeError> {
    let dimensions = validate_dimensions(dimension_scores)?;
    let composite: u32 = dimensions.values().map(|score| u32::from(*score)).sum();
    let band = table.band_for(composite).ok_or_else(|| {
        RuntimeError::InvalidBandCutoffs(format!("no band contains composite {composite}"))
    })?;

    let mut hard_trigger_classes = resolve_hard_triggers(hard_trigger_ids)?;
    hard_trigger_classes.sort_unstable();
    hard_trigger_classes.dedup();

    let effective_band = if hard_trigger_classes.is_empty() {
        band
    } else {
        table.highest()
    };
    debug!(
        composite,
        band = %band,
        effective_band = %effective_band,
        hard_triggers = hard_trigger_classes.len(),
        "evaluated significance"
    );

    Ok(SignificanceScore {
        dimensions,
        composite,
        band,
        hard_trigger_classes,
        effective_band,
    })
}

/// Exactly the six fixed dimensions, each within `0..=3`.
fn validate_dimensions(
    scores: &BTreeMap<String, i64>,
) -> Result<BTreeMap<Dimension, u8>, RuntimeError> {
    let missing: Vec<&str> = DIMENSIONS
        .iter()
        .map(|dim| dim.as_str())
        .filter(|name| !scores.contains_key(*name))
        .collect();
    let unexpected: Vec<&str> = scores
        .keys()
        .map(String::as_str)
        .filter(|name| Dimension::from_name(name).is_none())
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(RuntimeError::InvalidDimensions(format!(
            "must contain exactly {} dimensions; missing: [{}], unexpected: [{}]",
            DIMENSIONS.len(),
            missing.join(", "),
            unexpected.join(", ")
        )));
    }

    let out_of_range: Vec<String> = scores
        .iter()
        .filter(|(_, score)| !(0..=MAX_DIMENSION_SCORE).contains(*score))
        .map(|(name, score)| format!("'{name}'={score}"))
        .collect();
    if !out_of_range.is_empty() {
        return Err(RuntimeError::InvalidDimensions(format!(
            "scores must be 0-{MAX_DIMENSION_SCORE}, got {}",
            out_of_range.join(", ")
        )));
    }

    Ok(scores
        .iter()
        .filter_map(|(name, score)| Some((Dimension::from_name(name)?, u8::try_from(*score).ok()?)))
        .collect())
}
