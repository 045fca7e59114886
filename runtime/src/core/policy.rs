//! Routing policy value types: significance dimensions, routing bands,
//! hard-trigger classes, timeout policy and the policy snapshot.
//!
//! The dimension set and hard-trigger registry are fixed compile-time tables.
//! Band cutoffs may be overridden per policy but must always partition the
//! full composite range `0..=18` into exactly three contiguous bands.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::RuntimeError;

/// Highest score a single dimension may carry.
pub const MAX_DIMENSION_SCORE: i64 = 3;

/// Highest possible composite score (six dimensions at 3).
pub const MAX_COMPOSITE_SCORE: u32 = 18;

/// Timeout applied to significance gates when the policy is silent.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// One of the six fixed impact dimensions.
///
/// Variants are declared in name order so the derived `Ord` matches the
/// lexicographic order of their serialized names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    ArchitecturalSystemImpact,
    CrossTeamBlastRadius,
    DataSecurityComplianceImpact,
    FinancialCommercialImpact,
    OperationalReliabilityImpact,
    UserCustomerImpact,
}

/// All dimensions, sorted by name.
pub const DIMENSIONS: [Dimension; 6] = [
    Dimension::ArchitecturalSystemImpact,
    Dimension::CrossTeamBlastRadius,
    Dimension::DataSecurityComplianceImpact,
    Dimension::FinancialCommercialImpact,
    Dimension::OperationalReliabilityImpact,
    Dimension::UserCustomerImpact,
];

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::ArchitecturalSystemImpact => "architectural_system_impact",
            Dimension::CrossTeamBlastRadius => "cross_team_blast_radius",
            Dimension::DataSecurityComplianceImpact => "data_security_compliance_impact",
            Dimension::FinancialCommercialImpact => "financial_commercial_impact",
            Dimension::OperationalReliabilityImpact => "operational_reliability_impact",
            Dimension::UserCustomerImpact => "user_customer_impact",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DIMENSIONS.into_iter().find(|dim| dim.as_str() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Significance tier. Ordered from least to most significant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BandName {
    Low,
    Medium,
    High,
}

pub const BAND_NAMES: [BandName; 3] = [BandName::Low, BandName::Medium, BandName::High];

impl BandName {
    pub fn as_str(self) -> &'static str {
        match self {
            BandName::Low => "low",
            BandName::Medium => "medium",
            BandName::High => "high",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BAND_NAMES.into_iter().find(|band| band.as_str() == name)
    }
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingBand {
    pub name: BandName,
    pub min_score: u32,
    pub max_score: u32,
}

impl RoutingBand {
    pub fn contains(&self, composite: u32) -> bool {
        self.min_score <= composite && composite <= self.max_score
    }
}

pub const DEFAULT_BANDS: [RoutingBand; 3] = [
    RoutingBand {
        name: BandName::Low,
        min_score: 0,
        max_score: 6,
    },
    RoutingBand {
        name: BandName::Medium,
        min_score: 7,
        max_score: 11,
    },
    RoutingBand {
        name: BandName::High,
        min_score: 12,
        max_score: 18,
    },
];

/// Validated three-band table, ordered low, medium, high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTable {
    bands: [RoutingBand; 3],
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            bands: DEFAULT_BANDS,
        }
    }
}

impl RoutingTable {
    /// Build a table from `band name -> [min, max]` cutoffs after validating them.
    pub fn from_cutoffs(cutoffs: &BTreeMap<String, Vec<i64>>) -> Result<Self, RuntimeError> {
        validate_band_cutoffs(cutoffs)?;
        let mut bands = DEFAULT_BANDS;
        for band in &mut bands {
            // Validation guarantees every name maps to a two-element pair in range.
            let pair = &cutoffs[band.name.as_str()];
            band.min_score = pair[0] as u32;
            band.max_score = pair[1] as u32;
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[RoutingBand; 3] {
        &self.bands
    }

    /// Band whose `[min, max]` contains `composite`.
    pub fn band_for(&self, composite: u32) -> Option<BandName> {
        self.bands
            .iter()
            .find(|band| band.contains(composite))
            .map(|band| band.name)
    }

    pub fn highest(&self) -> BandName {
        self.bands[2].name
    }
}

/// Validate custom band cutoffs: exactly `low`, `medium`, `high`, each a
/// `[min, max]` pair with `min <= max`, `low` starting at 0, `high` ending at
/// 18, and each band starting right after the previous one ends.
pub fn validate_band_cutoffs(cutoffs: &BTreeMap<String, Vec<i64>>) -> Result<(), RuntimeError> {
    let invalid = |msg: String| Err(RuntimeError::InvalidBandCutoffs(msg));

    let provided: Vec<&str> = cutoffs.keys().map(String::as_str).collect();
    let expected_keys = ["high", "low", "medium"];
    if provided != expected_keys {
        return invalid(format!(
            "expected exactly 3 bands (low, medium, high), got: [{}]",
            provided.join(", ")
        ));
    }

    let mut previous: Option<(BandName, i64)> = None;
    for name in BAND_NAMES {
        let pair = &cutoffs[name.as_str()];
        let [lo, hi] = pair.as_slice() else {
            return invalid(format!(
                "band '{name}' must be a [min, max] pair, got {pair:?}"
            ));
        };
        let (lo, hi) = (*lo, *hi);
        if lo < 0 || hi > i64::from(MAX_COMPOSITE_SCORE) {
            return invalid(format!(
                "band '{name}' must lie within 0..={MAX_COMPOSITE_SCORE}, got [{lo}, {hi}]"
            ));
        }
        if lo > hi {
            return invalid(format!("band '{name}': min_score ({lo}) > max_score ({hi})"));
        }
        match previous {
            None if lo != 0 => {
                return invalid(format!("band '{name}' must start at 0, starts at {lo}"));
            }
            Some((prev_name, prev_hi)) if lo > prev_hi + 1 => {
                return invalid(format!(
                    "gap between band '{prev_name}' (max={prev_hi}) and '{name}' (min={lo})"
                ));
            }
            Some((prev_name, prev_hi)) if lo <= prev_hi => {
                return invalid(format!(
                    "overlap between band '{prev_name}' (max={prev_hi}) and '{name}' (min={lo})"
                ));
            }
            _ => {}
        }
        previous = Some((name, hi));
    }

    if let Some((name, hi)) = previous
        && hi != i64::from(MAX_COMPOSITE_SCORE)
    {
        return invalid(format!(
            "band '{name}' must end at {MAX_COMPOSITE_SCORE}, ends at {hi}"
        ));
    }
    Ok(())
}

/// One of the five fixed conditions that force the highest band.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HardTriggerClass {
    ProductionDataDestructive,
    SecurityPrivacyAccessControl,
    LegalComplianceRegulatory,
    BillingFinancialCommitment,
    ArchitectureFoundation,
}

pub const HARD_TRIGGER_CLASSES: [HardTriggerClass; 5] = [
    HardTriggerClass::ProductionDataDestructive,
    HardTriggerClass::SecurityPrivacyAccessControl,
    HardTriggerClass::LegalComplianceRegulatory,
    HardTriggerClass::BillingFinancialCommitment,
    HardTriggerClass::ArchitectureFoundation,
];

impl HardTriggerClass {
    pub fn class_id(self) -> &'static str {
        match self {
            HardTriggerClass::ProductionDataDestructive => "production_data_destructive",
            HardTriggerClass::SecurityPrivacyAccessControl => "security_privacy_access_control",
            HardTriggerClass::LegalComplianceRegulatory => "legal_compliance_regulatory",
            HardTriggerClass::BillingFinancialCommitment => "billing_financial_commitment",
            HardTriggerClass::ArchitectureFoundation => "architecture_foundation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            HardTriggerClass::ProductionDataDestructive => {
                "Production data-destructive or schema-impacting changes"
            }
            HardTriggerClass::SecurityPrivacyAccessControl => {
                "Security/privacy/access-control changes"
            }
            HardTriggerClass::LegalComplianceRegulatory => "Legal/compliance/regulatory impact",
            HardTriggerClass::BillingFinancialCommitment => "Billing/financial commitment changes",
            HardTriggerClass::ArchitectureFoundation => concat!(
                "Architecture-foundation changes ",
                "(language, framework, runtime, datastore, infrastructure)"
            ),
        }
    }

    /// Resolve a class id against the fixed registry.
    pub fn from_id(class_id: &str) -> Result<Self, RuntimeError> {
        HARD_TRIGGER_CLASSES
            .into_iter()
            .find(|class| class.class_id() == class_id)
            .ok_or_else(|| {
                let mut valid: Vec<&str> =
                    HARD_TRIGGER_CLASSES.iter().map(|c| c.class_id()).collect();
                valid.sort_unstable();
                RuntimeError::UnknownHardTrigger {
                    class_id: class_id.to_string(),
                    valid: valid.join(", "),
                }
            })
    }
}

/// Resolve every id, rejecting the first unknown one.
pub fn resolve_hard_triggers(class_ids: &[String]) -> Result<Vec<HardTriggerClass>, RuntimeError> {
    class_ids
        .iter()
        .map(|id| HardTriggerClass::from_id(id))
        .collect()
}

/// How long a significance gate may stay pending before the host reports a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    pub default_timeout_seconds: u64,
    pub per_decision_timeout_seconds: Option<u64>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            per_decision_timeout_seconds: None,
        }
    }
}

impl TimeoutPolicy {
    /// Both values, when present, must be strictly positive.
    pub fn new(
        default_seconds: i64,
        per_decision_seconds: Option<i64>,
    ) -> Result<Self, RuntimeError> {
        let default_timeout_seconds = positive_seconds("default_timeout_seconds", default_seconds)?;
        let per_decision_timeout_seconds = per_decision_seconds
            .map(|secs| positive_seconds("per_decision_timeout_seconds", secs))
            .transpose()?;
        Ok(Self {
            default_timeout_seconds,
            per_decision_timeout_seconds,
        })
    }

    pub fn effective_timeout_seconds(&self) -> u64 {
        self.per_decision_timeout_seconds
            .unwrap_or(self.default_timeout_seconds)
    }
}

fn positive_seconds(field: &str, value: i64) -> Result<u64, RuntimeError> {
    if value <= 0 {
        return Err(RuntimeError::InvalidTimeout(format!(
            "{field} must be > 0, got {value}"
        )));
    }
    Ok(value as u64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    Off,
    #[default]
    Medium,
    Max,
}

/// Policy in force for a run, persisted alongside the snapshot.
///
/// Absent fields mean "apply documented defaults"; present fields with an
/// invalid shape fail `validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySnapshot {
    pub strictness: Strictness,
    pub significance_default_timeout_seconds: Option<i64>,
    pub significance_band_cutoffs: Option<BTreeMap<String, Vec<i64>>>,
}

impl PolicySnapshot {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.routing_table()?;
        self.timeout_policy(None)?;
        Ok(())
    }

    pub fn routing_table(&self) -> Result<RoutingTable, RuntimeError> {
        match &self.significance_band_cutoffs {
            Some(cutoffs) => RoutingTable::from_cutoffs(cutoffs),
            None => Ok(RoutingTable::default()),
        }
    }

    pub fn timeout_policy(
        &self,
        per_decision_seconds: Option<i64>,
    ) -> Result<TimeoutPolicy, RuntimeError> {
        let default_seconds = self
            .significance_default_timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS as i64);
        TimeoutPolicy::new(default_seconds, per_decision_seconds)
    }
}
