//! Mission definition loading (JSON) with semantic validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::invariants::validate_mission;
use crate::core::mission::MissionTemplate;
use crate::core::policy::RoutingTable;

/// Read, parse and validate a mission definition.
pub fn load_mission(path: &Path, table: &RoutingTable) -> Result<MissionTemplate> {
    debug!(path = %path.display(), "loading mission");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_mission(&contents, table).with_context(|| format!("load mission {}", path.display()))
}

/// Parse a mission definition and check its invariants.
pub fn parse_mission(contents: &str, table: &RoutingTable) -> Result<MissionTemplate> {
    let template: MissionTemplate = serde_json::from_str(contents).context("parse mission json")?;
    let errors = validate_mission(&template, table);
    if !errors.is_empty() {
        bail!("invariant violations:\n- {}", errors.join("\n- "));
    }
    debug!(
        mission_key = %template.mission.key,
        steps = template.steps.len(),
        audit_steps = template.audit_steps.len(),
        "mission loaded"
    );
    Ok(template)
}

/// Hex sha256 of the mission file bytes.
pub fn mission_digest(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}

/// Write a mission definition as pretty JSON.
pub fn write_mission(path: &Path, template: &MissionTemplate) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(template).context("serialize mission json")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{audit_step, mission, prompt_step};

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mission.json");
        let template = mission(
            vec![prompt_step("a", &[])],
            vec![audit_step("gate", &["a"], true)],
        );
        write_mission(&path, &template).expect("write");
        let loaded = load_mission(&path, &RoutingTable::default()).expect("load");
        assert_eq!(loaded, template);
    }

    #[test]
    fn digest_tracks_file_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mission.json");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            mission_digest(&path).expect("digest"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        fs::write(&path, "abd").expect("write");
        assert_ne!(
            mission_digest(&path).expect("digest"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(mission_digest(&temp.path().join("missing.json")).is_err());
    }

    #[test]
    fn invariant_violations_are_listed() {
        let raw = r#"{
            "mission": {"key": "m", "name": "M"},
            "steps": [
                {"id": "a", "title": "A", "depends_on": ["ghost"]},
                {"id": "a", "title": "A again"}
            ]
        }"#;
        let err = parse_mission(raw, &RoutingTable::default()).expect_err("invalid");
        let text = format!("{err:#}");
        assert!(text.contains("duplicate step id 'a'"), "{text}");
        assert!(text.contains("unknown step 'ghost'"), "{text}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let raw = r#"{
            "mission": {"key": "m", "name": "M"},
            "steps": [{"id": "a", "title": "A", "owner": "x"}]
        }"#;
        assert!(parse_mission(raw, &RoutingTable::default()).is_err());
    }
}
