//! Routing policy stored as TOML (`policy.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::policy::PolicySnapshot;

/// Load policy from a TOML file and validate it.
///
/// If the file is missing, returns `PolicySnapshot::default()`.
pub fn load_policy(path: &Path) -> Result<PolicySnapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "policy file missing; using defaults");
        let policy = PolicySnapshot::default();
        policy.validate()?;
        return Ok(policy);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_policy(&contents).with_context(|| format!("load policy {}", path.display()))
}

/// Parse and validate policy TOML.
pub fn parse_policy(contents: &str) -> Result<PolicySnapshot> {
    let policy: PolicySnapshot = toml::from_str(contents).context("parse policy toml")?;
    policy.validate()?;
    Ok(policy)
}

/// Atomically write policy to disk (temp file + rename).
pub fn write_policy(path: &Path, policy: &PolicySnapshot) -> Result<()> {
    policy.validate()?;
    let mut buf = toml::to_string_pretty(policy).context("serialize policy toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
