//! File-backed run store.
//!
//! Layout under the store root:
//!
//! ```text
//! <run-id>/state.json     run snapshot (pretty JSON, atomic replace)
//! <run-id>/mission.json   frozen mission definition
//! <run-id>/policy.toml    frozen policy snapshot
//! <run-id>/events.jsonl   append-only event log
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::debug;

use crate::core::mission::MissionTemplate;
use crate::core::policy::PolicySnapshot;
use crate::core::snapshot::RunSnapshot;
use crate::io::config::{load_policy, write_policy};
use crate::io::mission_store::{load_mission, write_mission};

/// Paths for one run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub mission_path: PathBuf,
    pub policy_path: PathBuf,
    pub events_path: PathBuf,
}

impl RunPaths {
    pub fn new(store: &Path, run_id: &str) -> Self {
        let dir = store.join(run_id);
        Self {
            dir: dir.clone(),
            state_path: dir.join("state.json"),
            mission_path: dir.join("mission.json"),
            policy_path: dir.join("policy.toml"),
            events_path: dir.join("events.jsonl"),
        }
    }

    pub fn exists(&self) -> bool {
        self.state_path.exists()
    }
}

/// Everything persisted for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub snapshot: RunSnapshot,
    pub template: MissionTemplate,
    pub policy: PolicySnapshot,
}

/// Validate a run id: non-empty, `[A-Za-z0-9._-]` only.
pub fn validate_run_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("run id must not be empty"));
    }
    if id.contains('/') {
        return Err(anyhow!("run id must not contain '/'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("run id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

/// Pick a run id from `base` that is not yet used in `store`.
pub fn unique_run_id(store: &Path, base: &str) -> Result<String> {
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.to_string()
        } else {
            format!("{base}-{suffix}")
        };
        validate_run_id(&id)?;
        if !store.join(&id).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to generate unique run id from base '{base}' (too many existing runs)"
    ))
}

/// Create a new run directory with frozen mission, policy and initial state.
pub fn create_run(store: &Path, run: &StoredRun) -> Result<RunPaths> {
    validate_run_id(&run.snapshot.run_id)?;
    let paths = RunPaths::new(store, &run.snapshot.run_id);
    if paths.dir.exists() {
        bail!(
            "run '{}' already exists at {}",
            run.snapshot.run_id,
            paths.dir.display()
        );
    }
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run directory {}", paths.dir.display()))?;
    write_mission(&paths.mission_path, &run.template)?;
    write_policy(&paths.policy_path, &run.policy)?;
    write_snapshot(&paths.state_path, &run.snapshot)?;
    debug!(run_id = %run.snapshot.run_id, dir = %paths.dir.display(), "run created");
    Ok(paths)
}

/// Load snapshot, frozen mission and frozen policy for `run_id`.
pub fn load_run(store: &Path, run_id: &str) -> Result<(RunPaths, StoredRun)> {
    validate_run_id(run_id)?;
    let paths = RunPaths::new(store, run_id);
    if !paths.exists() {
        bail!("run '{run_id}' not found in {}", store.display());
    }
    let snapshot = load_snapshot(&paths.state_path)?;
    if snapshot.run_id != run_id {
        bail!(
            "run state {} belongs to run '{}'",
            paths.state_path.display(),
            snapshot.run_id
        );
    }
    let policy = load_policy(&paths.policy_path)?;
    let template = load_mission(&paths.mission_path, &policy.routing_table()?)?;
    Ok((
        paths,
        StoredRun {
            snapshot,
            template,
            policy,
        },
    ))
}

/// Load a run snapshot from disk.
pub fn load_snapshot(path: &Path) -> Result<RunSnapshot> {
    debug!(path = %path.display(), "loading run state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let snapshot: RunSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    let errors = snapshot.check();
    if !errors.is_empty() {
        bail!(
            "run state {} is inconsistent:\n- {}",
            path.display(),
            errors.join("\n- ")
        );
    }
    Ok(snapshot)
}

/// Atomically write a run snapshot to disk (temp file + rename).
pub fn write_snapshot(path: &Path, snapshot: &RunSnapshot) -> Result<()> {
    debug!(
        path = %path.display(),
        run_id = %snapshot.run_id,
        completed = snapshot.completed_steps.len(),
        pending = snapshot.pending_decisions.len(),
        "writing run state"
    );
    let mut buf = serde_json::to_string_pretty(snapshot)?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mission, owner_snapshot, prompt_step};

    fn stored() -> StoredRun {
        StoredRun {
            snapshot: owner_snapshot(),
            template: mission(vec![prompt_step("a", &[])], Vec::new()),
            policy: PolicySnapshot::default(),
        }
    }

    /// Verifies create → load preserves snapshot, mission and policy.
    #[test]
    fn create_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = stored();
        let paths = create_run(temp.path(), &run).expect("create");
        assert!(paths.mission_path.exists());
        assert!(paths.policy_path.exists());

        let (_, loaded) = load_run(temp.path(), "run-1").expect("load");
        assert_eq!(loaded, run);
    }

    #[test]
    fn create_refuses_existing_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        create_run(temp.path(), &stored()).expect("create");
        let err = create_run(temp.path(), &stored()).expect_err("duplicate");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn unique_run_id_appends_suffix() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(unique_run_id(temp.path(), "run-x").expect("id"), "run-x");
        fs::create_dir_all(temp.path().join("run-x")).expect("mkdir");
        fs::create_dir_all(temp.path().join("run-x-2")).expect("mkdir");
        assert_eq!(unique_run_id(temp.path(), "run-x").expect("id"), "run-x-3");
    }

    #[test]
    fn validate_run_id_rejects_path_characters() {
        let err = validate_run_id("bad/id").expect_err("slash");
        assert!(err.to_string().contains("must not contain"));
        assert!(validate_run_id("run 1").is_err());
        assert!(validate_run_id("").is_err());
    }

    /// Ensures the state file is stable pretty JSON with a trailing newline.
    #[test]
    fn snapshot_file_is_deterministic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        write_snapshot(&path, &RunSnapshot::new("run-1", "m")).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        let expected = r#"{
  "run_id": "run-1",
  "mission_key": "m",
  "completed_steps": [],
  "pending_decisions": {},
  "blocked_reason": null,
  "issued_step_id": null,
  "inputs": {},
  "decisions": {},
  "template_path": null,
  "template_hash": null
}
"#;
        assert_eq!(contents, expected);
    }
}
