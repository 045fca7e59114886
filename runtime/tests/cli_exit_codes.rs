//! CLI tests for the `mission` binary.
//!
//! Spawns the binary and verifies exit codes for each kind of planned
//! decision and for invalid input.

use std::path::Path;
use std::process::{Command, Output};

use mission_runtime::core::mission::MissionTemplate;
use mission_runtime::exit_codes;
use mission_runtime::io::mission_store::write_mission;
use mission_runtime::test_support::{OWNER_ID, audit_step, mission, prompt_step};

fn mission_cmd(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mission"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run mission")
}

fn write_template(dir: &Path, template: &MissionTemplate) {
    write_mission(&dir.join("mission.json"), template).expect("write mission");
}

fn start(dir: &Path, with_owner: bool) -> Output {
    let owner = format!("mission_owner_id={OWNER_ID}");
    let mut args = vec![
        "start",
        "--mission",
        "mission.json",
        "--run-id",
        "r1",
        "--actor-id",
        OWNER_ID,
    ];
    if with_owner {
        args.extend(["--input", owner.as_str()]);
    }
    mission_cmd(dir, &args)
}

#[test]
fn next_exit_codes_follow_decision_kind() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_template(
        temp.path(),
        &mission(
            vec![prompt_step("a", &[])],
            vec![audit_step("review", &["a"], true)],
        ),
    );

    let started = start(temp.path(), true);
    assert_eq!(started.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&started.stdout).trim(), "r1");

    let step = mission_cmd(temp.path(), &["next", "--run", "r1"]);
    assert_eq!(step.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&step.stdout).contains("# Next Step: a"));

    let gate = mission_cmd(
        temp.path(),
        &[
            "next",
            "--run",
            "r1",
            "--complete",
            "a",
            "--result",
            "success",
            "--format",
            "json",
        ],
    );
    assert_eq!(gate.status.code(), Some(exit_codes::DECISION_REQUIRED));
    assert!(String::from_utf8_lossy(&gate.stdout).contains(r#""decision_id":"audit:review""#));

    let answered = mission_cmd(
        temp.path(),
        &[
            "answer",
            "--run",
            "r1",
            "--decision",
            "audit:review",
            "--answer",
            "approve",
            "--actor-id",
            OWNER_ID,
        ],
    );
    assert_eq!(answered.status.code(), Some(exit_codes::OK));

    let done = mission_cmd(temp.path(), &["next", "--run", "r1"]);
    assert_eq!(done.status.code(), Some(exit_codes::TERMINAL));
}

#[test]
fn failed_step_exits_blocked() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_template(
        temp.path(),
        &mission(vec![prompt_step("a", &[])], Vec::new()),
    );
    start(temp.path(), true);
    mission_cmd(temp.path(), &["next", "--run", "r1"]);

    let blocked = mission_cmd(
        temp.path(),
        &[
            "next",
            "--run",
            "r1",
            "--complete",
            "a",
            "--result",
            "failed",
        ],
    );
    assert_eq!(blocked.status.code(), Some(exit_codes::BLOCKED));
}

#[test]
fn unresolved_owner_exits_blocked_with_escalation() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_template(
        temp.path(),
        &mission(vec![prompt_step("a", &[])], Vec::new()),
    );
    start(temp.path(), false);

    let output = mission_cmd(temp.path(), &["next", "--run", "r1"]);
    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    assert!(String::from_utf8_lossy(&output.stdout).contains("mission_owner_id"));
}

#[test]
fn invalid_mission_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_template(
        temp.path(),
        &mission(vec![prompt_step("a", &["ghost"])], Vec::new()),
    );

    let output = mission_cmd(temp.path(), &["validate", "--mission", "mission.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown step 'ghost'"));
}

#[test]
fn evaluate_prints_effective_band() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = mission_cmd(
        temp.path(),
        &[
            "evaluate",
            "--dimension",
            "user_customer_impact=1",
            "--dimension",
            "architectural_system_impact=1",
            "--dimension",
            "data_security_compliance_impact=0",
            "--dimension",
            "operational_reliability_impact=0",
            "--dimension",
            "financial_commercial_impact=0",
            "--dimension",
            "cross_team_blast_radius=0",
            "--hard-trigger",
            "security_privacy_access_control",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#""band":"low""#));
    assert!(stdout.contains(r#""effective_band":"high""#));
}

#[test]
fn edited_mission_file_exits_blocked() {
    let temp = tempfile::tempdir().expect("tempdir");
    let template = mission(vec![prompt_step("a", &[])], Vec::new());
    write_template(temp.path(), &template);
    start(temp.path(), true);

    let edited = mission(
        vec![prompt_step("a", &[]), prompt_step("b", &["a"])],
        Vec::new(),
    );
    write_template(temp.path(), &edited);
    let output = mission_cmd(temp.path(), &["next", "--run", "r1"]);
    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .contains("Template changed during active run. Migration required.")
    );
}
