//! Mission runtime host CLI.
//!
//! Keeps runs under a store directory (`.mission/runs` by default). Each
//! `next` call plans one decision and exits with a code describing it, so a
//! host loop can drive a mission without parsing output.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf, absolute};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use mission_runtime::core::canonical::to_canonical_json;
use mission_runtime::core::decision::AnswerRequest;
use mission_runtime::core::error::RuntimeError;
use mission_runtime::core::significance::evaluate_with_table;
use mission_runtime::core::types::{ActorIdentity, ActorType, NextDecision, StepResult};
use mission_runtime::engine::{Engine, StartOptions, StepReport};
use mission_runtime::exit_codes;
use mission_runtime::io::config::load_policy;
use mission_runtime::io::event_log::JsonlEventLog;
use mission_runtime::io::mission_store::load_mission;
use mission_runtime::io::render::{RenderFormat, render_decision};
use mission_runtime::io::run_state::RunPaths;
use mission_runtime::logging;

const DEFAULT_STORE: &str = ".mission/runs";
const DEFAULT_POLICY: &str = ".mission/policy.toml";

#[derive(Parser)]
#[command(
    name = "mission",
    version,
    about = "Deterministic mission runtime with RACI authority and significance gates"
)]
struct Cli {
    /// Directory holding one subdirectory per run.
    #[arg(long, global = true, default_value = DEFAULT_STORE)]
    store: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a run from a mission definition and print its id.
    Start {
        #[arg(long)]
        mission: PathBuf,
        /// Policy TOML; missing file means default policy.
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy: PathBuf,
        /// Preferred run id; defaults to a timestamp.
        #[arg(long)]
        run_id: Option<String>,
        /// Initial input as `key=value` (repeatable).
        #[arg(long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,
        #[arg(long)]
        actor_id: String,
        #[arg(long, value_enum, default_value_t = ActorArg::Human)]
        actor_type: ActorArg,
    },
    /// Plan the next decision, optionally reporting the issued step first.
    Next {
        #[arg(long)]
        run: String,
        /// Step being reported; requires `--result`.
        #[arg(long, requires = "result")]
        complete: Option<String>,
        #[arg(long, value_enum, requires = "complete")]
        result: Option<ResultArg>,
        /// Context input merged before planning, as `key=value` (repeatable).
        #[arg(long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,
        /// JSON object merged into inputs before planning.
        #[arg(long)]
        context: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RenderFormat::Markdown)]
        format: RenderFormat,
    },
    /// Answer a pending decision.
    Answer {
        #[arg(long)]
        run: String,
        #[arg(long)]
        decision: String,
        #[arg(long)]
        answer: String,
        #[arg(long)]
        actor_id: String,
        #[arg(long, value_enum, default_value_t = ActorArg::Human)]
        actor_type: ActorArg,
        /// Stand-up participant (repeatable, `open_stand_up` only).
        #[arg(long = "participant")]
        participants: Vec<String>,
    },
    /// Report that a significance gate's timeout expired and print escalation targets.
    Timeout {
        #[arg(long)]
        run: String,
        #[arg(long)]
        decision: String,
        #[arg(long, default_value = "mission-host")]
        actor_id: String,
        #[arg(long, value_enum, default_value_t = ActorArg::Service)]
        actor_type: ActorArg,
    },
    /// Score six significance dimensions and print the routing band.
    Evaluate {
        /// Dimension score as `name=score` (all six required).
        #[arg(long = "dimension", value_parser = parse_key_value)]
        dimensions: Vec<(String, String)>,
        /// Hard-trigger class id (repeatable).
        #[arg(long = "hard-trigger")]
        hard_triggers: Vec<String>,
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy: PathBuf,
    },
    /// Check a mission definition and policy without starting a run.
    Validate {
        #[arg(long)]
        mission: PathBuf,
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy: PathBuf,
    },
    /// Print a run's snapshot, or its event log with `--events`.
    Show {
        #[arg(long)]
        run: String,
        #[arg(long)]
        events: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ActorArg {
    Human,
    Llm,
    Service,
}

impl From<ActorArg> for ActorType {
    fn from(value: ActorArg) -> Self {
        match value {
            ActorArg::Human => ActorType::Human,
            ActorArg::Llm => ActorType::Llm,
            ActorArg::Service => ActorType::Service,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ResultArg {
    Success,
    Failed,
    Blocked,
}

impl From<ResultArg> for StepResult {
    fn from(value: ResultArg) -> Self {
        match value {
            ResultArg::Success => StepResult::Success,
            ResultArg::Failed => StepResult::Failed,
            ResultArg::Blocked => StepResult::Blocked,
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start {
            mission,
            policy,
            run_id,
            inputs,
            actor_id,
            actor_type,
        } => cmd_start(
            &cli.store,
            &mission,
            &policy,
            run_id,
            inputs,
            ActorIdentity::new(actor_type.into(), actor_id),
        ),
        Command::Next {
            run,
            complete,
            result,
            inputs,
            context,
            format,
        } => {
            let report = complete.zip(result).map(|(step_id, result)| StepReport {
                step_id,
                result: result.into(),
            });
            let mut context_inputs = match context {
                Some(path) => read_context(&path)?,
                None => BTreeMap::new(),
            };
            context_inputs.extend(string_inputs(inputs));
            cmd_next(&cli.store, &run, report, context_inputs, format)
        }
        Command::Answer {
            run,
            decision,
            answer,
            actor_id,
            actor_type,
            participants,
        } => {
            let request = AnswerRequest {
                decision_id: decision,
                answer,
                actor: ActorIdentity::new(actor_type.into(), actor_id),
                answered_at: now(),
                participants,
            };
            cmd_answer(&cli.store, &run, &request)
        }
        Command::Timeout {
            run,
            decision,
            actor_id,
            actor_type,
        } => cmd_timeout(
            &cli.store,
            &run,
            &decision,
            &ActorIdentity::new(actor_type.into(), actor_id),
        ),
        Command::Evaluate {
            dimensions,
            hard_triggers,
            policy,
        } => cmd_evaluate(dimensions, &hard_triggers, &policy),
        Command::Validate { mission, policy } => cmd_validate(&mission, &policy),
        Command::Show { run, events } => cmd_show(&cli.store, &run, events),
    }
}

fn cmd_start(
    store: &Path,
    mission: &Path,
    policy: &Path,
    run_id: Option<String>,
    inputs: Vec<(String, String)>,
    actor: ActorIdentity,
) -> Result<i32> {
    let policy = load_policy(policy)?;
    let template = load_mission(mission, &policy.routing_table()?)?;
    let started_at = Utc::now();
    let options = StartOptions {
        run_id: run_id.unwrap_or_else(|| started_at.format("run-%Y%m%d-%H%M%S").to_string()),
        inputs: string_inputs(inputs),
        actor,
        started_at: started_at.to_rfc3339(),
        template_source: Some(
            absolute(mission).with_context(|| format!("resolve {}", mission.display()))?,
        ),
    };
    let outcome = Engine::new(store).start_run(&template, &policy, options)?;
    println!("{}", outcome.run_id);
    Ok(exit_codes::OK)
}

fn cmd_next(
    store: &Path,
    run_id: &str,
    report: Option<StepReport>,
    context: BTreeMap<String, Value>,
    format: RenderFormat,
) -> Result<i32> {
    let decision = Engine::new(store).next(run_id, report, context, &now())?;
    print!("{}", render_decision(&decision, format)?);
    Ok(decision_exit_code(&decision))
}

fn cmd_answer(store: &Path, run_id: &str, request: &AnswerRequest) -> Result<i32> {
    let snapshot = Engine::new(store).answer(run_id, request)?;
    let status = if snapshot.is_pending(&request.decision_id) {
        "pending"
    } else {
        "resolved"
    };
    println!("{}: {}", request.decision_id, status);
    Ok(exit_codes::OK)
}

fn cmd_timeout(
    store: &Path,
    run_id: &str,
    decision_id: &str,
    actor: &ActorIdentity,
) -> Result<i32> {
    let result = Engine::new(store).notify_timeout(run_id, decision_id, actor, &now())?;
    println!(
        "{}",
        to_canonical_json(&result).context("serialize escalation")?
    );
    Ok(exit_codes::OK)
}

fn cmd_evaluate(
    dimensions: Vec<(String, String)>,
    hard_triggers: &[String],
    policy: &Path,
) -> Result<i32> {
    let policy = load_policy(policy)?;
    let scores = dimension_scores(dimensions)?;
    let score = evaluate_with_table(&scores, hard_triggers, &policy.routing_table()?)?;
    println!(
        "{}",
        to_canonical_json(&score).context("serialize significance score")?
    );
    Ok(exit_codes::OK)
}

/// Parse `--dimension` pairs; each dimension may be given once.
fn dimension_scores(pairs: Vec<(String, String)>) -> Result<BTreeMap<String, i64>> {
    let mut scores = BTreeMap::new();
    for (name, raw) in pairs {
        let score: i64 = raw.parse().with_context(|| {
            format!("dimension '{name}' score must be an integer, got '{raw}'")
        })?;
        if scores.contains_key(&name) {
            let reason = format!("dimension '{name}' given more than once");
            return Err(RuntimeError::InvalidDimensions(reason).into());
        }
        scores.insert(name, score);
    }
    Ok(scores)
}

fn cmd_validate(mission: &Path, policy: &Path) -> Result<i32> {
    let policy = load_policy(policy)?;
    let template = load_mission(mission, &policy.routing_table()?)?;
    println!(
        "mission '{}' is valid ({} steps)",
        template.mission.key,
        template.step_count()
    );
    Ok(exit_codes::OK)
}

fn cmd_show(store: &Path, run_id: &str, events: bool) -> Result<i32> {
    if events {
        let log = JsonlEventLog::new(RunPaths::new(store, run_id).events_path);
        for record in log.read_all()? {
            println!("{}", to_canonical_json(&record).context("serialize event")?);
        }
        return Ok(exit_codes::OK);
    }
    let run = Engine::new(store).show(run_id)?;
    let mut out = serde_json::to_string_pretty(&run.snapshot).context("serialize snapshot")?;
    out.push('\n');
    print!("{out}");
    Ok(exit_codes::OK)
}

fn decision_exit_code(decision: &NextDecision) -> i32 {
    match decision {
        NextDecision::Step { .. } => exit_codes::OK,
        NextDecision::DecisionRequired { .. } => exit_codes::DECISION_REQUIRED,
        NextDecision::Blocked { .. } => exit_codes::BLOCKED,
        NextDecision::Terminal { .. } => exit_codes::TERMINAL,
    }
}

/// Unresolved roles block the run; every other failure is invalid input.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RuntimeError>() {
        Some(RuntimeError::UnresolvedRole(escalation)) => {
            if let Ok(json) = to_canonical_json(escalation) {
                println!("{json}");
            }
            exit_codes::BLOCKED
        }
        _ => exit_codes::INVALID,
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn string_inputs(pairs: Vec<(String, String)>) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn read_context(path: &Path) -> Result<BTreeMap<String, Value>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse context object {}", path.display()))
}
