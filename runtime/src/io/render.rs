//! Rendering of planner decisions for the host (markdown or canonical JSON).

use anyhow::{Context, Result};
use clap::ValueEnum;
use minijinja::Environment;

use crate::core::canonical::to_canonical_json;
use crate::core::types::NextDecision;

const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const DECISION_TEMPLATE: &str = include_str!("prompts/decision.md");
const BLOCKED_TEMPLATE: &str = include_str!("prompts/blocked.md");
const TERMINAL_TEMPLATE: &str = include_str!("prompts/terminal.md");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RenderFormat {
    #[default]
    Markdown,
    Json,
}

/// Template engine wrapper around minijinja.
struct RenderEngine {
    env: Environment<'static>,
}

impl RenderEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("step", STEP_TEMPLATE)
            .context("load step template")?;
        env.add_template("decision_required", DECISION_TEMPLATE)
            .context("load decision template")?;
        env.add_template("blocked", BLOCKED_TEMPLATE)
            .context("load blocked template")?;
        env.add_template("terminal", TERMINAL_TEMPLATE)
            .context("load terminal template")?;
        Ok(Self { env })
    }

    fn render(&self, decision: &NextDecision) -> Result<String> {
        let template = self.env.get_template(decision.kind())?;
        let rendered = template
            .render(decision)
            .with_context(|| format!("render {} template", decision.kind()))?;
        Ok(rendered)
    }
}

/// Render `decision` in the requested format. Output ends with a newline.
pub fn render_decision(decision: &NextDecision, format: RenderFormat) -> Result<String> {
    let mut out = match format {
        RenderFormat::Json => to_canonical_json(decision).context("serialize decision")?,
        RenderFormat::Markdown => RenderEngine::new()?.render(decision)?,
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::plan_next;
    use crate::core::policy::PolicySnapshot;
    use crate::test_support::{audit_step, mission, owner_snapshot, prompt_step};

    #[test]
    fn renders_step_with_authority() {
        let mut step = prompt_step("build", &[]);
        step.expected_output = Some("A compiled binary".to_string());
        let template = mission(vec![step], Vec::new());
        let decision = plan_next(&template, &owner_snapshot(), &PolicySnapshot::default())
            .expect("plan");

        let text = render_decision(&decision, RenderFormat::Markdown).expect("render");
        assert!(text.starts_with("# Next Step: build"), "{text}");
        assert!(text.contains("## Expected Output"), "{text}");
        assert!(text.contains("- Accountable: human `owner-1`"), "{text}");
        assert!(text.contains("- Source: inferred"), "{text}");
    }

    #[test]
    fn renders_decision_options() {
        let template = mission(Vec::new(), vec![audit_step("gate", &[], true)]);
        let decision = plan_next(&template, &owner_snapshot(), &PolicySnapshot::default())
            .expect("plan");

        let text = render_decision(&decision, RenderFormat::Markdown).expect("render");
        assert!(
            text.starts_with("# Decision Required: audit:gate"),
            "{text}"
        );
        assert!(text.contains("## Options"), "{text}");
        assert!(text.contains("- `approve`"), "{text}");
        assert!(text.contains("- `reject`"), "{text}");
    }

    #[test]
    fn renders_blocked_and_terminal() {
        let blocked = NextDecision::Blocked {
            reason: "stuck".to_string(),
        };
        assert_eq!(
            render_decision(&blocked, RenderFormat::Markdown).expect("render"),
            "# Mission Blocked\n\nstuck\n"
        );
        let done = NextDecision::Terminal {
            reason: "All mission steps completed".to_string(),
        };
        assert!(
            render_decision(&done, RenderFormat::Markdown)
                .expect("render")
                .starts_with("# Mission Complete")
        );
    }

    #[test]
    fn json_format_is_canonical() {
        let blocked = NextDecision::Blocked {
            reason: "stuck".to_string(),
        };
        assert_eq!(
            render_decision(&blocked, RenderFormat::Json).expect("render"),
            "{\"kind\":\"blocked\",\"reason\":\"stuck\"}\n"
        );
    }
}
