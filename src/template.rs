//! Prompt rendering for each agent role.

use minijinja::Environment;
use serde::Serialize;

use crate::config::{CommandsConfig, Config, ScopesConfig};
use crate::workflow::iteration::MAX_ITERATIONS;
use crate::workflow::role::Role;

const PLANNER_TEMPLATE: &str = include_str!("templates/planner.md.jinja");
const WORKER_TEMPLATE: &str = include_str!("templates/worker.md.jinja");
const REVIEWER_TEMPLATE: &str = include_str!("templates/reviewer.md.jinja");
const COMPOUND_TEMPLATE: &str = include_str!("templates/compound.md.jinja");

/// Context data passed to prompt templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub role: Role,
    /// Feature description (planner) or feature name from the plan
    pub feature: Option<String>,
    /// Raw feature request, only used by the planner
    pub description: String,
    pub plan_path: String,
    pub review_path: String,
    pub signal_command: String,
    /// Globs owned by this role; empty for non-domain roles
    pub scope: Vec<String>,
    pub scopes: ScopesConfig,
    pub commands: CommandsConfig,
    pub iteration: u32,
    pub max_iterations: u32,
    pub refine: bool,
}

impl PromptContext {
    pub fn new(role: Role, config: &Config, plan_path: String, review_path: String) -> Self {
        let scope = match role {
            Role::Backend => config.scopes.backend.clone(),
            Role::Frontend => config.scopes.frontend.clone(),
            Role::Tests => config.scopes.tests.clone(),
            _ => Vec::new(),
        };
        Self {
            role,
            feature: None,
            description: String::new(),
            plan_path,
            review_path,
            signal_command: format!("crewflow signal set {}", role.signal()),
            scope,
            scopes: config.scopes.clone(),
            commands: config.commands.clone(),
            iteration: 1,
            max_iterations: MAX_ITERATIONS,
            refine: false,
        }
    }

    #[must_use]
    pub fn feature(mut self, feature: Option<String>) -> Self {
        self.feature = feature;
        self
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub const fn iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// Switch a domain worker prompt to refine mode and its refine signal.
    #[must_use]
    pub fn refine(mut self) -> Self {
        if let Some(signal) = self.role.refine_signal() {
            self.refine = true;
            self.signal_command = format!("crewflow signal set {signal}");
        }
        self
    }
}

fn template_for(role: Role) -> &'static str {
    match role {
        Role::Planner => PLANNER_TEMPLATE,
        Role::Backend | Role::Frontend | Role::Tests => WORKER_TEMPLATE,
        Role::Reviewer => REVIEWER_TEMPLATE,
        Role::Compound => COMPOUND_TEMPLATE,
    }
}

/// Render the prompt for `ctx.role`.
pub fn render_prompt(ctx: &PromptContext) -> anyhow::Result<String> {
    let env = Environment::new();
    let tmpl = env.template_from_str(template_for(ctx.role))?;
    let rendered = tmpl.render(ctx)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role) -> PromptContext {
        PromptContext::new(
            role,
            &Config::default(),
            ".crewflow/plan.md".into(),
            ".crewflow/review.md".into(),
        )
    }

    #[test]
    fn planner_prompt_includes_description_and_signal() {
        let out = render_prompt(&ctx(Role::Planner).description("Add dark mode")).unwrap();
        assert!(out.contains("Add dark mode"));
        assert!(out.contains(".crewflow/plan.md"));
        assert!(out.contains("crewflow signal set plan"));
        assert!(out.contains("src/components/**"));
    }

    #[test]
    fn worker_prompt_lists_scope() {
        let out = render_prompt(&ctx(Role::Backend).feature(Some("Search".into()))).unwrap();
        assert!(out.contains("BACKEND worker for \"Search\""));
        assert!(out.contains("- `src/api/**`"));
        assert!(out.contains("crewflow signal set backend"));
        assert!(!out.contains("REFINE MODE"));
    }

    #[test]
    fn refine_prompt_switches_signal() {
        let out = render_prompt(&ctx(Role::Frontend).iteration(2).refine()).unwrap();
        assert!(out.contains("REFINE MODE (iteration 2 of 3)"));
        assert!(out.contains(".crewflow/review.md"));
        assert!(out.contains("crewflow signal set frontend-refine"));
    }

    #[test]
    fn refine_is_noop_for_reviewer() {
        let c = ctx(Role::Reviewer).refine();
        assert!(!c.refine);
        assert_eq!(c.signal_command, "crewflow signal set review");
    }

    #[test]
    fn worker_prompt_includes_check_commands() {
        let mut config = Config::default();
        config.commands.test = Some("cargo test".into());
        let c = PromptContext::new(Role::Tests, &config, "p".into(), "r".into());
        let out = render_prompt(&c).unwrap();
        assert!(out.contains("tests: `cargo test`"));
        assert!(!out.contains("lint:"));
    }

    #[test]
    fn reviewer_prompt_names_status_markers() {
        let out = render_prompt(&ctx(Role::Reviewer).iteration(2)).unwrap();
        assert!(out.contains("STATUS: PASS"));
        assert!(out.contains("STATUS: FAIL"));
        assert!(out.contains("re-review"));
    }

    #[test]
    fn compound_prompt_renders() {
        let out = render_prompt(&ctx(Role::Compound)).unwrap();
        assert!(out.contains("crewflow signal set compound"));
    }
}
