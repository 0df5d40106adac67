use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;

/// Project config file, inside the workflow directory.
pub const CONFIG_TOML: &str = "config.toml";

/// Smallest accepted dashboard polling interval.
pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// Global config path: `$XDG_CONFIG_HOME/crewflow/config.toml` or the
/// platform equivalent.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("crewflow").join(CONFIG_TOML))
}

/// Merged crewflow configuration.
///
/// Every section has defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub models: RoleModels,
    pub timeouts: RoleTimeouts,
    pub scopes: ScopesConfig,
    pub commands: CommandsConfig,
    /// Action name to key. Read by the dashboard frontend; the CLI only
    /// carries and validates it.
    pub keybindings: BTreeMap<String, String>,
    pub git: GitConfig,
    pub dashboard: DashboardConfig,
}

/// Model identifier per agent role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RoleModels {
    pub planner: String,
    pub backend: String,
    pub frontend: String,
    pub tests: String,
    pub reviewer: String,
    pub compound: String,
}

impl Default for RoleModels {
    fn default() -> Self {
        Self {
            planner: "opus".into(),
            backend: "sonnet".into(),
            frontend: "sonnet".into(),
            tests: "sonnet".into(),
            reviewer: "opus".into(),
            compound: "sonnet".into(),
        }
    }
}

impl RoleModels {
    /// Model for a role name; unknown roles get the planner's model.
    pub fn for_role(&self, role: &str) -> &str {
        match role {
            "backend" => &self.backend,
            "frontend" => &self.frontend,
            "tests" => &self.tests,
            "reviewer" => &self.reviewer,
            "compound" => &self.compound,
            _ => &self.planner,
        }
    }
}

/// Advisory per-role timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RoleTimeouts {
    pub planner: u64,
    pub backend: u64,
    pub frontend: u64,
    pub tests: u64,
    pub reviewer: u64,
    pub compound: u64,
}

impl Default for RoleTimeouts {
    fn default() -> Self {
        Self {
            planner: 600,
            backend: 1800,
            frontend: 1800,
            tests: 1200,
            reviewer: 900,
            compound: 600,
        }
    }
}

impl RoleTimeouts {
    fn entries(&self) -> [(&'static str, u64); 6] {
        [
            ("planner", self.planner),
            ("backend", self.backend),
            ("frontend", self.frontend),
            ("tests", self.tests),
            ("reviewer", self.reviewer),
            ("compound", self.compound),
        ]
    }
}

/// File globs each domain worker owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScopesConfig {
    pub backend: Vec<String>,
    pub frontend: Vec<String>,
    pub tests: Vec<String>,
}

impl Default for ScopesConfig {
    fn default() -> Self {
        Self {
            backend: vec!["src/server/**".into(), "src/api/**".into(), "src/lib/**".into()],
            frontend: vec!["src/components/**".into(), "src/pages/**".into(), "src/app/**".into()],
            tests: vec!["tests/**".into(), "**/*.test.*".into(), "**/*.spec.*".into()],
        }
    }
}

/// Project check commands, usually seeded by auto-detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CommandsConfig {
    pub test: Option<String>,
    pub lint: Option<String>,
    pub typecheck: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GitConfig {
    pub auto_commit: bool,
    pub branch_prefix: String,
    pub base_branch: String,
    pub create_branch: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            branch_prefix: "feature/".into(),
            base_branch: "main".into(),
            create_branch: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardConfig {
    pub poll_interval_ms: u64,
    /// Port for the dashboard frontend. Unused by the CLI.
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            port: 3847,
        }
    }
}

impl Config {
    /// Load defaults < global < project. Missing layers are skipped.
    pub fn load_layered(global: Option<&Path>, project: Option<&Path>) -> anyhow::Result<Self> {
        let mut merged = toml::Table::new();
        for path in [global, project].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer = contents.parse::<toml::Table>().map_err(|e| {
                ExitError::Config(format!("invalid {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "config layer loaded");
            merge_tables(&mut merged, layer);
        }
        let config: Self = toml::Value::Table(merged).try_into().map_err(|e| {
            ExitError::Config(format!("invalid config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the global layer and the project layer under `workflow_dir`.
    pub fn load_for(workflow_dir: &Path) -> anyhow::Result<Self> {
        let global = global_config_path();
        Self::load_layered(global.as_deref(), Some(&workflow_dir.join(CONFIG_TOML)))
    }

    /// Parse a single TOML document on top of the defaults.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid config.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Precondition checks the type system does not cover.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (role, secs) in self.timeouts.entries() {
            if secs == 0 {
                return Err(ExitError::Config(format!("timeouts.{role} must be positive")).into());
            }
        }
        if self.dashboard.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ExitError::Config(format!(
                "dashboard.poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                self.dashboard.poll_interval_ms
            ))
            .into());
        }
        Ok(())
    }

    /// Advisory timeout for a role name; unknown roles get the longest.
    pub fn timeout_for(&self, role: &str) -> u64 {
        self.timeouts
            .entries()
            .into_iter()
            .find(|(name, _)| *name == role)
            .map_or_else(
                || self.timeouts.entries().into_iter().map(|(_, s)| s).max().unwrap_or(1800),
                |(_, secs)| secs,
            )
    }

    /// Serialize config to a TOML string with helpful comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# crewflow project configuration\n# Layered over ~/.config/crewflow/config.toml\n\n");

        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(toml_edit::Item::as_table_mut) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        set_table_comment(&mut doc, "models", "\n# Model per agent role\n");
        set_table_comment(&mut doc, "timeouts", "\n# Advisory worker timeouts (seconds)\n");
        set_table_comment(&mut doc, "scopes", "\n# File globs owned by each domain worker\n");
        set_table_comment(&mut doc, "commands", "\n# Project check commands\n");
        set_table_comment(&mut doc, "git", "\n# Version control policy\n");
        set_table_comment(
            &mut doc,
            "keybindings",
            "\n# Dashboard key bindings (read by the dashboard frontend, not the CLI)\n",
        );
        set_table_comment(
            &mut doc,
            "dashboard",
            "\n# Status polling. `port` is reserved for the dashboard frontend\n",
        );

        Ok(doc.to_string())
    }
}

/// Deep-merge `overlay` into `base`: tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.dashboard.poll_interval_ms, 2000);
        assert_eq!(config.git.branch_prefix, "feature/");
        assert_eq!(config.timeouts.backend, 1800);
    }

    #[test]
    fn model_lookup_by_role() {
        let config = Config::parse_toml("[models]\nreviewer = \"opus-large\"\n").unwrap();
        assert_eq!(config.models.for_role("reviewer"), "opus-large");
        assert_eq!(config.models.for_role("tests"), "sonnet");
        assert_eq!(config.models.for_role("mystery"), "opus");
    }

    #[test]
    fn parse_partial_sections() {
        let config = Config::parse_toml(
            r#"
[models]
backend = "haiku"

[commands]
test = "cargo test"

[scopes]
backend = ["crates/api/**"]

[keybindings]
refine = "r"
"#,
        )
        .unwrap();
        assert_eq!(config.models.backend, "haiku");
        assert_eq!(config.models.reviewer, "opus");
        assert_eq!(config.commands.test.as_deref(), Some("cargo test"));
        assert!(config.commands.lint.is_none());
        assert_eq!(config.scopes.backend, vec!["crates/api/**"]);
        assert_eq!(config.scopes.tests, ScopesConfig::default().tests);
        assert_eq!(config.keybindings.get("refine").map(String::as_str), Some("r"));
    }

    #[test]
    fn scopes_must_be_arrays() {
        let err = Config::parse_toml("[scopes]\nbackend = \"src/**\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid config.toml"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Config::parse_toml("[timeouts]\nreviewer = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeouts.reviewer must be positive"));
        assert!(matches!(
            err.downcast_ref::<ExitError>(),
            Some(ExitError::Config(_))
        ));
    }

    #[test]
    fn poll_interval_floor() {
        let err = Config::parse_toml("[dashboard]\npoll_interval_ms = 100\n").unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
        assert!(Config::parse_toml("[dashboard]\npoll_interval_ms = 500\n").is_ok());
    }

    #[test]
    fn layers_merge_project_over_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(
            &global,
            "[models]\nbackend = \"haiku\"\nfrontend = \"haiku\"\n[git]\nauto_commit = true\n",
        )
        .unwrap();
        std::fs::write(&project, "[models]\nfrontend = \"opus\"\n").unwrap();

        let config = Config::load_layered(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.models.backend, "haiku");
        assert_eq!(config.models.frontend, "opus");
        assert_eq!(config.models.planner, "opus");
        assert!(config.git.auto_commit);
    }

    #[test]
    fn missing_layers_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::load_layered(Some(&dir.path().join("nope.toml")), None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_layer_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("config.toml");
        std::fs::write(&project, "not valid toml [[[").unwrap();
        let err = Config::load_layered(None, Some(&project)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExitError>(),
            Some(ExitError::Config(_))
        ));
    }

    #[test]
    fn timeout_lookup() {
        let config = Config::default();
        assert_eq!(config.timeout_for("reviewer"), 900);
        assert_eq!(config.timeout_for("unknown"), 1800);
    }

    #[test]
    fn to_toml_roundtrips_with_comments() {
        let mut config = Config::default();
        config.commands.test = Some("npm test".into());
        config.keybindings.insert("review".into(), "v".into());

        let output = config.to_toml().unwrap();
        assert!(output.contains("# crewflow project configuration"));
        assert!(output.contains("# Version control policy"));
        assert!(output.contains("# Dashboard key bindings (read by the dashboard frontend"));
        assert!(output.contains("`port` is reserved for the dashboard frontend"));

        let reparsed = Config::parse_toml(&output).unwrap();
        assert_eq!(reparsed, config);
    }
}
