//! One-shot project sniffing used to seed `[commands]` at init time.

use std::path::Path;

use crate::config::CommandsConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub framework: &'static str,
    pub commands: CommandsConfig,
}

impl Detection {
    fn unknown() -> Self {
        Self {
            framework: "unknown",
            commands: CommandsConfig::default(),
        }
    }
}

/// Classify the project at `root` by its manifest files.
pub fn detect_project(root: &Path) -> Detection {
    if root.join("Cargo.toml").is_file() {
        return Detection {
            framework: "rust",
            commands: CommandsConfig {
                test: Some("cargo test".into()),
                lint: Some("cargo clippy --all-targets".into()),
                typecheck: Some("cargo check".into()),
            },
        };
    }

    if root.join("package.json").is_file() {
        return detect_node(root);
    }

    if root.join("pyproject.toml").is_file() || root.join("requirements.txt").is_file() {
        let uses_mypy = std::fs::read_to_string(root.join("pyproject.toml"))
            .is_ok_and(|s| s.contains("mypy"));
        return Detection {
            framework: "python",
            commands: CommandsConfig {
                test: Some("pytest".into()),
                lint: Some("ruff check .".into()),
                typecheck: uses_mypy.then(|| "mypy .".into()),
            },
        };
    }

    if root.join("go.mod").is_file() {
        return Detection {
            framework: "go",
            commands: CommandsConfig {
                test: Some("go test ./...".into()),
                lint: Some("go vet ./...".into()),
                typecheck: Some("go build ./...".into()),
            },
        };
    }

    Detection::unknown()
}

fn detect_node(root: &Path) -> Detection {
    let manifest: serde_json::Value = std::fs::read_to_string(root.join("package.json"))
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    let runner = if root.join("pnpm-lock.yaml").is_file() {
        "pnpm"
    } else if root.join("yarn.lock").is_file() {
        "yarn"
    } else if root.join("bun.lockb").is_file() {
        "bun"
    } else {
        "npm"
    };
    let has_script = |name: &str| manifest.get("scripts").and_then(|s| s.get(name)).is_some();
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| manifest.get(section).and_then(|d| d.get(name)).is_some())
    };

    let framework = if has_dep("next") {
        "nextjs"
    } else if has_dep("react") {
        "react"
    } else if has_dep("vue") {
        "vue"
    } else if has_dep("svelte") {
        "svelte"
    } else {
        "node"
    };

    let script = |name: &str| has_script(name).then(|| format!("{runner} run {name}"));
    let typecheck = script("typecheck").or_else(|| {
        root.join("tsconfig.json")
            .is_file()
            .then(|| "npx tsc --noEmit".to_string())
    });

    Detection {
        framework,
        commands: CommandsConfig {
            test: has_script("test").then(|| format!("{runner} test")),
            lint: script("lint"),
            typecheck,
        },
    }
}
