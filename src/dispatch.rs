//! Dispatch executor: hands a rendered prompt to the agent hosting a role.
//!
//! Dispatch is fire-and-forget. Failures are logged, never returned, since
//! the phase engine only ever learns about progress through signals.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::subprocess::Tool;
use crate::workflow::role::Role;

pub trait Dispatcher {
    fn dispatch(&self, role: Role, prompt: &str);

    /// Reset the agent hosting `role` to a clean context.
    fn clear(&self, role: Role);
}

/// Sends prompts to agents running in tmux windows named after their role.
///
/// The prompt is written to `<prompts_dir>/<role>.md` and the agent is asked
/// to follow it, so long prompts never go through `send-keys` verbatim.
pub struct TmuxDispatcher {
    session: String,
    prompts_dir: PathBuf,
}

impl TmuxDispatcher {
    pub fn new(session: impl Into<String>, prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            session: session.into(),
            prompts_dir: prompts_dir.into(),
        }
    }

    /// tmux session name for a project directory: `crewflow-<dirname>`.
    pub fn session_name_for(root: &Path) -> String {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project");
        let slug: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("crewflow-{}", slug.trim_matches('-'))
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Create the tmux session and one window per role, skipping whatever
    /// already exists. Returns the roles whose windows were created.
    pub fn ensure_session(&self, root: &Path) -> anyhow::Result<Vec<Role>> {
        let has_session = Tool::new("tmux")
            .args(&["has-session", "-t", &self.session])
            .run()?;
        let existing = if has_session.success() {
            let listed = Tool::new("tmux")
                .args(&["list-windows", "-t", &self.session, "-F", "#{window_name}"])
                .run_ok()?;
            Some(listed.stdout.lines().map(str::to_string).collect::<Vec<_>>())
        } else {
            None
        };

        let (created, commands) = self.bootstrap_commands(root, existing.as_deref());
        for args in &commands {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            Tool::new("tmux").args(&args).run_ok()?;
        }
        tracing::info!(session = %self.session, created = created.len(), "tmux session ready");
        Ok(created)
    }

    /// tmux invocations that bring the session up to one window per role.
    /// `existing` lists the current window names, or `None` when the session
    /// itself is missing.
    pub fn bootstrap_commands(
        &self,
        root: &Path,
        existing: Option<&[String]>,
    ) -> (Vec<Role>, Vec<Vec<String>>) {
        let cwd = root.display().to_string();
        let missing: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| existing.is_none_or(|names| !names.iter().any(|n| n == role.as_str())))
            .collect();

        let mut commands = Vec::with_capacity(missing.len());
        for (i, role) in missing.iter().enumerate() {
            let name = role.as_str().to_string();
            let cmd = if i == 0 && existing.is_none() {
                vec![
                    "new-session".to_string(),
                    "-d".to_string(),
                    "-s".to_string(),
                    self.session.clone(),
                    "-n".to_string(),
                    name,
                    "-c".to_string(),
                    cwd.clone(),
                ]
            } else {
                vec![
                    "new-window".to_string(),
                    "-d".to_string(),
                    "-t".to_string(),
                    format!("{}:", self.session),
                    "-n".to_string(),
                    name,
                    "-c".to_string(),
                    cwd.clone(),
                ]
            };
            commands.push(cmd);
        }
        (missing, commands)
    }

    fn target(&self, role: Role) -> String {
        format!("{}:{}", self.session, role.as_str())
    }

    fn send_keys(&self, role: Role, keys: &[&str]) -> anyhow::Result<()> {
        let target = self.target(role);
        let mut tool = Tool::new("tmux").args(&["send-keys", "-t", &target]);
        for key in keys {
            tool = tool.arg(key);
        }
        tool.run_ok()?;
        Ok(())
    }

    fn write_prompt(&self, role: Role, prompt: &str) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.prompts_dir)?;
        let path = self.prompts_dir.join(format!("{}.md", role.as_str()));
        std::fs::write(&path, prompt)?;
        Ok(path)
    }
}

impl Dispatcher for TmuxDispatcher {
    fn dispatch(&self, role: Role, prompt: &str) {
        let result = self.write_prompt(role, prompt).and_then(|path| {
            let instruction = format!("Read and follow the instructions in {}", path.display());
            self.send_keys(role, &[&instruction, "Enter"])
        });
        match result {
            Ok(()) => tracing::info!(role = %role, target = %self.target(role), "dispatched"),
            Err(e) => tracing::warn!(role = %role, error = %e, "dispatch failed"),
        }
    }

    fn clear(&self, role: Role) {
        if let Err(e) = self.send_keys(role, &["/clear", "Enter"]) {
            tracing::warn!(role = %role, error = %e, "clear failed");
        }
    }
}

/// Prints prompts instead of sending them; backs `--dry-run`.
pub struct PrintDispatcher;

impl Dispatcher for PrintDispatcher {
    fn dispatch(&self, role: Role, prompt: &str) {
        println!("===== {role} =====\n{prompt}");
    }

    fn clear(&self, role: Role) {
        println!("===== {role} (clear) =====");
    }
}

/// Records dispatches in memory.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    sent: Mutex<Vec<(Role, String)>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub fn sent(&self) -> Vec<(Role, String)> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.sent().into_iter().map(|(role, _)| role).collect()
    }
}

impl Dispatcher for MemoryDispatcher {
    fn dispatch(&self, role: Role, prompt: &str) {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((role, prompt.to_string()));
    }

    fn clear(&self, _role: Role) {}
}

impl<T: Dispatcher + ?Sized> Dispatcher for std::sync::Arc<T> {
    fn dispatch(&self, role: Role, prompt: &str) {
        (**self).dispatch(role, prompt);
    }

    fn clear(&self, role: Role) {
        (**self).clear(role);
    }
}
