//! Version control collaborator.
//!
//! Every operation may fail and is reported as an error to the caller.
//! Nothing here retries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::subprocess::Tool;

/// Conventional-commit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CommitKind {
    Feat,
    Fix,
    Refactor,
    Test,
    Docs,
    Chore,
    Perf,
}

impl CommitKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feat => "feat",
            Self::Fix => "fix",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Chore => "chore",
            Self::Perf => "perf",
        }
    }
}

impl fmt::Display for CommitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `kind(scope): message`, or `kind: message` without a scope.
pub fn commit_message(kind: CommitKind, message: &str, scope: Option<&str>) -> String {
    match scope.map(str::trim).filter(|s| !s.is_empty()) {
        Some(scope) => format!("{kind}({scope}): {}", message.trim()),
        None => format!("{kind}: {}", message.trim()),
    }
}

pub trait Vcs {
    /// Current branch, or `None` outside a repository or on a detached HEAD.
    fn current_branch(&self) -> Option<String>;

    /// Commits on HEAD that are not on `base`.
    fn commit_count(&self, base: &str) -> anyhow::Result<u32>;

    fn create_branch(&self, name: &str) -> anyhow::Result<()>;

    fn commit(&self, kind: CommitKind, message: &str, scope: Option<&str>) -> anyhow::Result<()>;

    fn push(&self, branch: &str) -> anyhow::Result<()>;

    /// Open a pull request and return its URL.
    fn create_pr(&self, title: &str, body: &str, base: &str) -> anyhow::Result<String>;
}

/// `git` and `gh` command-line implementation.
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn git(&self, args: &[&str]) -> Tool {
        Tool::new("git").args(args).current_dir(&self.root)
    }
}

impl Vcs for GitCli {
    fn current_branch(&self) -> Option<String> {
        let output = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).run().ok()?;
        let branch = output.stdout_trimmed();
        if !output.success() || branch.is_empty() || branch == "HEAD" {
            return None;
        }
        Some(branch.to_string())
    }

    fn commit_count(&self, base: &str) -> anyhow::Result<u32> {
        let range = format!("{base}..HEAD");
        let output = self.git(&["rev-list", "--count", &range]).run_ok()?;
        let count = output.stdout_trimmed().parse::<u32>().map_err(|e| {
            anyhow::anyhow!("unexpected rev-list output {:?}: {e}", output.stdout_trimmed())
        })?;
        Ok(count)
    }

    fn create_branch(&self, name: &str) -> anyhow::Result<()> {
        self.git(&["checkout", "-b", name]).run_ok()?;
        Ok(())
    }

    fn commit(&self, kind: CommitKind, message: &str, scope: Option<&str>) -> anyhow::Result<()> {
        self.git(&["add", "-A"]).run_ok()?;
        let message = commit_message(kind, message, scope);
        self.git(&["commit", "-m", &message]).run_ok()?;
        Ok(())
    }

    fn push(&self, branch: &str) -> anyhow::Result<()> {
        self.git(&["push", "-u", "origin", branch]).run_ok()?;
        Ok(())
    }

    fn create_pr(&self, title: &str, body: &str, base: &str) -> anyhow::Result<String> {
        let output = Tool::new("gh")
            .args(&["pr", "create", "--title", title, "--body", body, "--base", base])
            .current_dir(&self.root)
            .run_ok()?;
        Ok(output.stdout_trimmed().to_string())
    }
}

/// Scriptable in-memory VCS for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryVcs {
    pub branch: Mutex<Option<String>>,
    pub commits: Mutex<Vec<String>>,
    pub fail_push: bool,
    pub pushed: Mutex<Vec<String>>,
}

impl MemoryVcs {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            branch: Mutex::new(Some(branch.to_string())),
            ..Self::default()
        }
    }

    pub fn commit_log(&self) -> Vec<String> {
        self.commits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Vcs for MemoryVcs {
    fn current_branch(&self) -> Option<String> {
        self.branch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn commit_count(&self, _base: &str) -> anyhow::Result<u32> {
        let count = self
            .commits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        Ok(u32::try_from(count)?)
    }

    fn create_branch(&self, name: &str) -> anyhow::Result<()> {
        *self
            .branch
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(name.to_string());
        Ok(())
    }

    fn commit(&self, kind: CommitKind, message: &str, scope: Option<&str>) -> anyhow::Result<()> {
        self.commits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(commit_message(kind, message, scope));
        Ok(())
    }

    fn push(&self, branch: &str) -> anyhow::Result<()> {
        if self.fail_push {
            anyhow::bail!("push rejected: remote unavailable");
        }
        self.pushed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(branch.to_string());
        Ok(())
    }

    fn create_pr(&self, title: &str, _body: &str, base: &str) -> anyhow::Result<String> {
        Ok(format!("memory://pr/{base}/{}", title.replace(' ', "-")))
    }
}

impl<T: Vcs + ?Sized> Vcs for std::sync::Arc<T> {
    fn current_branch(&self) -> Option<String> {
        (**self).current_branch()
    }

    fn commit_count(&self, base: &str) -> anyhow::Result<u32> {
        (**self).commit_count(base)
    }

    fn create_branch(&self, name: &str) -> anyhow::Result<()> {
        (**self).create_branch(name)
    }

    fn commit(&self, kind: CommitKind, message: &str, scope: Option<&str>) -> anyhow::Result<()> {
        (**self).commit(kind, message, scope)
    }

    fn push(&self, branch: &str) -> anyhow::Result<()> {
        (**self).push(branch)
    }

    fn create_pr(&self, title: &str, body: &str, base: &str) -> anyhow::Result<String> {
        (**self).create_pr(title, body, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_message_formats() {
        assert_eq!(
            commit_message(CommitKind::Feat, "add search", Some("api")),
            "feat(api): add search"
        );
        assert_eq!(commit_message(CommitKind::Fix, " typo ", None), "fix: typo");
        assert_eq!(commit_message(CommitKind::Docs, "x", Some("  ")), "docs: x");
    }

    #[test]
    fn git_cli_outside_repo_has_no_branch() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        assert!(git.current_branch().is_none());
        assert!(git.commit_count("main").is_err());
    }

    #[test]
    fn memory_vcs_counts_commits() {
        let vcs = MemoryVcs::on_branch("feature/a");
        vcs.commit(CommitKind::Feat, "one", None).unwrap();
        vcs.commit(CommitKind::Test, "two", Some("api")).unwrap();
        assert_eq!(vcs.commit_count("main").unwrap(), 2);
        assert_eq!(vcs.commit_log()[1], "test(api): two");
    }
}
