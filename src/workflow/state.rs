//! Workflow state record and its stores.
//!
//! The persisted `phase` is a cache of the phase engine's output, not an
//! independent source of truth.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::Phase;
use super::signals::{SignalSet, SignalStore, validate_signal_name};

/// Branch key used when the session is not on a known branch.
pub const DEFAULT_BRANCH_KEY: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub phase: Phase,
    pub iteration: u32,
    #[serde(default)]
    pub feature_name: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub commit_count: u32,
    #[serde(default)]
    pub signals: SignalSet,
    pub last_updated: DateTime<Utc>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            phase: Phase::Init,
            iteration: 1,
            feature_name: None,
            branch_name: None,
            commit_count: 0,
            signals: SignalSet::new(),
            last_updated: Utc::now(),
        }
    }
}

impl WorkflowState {
    /// Key under which this state's branch session and timeline are stored.
    pub fn branch_key(&self) -> String {
        self.branch_name
            .as_deref()
            .map_or_else(|| DEFAULT_BRANCH_KEY.to_string(), sanitize_branch)
    }
}

/// Snapshot of a workflow parked on one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSession {
    pub state: WorkflowState,
    pub signals: SignalSet,
}

/// Filesystem-safe key for a branch name.
pub fn sanitize_branch(branch: &str) -> String {
    let key: String = branch
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let key = key.trim_start_matches('.').to_string();
    if key.is_empty() {
        DEFAULT_BRANCH_KEY.to_string()
    } else {
        key
    }
}

/// Write `contents` to `path` via a sibling temp file and a rename, so
/// readers see either the old or the new record.
pub fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let tmp = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));
    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        let _ = fs::remove_file(&tmp);
        format!("renaming {} to {}", tmp.display(), path.display())
    })
}

/// Stores the singleton state record plus per-branch snapshots.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    sessions_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_path: impl Into<PathBuf>, sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load the record. Missing or corrupt records yield a fresh one.
    pub fn load(&self) -> WorkflowState {
        let contents = match fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.state_path.display(), error = %e, "state unreadable, starting fresh");
                }
                return WorkflowState::default();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %self.state_path.display(), error = %e, "state corrupt, starting fresh");
            WorkflowState::default()
        })
    }

    /// Persist the record atomically, stamping `last_updated`.
    pub fn save(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        state.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(state).context("serializing workflow state")?;
        write_atomic(&self.state_path, &json)?;
        tracing::debug!(phase = %state.phase, iteration = state.iteration, "state saved");
        Ok(())
    }

    fn session_path(&self, branch: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", sanitize_branch(branch)))
    }

    /// Snapshot `state` and `signals` under `branch`, overwriting any
    /// earlier snapshot for the same branch.
    pub fn save_to_branch(
        &self,
        branch: &str,
        state: &WorkflowState,
        signals: &SignalSet,
    ) -> anyhow::Result<PathBuf> {
        let mut session = BranchSession {
            state: state.clone(),
            signals: signals.clone(),
        };
        session.state.signals = signals.clone();
        session.state.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(&session).context("serializing branch session")?;
        let path = self.session_path(branch);
        write_atomic(&path, &json)?;
        tracing::info!(branch, path = %path.display(), "branch session saved");
        Ok(path)
    }

    /// Read the snapshot for `branch` without applying it.
    pub fn load_from_branch(&self, branch: &str) -> Option<BranchSession> {
        let path = self.session_path(branch);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "branch session corrupt, ignoring");
                None
            }
        }
    }

    /// Apply the snapshot for `branch`: replace the signal set wholesale and
    /// make its state current. Returns `None` when no snapshot exists.
    pub fn restore_branch(
        &self,
        branch: &str,
        signals: &dyn SignalStore,
    ) -> anyhow::Result<Option<WorkflowState>> {
        let Some(session) = self.load_from_branch(branch) else {
            return Ok(None);
        };
        // Names are checked before the live set is touched.
        let restored: SignalSet = session
            .signals
            .iter()
            .filter(|name| match validate_signal_name(name) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(branch, error = %e, "dropping invalid signal from snapshot");
                    false
                }
            })
            .collect();
        signals.replace_all(&restored)?;
        let mut state = session.state;
        state.signals = restored;
        self.save(&mut state)?;
        tracing::info!(branch, phase = %state.phase, "branch session restored");
        Ok(Some(state))
    }

    /// Saved branch keys, sorted.
    pub fn list_branches(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.sessions_dir) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "json" {
                    return None;
                }
                path.file_stem()?.to_str().map(str::to_string)
            })
            .filter(|key| !key.starts_with('.'))
            .collect();
        keys.sort();
        keys
    }

    /// Delete a saved snapshot. Returns whether one existed.
    pub fn delete_branch(&self, branch: &str) -> anyhow::Result<bool> {
        let path = self.session_path(branch);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow::Error::new(e).context(format!("removing {}", path.display()))),
        }
    }
}
