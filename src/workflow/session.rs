//! Session context: one project root, its stores and its collaborators.
//!
//! Every transition re-reads signals after its own writes before computing
//! the phase, and persists the phase only as a cache of that computation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;

use super::artifacts::{Artifact, ArtifactSource, FsArtifacts, feature_name_from_plan};
use super::iteration::{self, Decision};
use super::phase::{Phase, PhaseInputs};
use super::review::ReviewOutcome;
use super::role::Role;
use super::signals::{self, FsSignals, SignalSet, SignalStore};
use super::state::{DEFAULT_BRANCH_KEY, StateStore, WorkflowState};
use super::timeline::{EventKind, Timeline, TimelineEvent};
use super::{PROMPTS_DIR, SESSIONS_DIR, SIGNALS_DIR, STATE_FILE, TIMELINE_DIR, workflow_dir};
use crate::config::Config;
use crate::dispatch::{Dispatcher, TmuxDispatcher};
use crate::error::ExitError;
use crate::git::{CommitKind, GitCli, Vcs};
use crate::template::{PromptContext, render_prompt};

/// Point-in-time view of the workflow, computed without writing anything.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: WorkflowState,
    pub signals: SignalSet,
    pub review: ReviewOutcome,
    pub phase: Phase,
}

/// Result of a refresh: the saved state plus what changed.
#[derive(Debug, Clone)]
pub struct Refresh {
    pub state: WorkflowState,
    pub review: ReviewOutcome,
    pub previous: Phase,
}

impl Refresh {
    pub fn changed(&self) -> bool {
        self.previous != self.state.phase
    }
}

pub struct Session {
    root: PathBuf,
    dir: PathBuf,
    config: Config,
    signals: Box<dyn SignalStore>,
    artifacts: Box<dyn ArtifactSource>,
    store: StateStore,
    dispatcher: Box<dyn Dispatcher>,
    vcs: Box<dyn Vcs>,
}

/// Builder for sessions with substituted collaborators.
pub struct SessionBuilder {
    root: PathBuf,
    config: Option<Config>,
    signals: Option<Box<dyn SignalStore>>,
    artifacts: Option<Box<dyn ArtifactSource>>,
    dispatcher: Option<Box<dyn Dispatcher>>,
    vcs: Option<Box<dyn Vcs>>,
}

impl SessionBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn signals(mut self, signals: impl SignalStore + 'static) -> Self {
        self.signals = Some(Box::new(signals));
        self
    }

    #[must_use]
    pub fn artifacts(mut self, artifacts: impl ArtifactSource + 'static) -> Self {
        self.artifacts = Some(Box::new(artifacts));
        self
    }

    #[must_use]
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Some(Box::new(dispatcher));
        self
    }

    #[must_use]
    pub fn vcs(mut self, vcs: impl Vcs + 'static) -> Self {
        self.vcs = Some(Box::new(vcs));
        self
    }

    /// Fill unset parts with the filesystem, tmux and git defaults.
    pub fn build(self) -> anyhow::Result<Session> {
        let dir = workflow_dir(&self.root);
        let config = match self.config {
            Some(config) => config,
            None => Config::load_for(&dir)?,
        };
        let signals = self
            .signals
            .unwrap_or_else(|| Box::new(FsSignals::new(dir.join(SIGNALS_DIR))));
        let artifacts = self
            .artifacts
            .unwrap_or_else(|| Box::new(FsArtifacts::new(&dir)));
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Box::new(TmuxDispatcher::new(
                TmuxDispatcher::session_name_for(&self.root),
                dir.join(PROMPTS_DIR),
            ))
        });
        let vcs = self
            .vcs
            .unwrap_or_else(|| Box::new(GitCli::new(&self.root)));
        Ok(Session {
            store: StateStore::new(dir.join(STATE_FILE), dir.join(SESSIONS_DIR)),
            root: self.root,
            dir,
            config,
            signals,
            artifacts,
            dispatcher,
            vcs,
        })
    }
}

impl Session {
    pub fn builder(root: &Path) -> SessionBuilder {
        SessionBuilder {
            root: root.to_path_buf(),
            config: None,
            signals: None,
            artifacts: None,
            dispatcher: None,
            vcs: None,
        }
    }

    /// Open the session rooted at `root`. Fails when the workflow directory
    /// does not exist.
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        ensure_initialized(root)?;
        Self::builder(root).build()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn artifact_path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn read_artifact(&self, artifact: Artifact) -> Option<String> {
        self.artifacts.read(artifact)
    }

    pub fn state(&self) -> WorkflowState {
        self.store.load()
    }

    pub const fn store(&self) -> &StateStore {
        &self.store
    }

    /// Timeline for the branch the state belongs to.
    pub fn timeline_for(&self, state: &WorkflowState) -> Timeline {
        Timeline::new(&self.dir.join(TIMELINE_DIR), &state.branch_key())
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline_for(&self.state())
    }

    fn record(&self, state: &WorkflowState, event: TimelineEvent) {
        self.timeline_for(state).record(event);
    }

    /// Gather fresh inputs and compute the phase without persisting.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.store.load();
        let inputs = PhaseInputs::gather(self.signals.read_all(), self.artifacts.as_ref());
        Snapshot {
            phase: inputs.phase(),
            review: inputs.review,
            signals: inputs.signals,
            state,
        }
    }

    /// Create the workflow directory and the initial record. Running it
    /// again resumes the existing session instead of resetting it.
    pub fn init(&self, feature: Option<&str>) -> anyhow::Result<WorkflowState> {
        std::fs::create_dir_all(self.dir.join(SIGNALS_DIR))
            .with_context(|| format!("creating {}", self.dir.display()))?;

        if self.store.state_path().exists() {
            let refreshed = self.refresh()?;
            self.record(
                &refreshed.state,
                TimelineEvent::new(EventKind::SessionResume, "session resumed")
                    .with_data(json!({ "phase": refreshed.state.phase })),
            );
            return Ok(refreshed.state);
        }

        let mut state = WorkflowState {
            branch_name: self.vcs.current_branch(),
            feature_name: feature.map(str::to_string),
            ..WorkflowState::default()
        };
        self.store.save(&mut state)?;
        tracing::info!(root = %self.root.display(), branch = ?state.branch_name, "workflow initialized");
        self.record(
            &state,
            TimelineEvent::new(EventKind::SessionStart, "session started")
                .with_data(json!({ "branch": state.branch_name, "feature": state.feature_name })),
        );
        Ok(state)
    }

    /// Re-read signals and artifacts, recompute the phase and persist it.
    pub fn refresh(&self) -> anyhow::Result<Refresh> {
        let mut state = self.store.load();
        let previous = state.phase;
        if state.branch_name.is_none() {
            state.branch_name = self.vcs.current_branch();
        }
        let inputs = PhaseInputs::gather(self.signals.read_all(), self.artifacts.as_ref());

        for role in Role::ALL {
            let signal = role.signal();
            if inputs.signals.contains(signal) && !state.signals.contains(signal) {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::WorkerComplete, format!("{role} finished"))
                        .with_data(json!({ "role": role, "signal": signal })),
                );
            }
        }
        for role in Role::DOMAIN {
            if let Some(signal) = role.refine_signal()
                && inputs.signals.contains(signal)
                && !state.signals.contains(signal)
            {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::WorkerComplete, format!("{role} refined"))
                        .with_data(json!({ "role": role, "signal": signal })),
                );
            }
        }

        state.phase = inputs.phase();
        if let Some(name) = self
            .artifacts
            .read(Artifact::Plan)
            .as_deref()
            .and_then(feature_name_from_plan)
        {
            state.feature_name = Some(name);
        }
        if state.branch_name.is_some() {
            match self.vcs.commit_count(&self.config.git.base_branch) {
                Ok(count) => state.commit_count = count,
                Err(e) => tracing::debug!(error = %e, "commit count unavailable"),
            }
        }
        state.signals = inputs.signals;
        self.store.save(&mut state)?;

        if previous != state.phase {
            tracing::info!(from = %previous, to = %state.phase, "phase changed");
            self.record(
                &state,
                TimelineEvent::new(
                    EventKind::PhaseChange,
                    format!("{previous} -> {}", state.phase),
                )
                .with_data(json!({ "from": previous, "to": state.phase, "review": inputs.review })),
            );
        }

        Ok(Refresh {
            state,
            review: inputs.review,
            previous,
        })
    }

    fn prompt_context(&self, role: Role, state: &WorkflowState) -> PromptContext {
        PromptContext::new(
            role,
            &self.config,
            self.artifact_path(Artifact::Plan).display().to_string(),
            self.artifact_path(Artifact::Review).display().to_string(),
        )
        .feature(state.feature_name.clone())
        .iteration(state.iteration)
    }

    fn send(&self, state: &WorkflowState, ctx: &PromptContext) -> anyhow::Result<()> {
        let prompt = render_prompt(ctx)?;
        self.dispatcher.dispatch(ctx.role, &prompt);
        self.record(
            state,
            TimelineEvent::new(EventKind::WorkerDispatch, format!("dispatched {}", ctx.role))
                .with_data(json!({
                    "role": ctx.role,
                    "refine": ctx.refine,
                    "iteration": ctx.iteration,
                    "model": self.config.models.for_role(ctx.role.as_str()),
                    "timeoutSecs": self.config.timeout_for(ctx.role.as_str()),
                })),
        );
        Ok(())
    }

    fn refuse(action: &str, reason: String) -> Decision {
        tracing::info!(action, %reason, "transition refused");
        Decision::refuse(reason)
    }

    fn require_phase(action: &str, current: Phase, allowed: &[Phase]) -> Option<Decision> {
        if allowed.contains(&current) {
            return None;
        }
        let wanted: Vec<&str> = allowed.iter().map(|p| p.as_str()).collect();
        Some(Self::refuse(
            action,
            format!("{action} needs phase {} (current: {current})", wanted.join(" or ")),
        ))
    }

    /// Ask the planner to write the plan for `description`.
    pub fn start_planning(&self, description: &str) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        if let Some(refusal) =
            Self::require_phase("plan", refreshed.state.phase, &[Phase::Init, Phase::Planning])
        {
            return Ok(refusal);
        }
        let ctx = self
            .prompt_context(Role::Planner, &refreshed.state)
            .description(description);
        self.send(&refreshed.state, &ctx)?;
        Ok(Decision::proceed("planner dispatched"))
    }

    /// Dispatch the three domain workers against the plan.
    pub fn start_implementing(&self) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        if let Some(refusal) =
            Self::require_phase("implement", refreshed.state.phase, &[Phase::Implementing])
        {
            return Ok(refusal);
        }
        let mut state = refreshed.state;
        self.ensure_feature_branch(&mut state)?;

        for role in Role::DOMAIN {
            let ctx = self.prompt_context(role, &state);
            self.send(&state, &ctx)?;
        }
        Ok(Decision::proceed("backend, frontend and tests dispatched"))
    }

    /// Switch to `<prefix><feature-slug>` when still on the base branch.
    /// Failure is reported on the timeline and does not stop dispatch.
    fn ensure_feature_branch(&self, state: &mut WorkflowState) -> anyhow::Result<()> {
        let git = &self.config.git;
        if !git.create_branch {
            return Ok(());
        }
        let on_base = state
            .branch_name
            .as_deref()
            .is_none_or(|b| b == git.base_branch);
        if !on_base {
            return Ok(());
        }
        let Some(feature) = state.feature_name.as_deref() else {
            return Ok(());
        };
        let branch = format!("{}{}", git.branch_prefix, slugify(feature));
        match self.vcs.create_branch(&branch) {
            Ok(()) => {
                let old_log = self.timeline_for(state);
                state.branch_name = Some(branch.clone());
                self.store.save(state)?;
                // The log started on the base branch belongs to this feature.
                let new_log = self.timeline_for(state);
                if old_log.path().is_file()
                    && !new_log.path().exists()
                    && let Err(e) = std::fs::rename(old_log.path(), new_log.path())
                {
                    tracing::warn!(error = %e, "could not move timeline to {branch}");
                }
                self.record(
                    state,
                    TimelineEvent::new(EventKind::Git, format!("created branch {branch}")),
                );
            }
            Err(e) => {
                tracing::warn!(%branch, error = %e, "branch creation failed");
                self.record(
                    state,
                    TimelineEvent::new(EventKind::Error, format!("branch creation failed: {e}")),
                );
            }
        }
        Ok(())
    }

    /// Dispatch the reviewer for the first review of this iteration.
    pub fn start_review(&self) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        if let Some(refusal) =
            Self::require_phase("review", refreshed.state.phase, &[Phase::Reviewing])
        {
            return Ok(refusal);
        }
        let ctx = self.prompt_context(Role::Reviewer, &refreshed.state);
        self.send(&refreshed.state, &ctx)?;
        Ok(Decision::proceed("reviewer dispatched"))
    }

    /// Start a refine round after a failed review.
    pub fn refine(&self) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        let mut state = refreshed.state;
        let decision = iteration::request_refine(&mut state, refreshed.review);
        if !decision.advance {
            if decision.is_escalation() {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::Review, "refine limit reached, escalating")
                        .with_data(json!({ "iteration": state.iteration, "escalate": true })),
                );
            }
            tracing::info!(action = "refine", reason = %decision.reason, "transition refused");
            return Ok(decision);
        }

        self.store.save(&mut state)?;
        self.record(
            &state,
            TimelineEvent::new(EventKind::Review, format!("review failed, refine round {}", state.iteration))
                .with_data(json!({ "outcome": refreshed.review, "iteration": state.iteration })),
        );
        for role in Role::DOMAIN {
            let ctx = self.prompt_context(role, &state).refine();
            self.send(&state, &ctx)?;
        }
        self.refresh()?;
        Ok(decision)
    }

    /// Hand the refined work back to the reviewer.
    pub fn re_review(&self) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        let decision = iteration::request_re_review(&refreshed.state.signals, refreshed.review);
        if !decision.advance {
            tracing::info!(action = "rereview", reason = %decision.reason, "transition refused");
            return Ok(decision);
        }
        let ctx = self.prompt_context(Role::Reviewer, &refreshed.state);
        self.send(&refreshed.state, &ctx)?;
        Ok(decision)
    }

    /// Capture learnings once the review has passed.
    pub fn compound(&self) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        let decision = iteration::request_compound(refreshed.review);
        if !decision.advance {
            tracing::info!(action = "compound", reason = %decision.reason, "transition refused");
            return Ok(decision);
        }
        self.record(
            &refreshed.state,
            TimelineEvent::new(EventKind::Review, format!("review {}", refreshed.review))
                .with_data(json!({ "outcome": refreshed.review, "iteration": refreshed.state.iteration })),
        );
        let ctx = self.prompt_context(Role::Compound, &refreshed.state);
        self.send(&refreshed.state, &ctx)?;
        Ok(decision)
    }

    /// Commit the working tree with a conventional message.
    pub fn commit(&self, kind: CommitKind, message: &str, scope: Option<&str>) -> anyhow::Result<()> {
        let state = self.store.load();
        match self.vcs.commit(kind, message, scope) {
            Ok(()) => {
                let text = crate::git::commit_message(kind, message, scope);
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::Git, format!("commit: {text}")),
                );
                self.refresh()?;
                Ok(())
            }
            Err(e) => {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::Error, format!("commit failed: {e}")),
                );
                Err(e)
            }
        }
    }

    /// Push the branch and open a pull request. On success the `pr` signal
    /// completes the workflow.
    pub fn create_pr(&self, title: Option<&str>) -> anyhow::Result<Decision> {
        let refreshed = self.refresh()?;
        if let Some(refusal) =
            Self::require_phase("pr", refreshed.state.phase, &[Phase::Compounding])
        {
            return Ok(refusal);
        }
        let state = refreshed.state;
        let branch = state
            .branch_name
            .clone()
            .or_else(|| self.vcs.current_branch())
            .context("cannot open a pull request without a branch")?;

        if self.config.git.auto_commit {
            let feature = state.feature_name.as_deref().unwrap_or("feature work");
            if let Err(e) = self.vcs.commit(CommitKind::Feat, feature, None) {
                tracing::warn!(error = %e, "auto-commit skipped");
            }
        }

        let result = self.vcs.push(&branch).and_then(|()| {
            let title = title
                .map(str::to_string)
                .or_else(|| state.feature_name.clone())
                .unwrap_or_else(|| branch.clone());
            let body = format!(
                "Built by crewflow in {} review iteration(s); final review: {}.",
                state.iteration, refreshed.review
            );
            self.vcs.create_pr(&title, &body, &self.config.git.base_branch)
        });

        match result {
            Ok(url) => {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::Git, format!("pull request opened: {url}"))
                        .with_data(json!({ "url": url, "branch": branch })),
                );
                self.signals.set_signal(signals::PR)?;
                self.refresh()?;
                Ok(Decision::proceed(url))
            }
            Err(e) => {
                self.record(
                    &state,
                    TimelineEvent::new(EventKind::Error, format!("pull request failed: {e}")),
                );
                Err(e)
            }
        }
    }

    /// Clear all signals and artifacts and start over at iteration 1 on the
    /// same branch.
    pub fn reset(&self) -> anyhow::Result<WorkflowState> {
        let previous = self.store.load();
        self.signals.clear_all()?;
        self.artifacts.remove(Artifact::Plan)?;
        self.artifacts.remove(Artifact::Review)?;
        for role in Role::ALL {
            self.dispatcher.clear(role);
        }
        let mut state = WorkflowState {
            branch_name: previous.branch_name,
            ..WorkflowState::default()
        };
        self.store.save(&mut state)?;
        tracing::info!("workflow reset");
        self.record(
            &state,
            TimelineEvent::new(EventKind::SessionStart, "workflow reset")
                .with_data(json!({ "reset": true, "previousPhase": previous.phase })),
        );
        Ok(state)
    }

    /// Set a signal by hand and recompute the phase.
    pub fn mark(&self, name: &str) -> anyhow::Result<Refresh> {
        self.signals.set_signal(name)?;
        self.refresh()
    }

    /// Clear a signal by hand and recompute the phase.
    pub fn unmark(&self, name: &str) -> anyhow::Result<Refresh> {
        self.signals.clear_signal(name)?;
        self.refresh()
    }

    pub fn signals(&self) -> SignalSet {
        self.signals.read_all()
    }

    fn resolve_branch(&self, branch: Option<&str>, state: &WorkflowState) -> String {
        branch
            .map(str::to_string)
            .or_else(|| state.branch_name.clone())
            .or_else(|| self.vcs.current_branch())
            .unwrap_or_else(|| DEFAULT_BRANCH_KEY.to_string())
    }

    /// Park the current workflow under `branch` (default: the session's).
    pub fn save_branch_session(&self, branch: Option<&str>) -> anyhow::Result<String> {
        let mut state = self.store.load();
        let branch = self.resolve_branch(branch, &state);
        state.branch_name = Some(branch.clone());
        self.store
            .save_to_branch(&branch, &state, &self.signals.read_all())?;
        Ok(branch)
    }

    /// Restore the workflow parked under `branch`, replacing the live
    /// signal set. Returns `None` when nothing was saved for it.
    pub fn load_branch_session(&self, branch: &str) -> anyhow::Result<Option<WorkflowState>> {
        if self
            .store
            .restore_branch(branch, self.signals.as_ref())?
            .is_none()
        {
            return Ok(None);
        }
        let refreshed = self.refresh()?;
        self.record(
            &refreshed.state,
            TimelineEvent::new(EventKind::SessionResume, format!("resumed branch {branch}"))
                .with_data(json!({ "branch": branch, "phase": refreshed.state.phase })),
        );
        Ok(Some(refreshed.state))
    }

    pub fn list_branch_sessions(&self) -> Vec<String> {
        self.store.list_branches()
    }

    pub fn delete_branch_session(&self, branch: &str) -> anyhow::Result<bool> {
        self.store.delete_branch(branch)
    }
}

/// Fatal-startup check shared by every command except `init`.
pub fn ensure_initialized(root: &Path) -> anyhow::Result<()> {
    let dir = workflow_dir(root);
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ExitError::NotInitialized {
            root: root.display().to_string(),
        }
        .into())
    }
}

/// Lowercase, hyphen-separated branch component.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "feature".to_string()
    } else {
        slug.chars().take(48).collect::<String>().trim_end_matches('-').to_string()
    }
}
