//! End-to-end workflow scenarios against the library API: real signal and
//! artifact files in a temp dir, recording dispatcher and VCS.

use std::fs;
use std::sync::Arc;

use crewflow::config::Config;
use crewflow::dispatch::MemoryDispatcher;
use crewflow::git::MemoryVcs;
use crewflow::workflow::artifacts::{Artifact, ArtifactSource, MemoryArtifacts};
use crewflow::workflow::signals::{self, SignalSet};
use crewflow::workflow::{EventKind, Phase, Role, Session, determine_phase};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    session: Session,
    dispatcher: Arc<MemoryDispatcher>,
    vcs: Arc<MemoryVcs>,
}

impl Harness {
    fn new() -> Self {
        Self::with_vcs(MemoryVcs::on_branch("main"))
    }

    fn with_vcs(vcs: MemoryVcs) -> Self {
        let dir = TempDir::new().unwrap();
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let vcs = Arc::new(vcs);
        let session = Session::builder(dir.path())
            .config(Config::default())
            .dispatcher(Arc::clone(&dispatcher))
            .vcs(Arc::clone(&vcs))
            .build()
            .unwrap();
        session.init(None).unwrap();
        Self {
            _dir: dir,
            session,
            dispatcher,
            vcs,
        }
    }

    fn write(&self, artifact: Artifact, text: &str) {
        fs::write(self.session.artifact_path(artifact), text).unwrap();
    }

    fn mark(&self, names: &[&str]) -> Phase {
        let mut phase = self.session.snapshot().phase;
        for name in names {
            phase = self.session.mark(name).unwrap().state.phase;
        }
        phase
    }

    fn phase(&self) -> Phase {
        self.session.snapshot().phase
    }

    fn dispatched_since(&self, start: usize) -> Vec<Role> {
        self.dispatcher.roles().into_iter().skip(start).collect()
    }

    /// Drive the workflow to `reviewing` with the domain work done.
    fn implemented(&self) {
        self.write(Artifact::Plan, "# Plan: User Avatars\n\n1. upload endpoint\n");
        self.mark(&[signals::PLAN]);
        assert!(self.session.start_implementing().unwrap().advance);
        assert_eq!(self.mark(&signals::DOMAIN_SIGNALS), Phase::Reviewing);
    }

    fn fail_review(&self) {
        self.write(Artifact::Review, "# Review\n\nSTATUS: FAIL\n\n1. avatar upload skips size check\n");
        self.mark(&[signals::REVIEW]);
    }
}

fn phase_changes(session: &Session) -> Vec<(String, String)> {
    session
        .timeline()
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::PhaseChange)
        .map(|e| {
            (
                e.data["from"].as_str().unwrap_or_default().to_string(),
                e.data["to"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[test]
fn happy_path_reaches_complete() {
    let h = Harness::new();
    assert_eq!(h.phase(), Phase::Init);

    let decision = h.session.start_planning("Let users upload avatars").unwrap();
    assert!(decision.advance);
    assert_eq!(h.dispatcher.roles(), vec![Role::Planner]);
    assert!(h.dispatcher.sent()[0].1.contains("Let users upload avatars"));

    h.write(Artifact::Plan, "# Plan: User Avatars\n");
    assert_eq!(h.session.refresh().unwrap().state.phase, Phase::Planning);
    assert_eq!(h.mark(&[signals::PLAN]), Phase::Implementing);

    let decision = h.session.start_implementing().unwrap();
    assert!(decision.advance, "{}", decision.reason);
    assert_eq!(h.dispatched_since(1), Role::DOMAIN.to_vec());
    assert_eq!(h.session.state().branch_name.as_deref(), Some("feature/user-avatars"));

    assert_eq!(h.mark(&[signals::BACKEND, signals::FRONTEND]), Phase::Implementing);
    assert_eq!(h.mark(&[signals::TESTS]), Phase::Reviewing);

    assert!(h.session.start_review().unwrap().advance);
    assert_eq!(h.dispatched_since(4), vec![Role::Reviewer]);

    h.write(Artifact::Review, "# Review\n\nSTATUS: PASS\n");
    assert_eq!(h.mark(&[signals::REVIEW]), Phase::Compounding);

    assert!(h.session.compound().unwrap().advance);
    assert_eq!(h.dispatched_since(5), vec![Role::Compound]);
    assert_eq!(h.mark(&[signals::COMPOUND]), Phase::Compounding);

    let decision = h.session.create_pr(None).unwrap();
    assert!(decision.advance);
    assert_eq!(decision.reason, "memory://pr/main/User-Avatars");
    assert_eq!(h.phase(), Phase::Complete);
    assert_eq!(
        *h.vcs.pushed.lock().unwrap(),
        vec!["feature/user-avatars".to_string()]
    );

    let changes = phase_changes(&h.session);
    let expected: Vec<(String, String)> = [
        ("init", "planning"),
        ("planning", "implementing"),
        ("implementing", "reviewing"),
        ("reviewing", "compounding"),
        ("compounding", "complete"),
    ]
    .iter()
    .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
    .collect();
    assert_eq!(changes, expected);
}

#[test]
fn one_refine_cycle_then_pass() {
    let h = Harness::new();
    h.implemented();
    h.fail_review();
    assert_eq!(h.phase(), Phase::Refining);

    let before = h.dispatcher.sent().len();
    let decision = h.session.refine().unwrap();
    assert!(decision.advance, "{}", decision.reason);
    assert_eq!(h.session.state().iteration, 2);

    let sent: Vec<_> = h.dispatcher.sent().into_iter().skip(before).collect();
    assert_eq!(sent.len(), 3);
    for (role, prompt) in &sent {
        assert!(Role::DOMAIN.contains(role));
        assert!(prompt.contains("REFINE MODE (iteration 2 of 3)"));
        assert!(prompt.contains(&format!("{}-refine", role.as_str())));
    }

    let refused = h.session.re_review().unwrap();
    assert!(!refused.advance);
    assert!(refused.reason.contains("backend-refine"));

    assert_eq!(h.mark(&[signals::BACKEND_REFINE, signals::FRONTEND_REFINE]), Phase::Refining);
    assert_eq!(h.mark(&[signals::TESTS_REFINE]), Phase::Reviewing);

    assert!(h.session.re_review().unwrap().advance);
    assert_eq!(h.dispatcher.roles().last(), Some(&Role::Reviewer));

    h.write(Artifact::Review, "# Review\n\nSTATUS: PASS\n");
    assert_eq!(h.session.refresh().unwrap().state.phase, Phase::Compounding);
    assert_eq!(h.session.state().iteration, 2);
}

#[test]
fn third_refine_escalates() {
    let h = Harness::new();
    h.implemented();
    h.fail_review();

    assert!(h.session.refine().unwrap().advance);
    assert!(h.session.refine().unwrap().advance);
    assert_eq!(h.session.state().iteration, 3);

    let dispatched = h.dispatcher.sent().len();
    let decision = h.session.refine().unwrap();
    assert!(!decision.advance);
    assert!(decision.is_escalation());
    assert_eq!(decision.reason, "max iterations reached, escalate to human");
    assert_eq!(h.session.state().iteration, 3);
    assert_eq!(h.dispatcher.sent().len(), dispatched);

    let escalated = h
        .session
        .timeline()
        .events()
        .into_iter()
        .any(|e| e.kind == EventKind::Review && e.data["escalate"] == true);
    assert!(escalated);
}

#[test]
fn compound_refused_on_failed_review() {
    let h = Harness::new();
    h.implemented();
    h.fail_review();
    let decision = h.session.compound().unwrap();
    assert!(!decision.advance);
    assert!(decision.reason.contains("FAIL"));
}

#[test]
fn later_progress_dominates() {
    let artifacts = MemoryArtifacts::new();
    artifacts.write(Artifact::Review, "STATUS: FAIL").unwrap();

    let all: SignalSet = [
        signals::PLAN,
        signals::BACKEND,
        signals::FRONTEND,
        signals::TESTS,
        signals::REVIEW,
        signals::COMPOUND,
        signals::PR,
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    assert_eq!(determine_phase(&all, &artifacts), Phase::Complete);

    let mut without_pr = all.clone();
    without_pr.remove(signals::PR);
    assert_eq!(determine_phase(&without_pr, &artifacts), Phase::Compounding);

    let mut failed = without_pr;
    failed.remove(signals::COMPOUND);
    assert_eq!(determine_phase(&failed, &artifacts), Phase::Refining);
}

#[test]
fn pr_failure_is_recorded_and_leaves_workflow_open() {
    let h = Harness::with_vcs(MemoryVcs {
        fail_push: true,
        ..MemoryVcs::on_branch("feature/search")
    });
    assert_eq!(h.mark(&[signals::COMPOUND]), Phase::Compounding);

    let err = h.session.create_pr(Some("Search")).unwrap_err();
    assert!(err.to_string().contains("push rejected"));
    assert!(!h.session.signals().contains(signals::PR));
    assert_eq!(h.phase(), Phase::Compounding);
    let errors = h
        .session
        .timeline()
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::Error)
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn branch_sessions_are_isolated() {
    let h = Harness::with_vcs(MemoryVcs::on_branch("feature/a"));
    h.mark(&[signals::PLAN, signals::BACKEND]);
    h.session.save_branch_session(None).unwrap();

    h.session.reset().unwrap();
    h.mark(&[signals::PLAN]);
    h.session.save_branch_session(Some("feature/b")).unwrap();

    assert_eq!(
        h.session.list_branch_sessions(),
        vec!["feature-a".to_string(), "feature-b".to_string()]
    );

    let a = h.session.load_branch_session("feature/a").unwrap().unwrap();
    assert_eq!(a.branch_name.as_deref(), Some("feature/a"));
    assert!(h.session.signals().contains(signals::BACKEND));
    assert_eq!(a.phase, Phase::Implementing);

    h.session.load_branch_session("feature/b").unwrap().unwrap();
    assert!(!h.session.signals().contains(signals::BACKEND));
    assert!(h.session.signals().contains(signals::PLAN));

    assert!(h.session.load_branch_session("feature/missing").unwrap().is_none());
    assert!(h.session.delete_branch_session("feature/b").unwrap());
    assert!(!h.session.delete_branch_session("feature/b").unwrap());
}

#[test]
fn status_survives_corrupt_state_file() {
    let h = Harness::new();
    let dir = h.session.dir().to_path_buf();
    fs::write(dir.join("state.json"), "{ not json").unwrap();
    h.mark(&[signals::PLAN]);
    let state = h.session.state();
    assert_eq!(state.phase, Phase::Implementing);
    assert!(dir.join("state.json").is_file());
}
