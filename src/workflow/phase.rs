//! Phase engine: derives the workflow phase from observed signals.
//!
//! Rules are evaluated in precedence order and the first match wins. Later
//! progress dominates, so contradictory signals (e.g. `compound` alongside a
//! failed review) resolve forward instead of erroring.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::artifacts::{Artifact, ArtifactSource};
use super::review::{ReviewOutcome, classify_review};
use super::signals::{self, DOMAIN_SIGNALS, REFINE_SIGNALS, SignalSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Init,
    Planning,
    Implementing,
    Reviewing,
    Refining,
    Compounding,
    Complete,
}

impl Phase {
    pub const ALL: [Self; 7] = [
        Self::Init,
        Self::Planning,
        Self::Implementing,
        Self::Reviewing,
        Self::Refining,
        Self::Compounding,
        Self::Complete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Reviewing => "reviewing",
            Self::Refining => "refining",
            Self::Compounding => "compounding",
            Self::Complete => "complete",
        }
    }

    /// Short hint shown next to the phase in status output.
    pub const fn next_step(self) -> &'static str {
        match self {
            Self::Init => "describe the feature with `crewflow plan`",
            Self::Planning => "wait for the planner to signal `plan`",
            Self::Implementing => "dispatch workers with `crewflow implement`",
            Self::Reviewing => "dispatch the reviewer with `crewflow review`",
            Self::Refining => "start a round with `crewflow refine`, then `crewflow rereview`",
            Self::Compounding => "capture learnings with `crewflow compound`, then `crewflow pr`",
            Self::Complete => "done; `crewflow reset` to start the next feature",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown phase {s:?}"))
    }
}

/// Everything the engine looks at, gathered fresh for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseInputs {
    pub signals: SignalSet,
    pub review: ReviewOutcome,
    pub plan_exists: bool,
}

impl PhaseInputs {
    /// Read the artifacts now and classify the review against `signals`.
    pub fn gather(signals: SignalSet, artifacts: &dyn ArtifactSource) -> Self {
        let review_text = artifacts.read(Artifact::Review);
        let review = classify_review(review_text.as_deref(), signals.contains(signals::REVIEW));
        let plan_exists = artifacts.exists(Artifact::Plan);
        Self {
            signals,
            review,
            plan_exists,
        }
    }

    pub fn phase(&self) -> Phase {
        evaluate(&self.signals, self.review, self.plan_exists)
    }
}

/// Compute the phase from the signal set, re-reading the review and plan
/// documents on every call.
pub fn determine_phase(signals: &SignalSet, artifacts: &dyn ArtifactSource) -> Phase {
    PhaseInputs::gather(signals.clone(), artifacts).phase()
}

/// The rule table over already-gathered inputs.
pub fn evaluate(signals: &SignalSet, review: ReviewOutcome, plan_exists: bool) -> Phase {
    if signals.contains(signals::PR) {
        return Phase::Complete;
    }
    if signals.contains(signals::COMPOUND) {
        return Phase::Compounding;
    }

    let reviewed = signals.contains(signals::REVIEW);
    if reviewed && review.is_pass() {
        return Phase::Compounding;
    }
    if reviewed && review == ReviewOutcome::Fail {
        return if signals.has_all(&REFINE_SIGNALS) {
            Phase::Reviewing
        } else {
            Phase::Refining
        };
    }

    if signals.has_all(&DOMAIN_SIGNALS) {
        return Phase::Reviewing;
    }
    if signals.contains(signals::PLAN) {
        return Phase::Implementing;
    }
    if plan_exists {
        return Phase::Planning;
    }
    Phase::Init
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::artifacts::MemoryArtifacts;
    use crate::workflow::signals::*;

    fn set(names: &[&str]) -> SignalSet {
        names.iter().copied().collect()
    }

    #[test]
    fn empty_is_init() {
        assert_eq!(evaluate(&set(&[]), ReviewOutcome::Pending, false), Phase::Init);
    }

    #[test]
    fn plan_artifact_without_signal_is_planning() {
        assert_eq!(evaluate(&set(&[]), ReviewOutcome::Pending, true), Phase::Planning);
    }

    #[test]
    fn plan_signal_is_implementing() {
        assert_eq!(evaluate(&set(&[PLAN]), ReviewOutcome::Pending, true), Phase::Implementing);
        // forward evidence wins even without the artifact
        assert_eq!(evaluate(&set(&[PLAN]), ReviewOutcome::Pending, false), Phase::Implementing);
    }

    #[test]
    fn partial_domain_signals_stay_implementing() {
        let signals = set(&[PLAN, BACKEND, TESTS]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Pending, true), Phase::Implementing);
    }

    #[test]
    fn all_domain_signals_is_reviewing() {
        let signals = set(&[PLAN, BACKEND, FRONTEND, TESTS]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Pending, true), Phase::Reviewing);
    }

    #[test]
    fn review_signal_with_pending_outcome_stays_reviewing() {
        let signals = set(&[PLAN, BACKEND, FRONTEND, TESTS, REVIEW]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Pending, true), Phase::Reviewing);
    }

    #[test]
    fn passing_review_is_compounding() {
        let signals = set(&[PLAN, BACKEND, FRONTEND, TESTS, REVIEW]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Pass, true), Phase::Compounding);
        assert_eq!(
            evaluate(&signals, ReviewOutcome::PassWithWarnings, true),
            Phase::Compounding
        );
    }

    #[test]
    fn failed_review_gates_on_all_refine_signals() {
        let mut signals = set(&[PLAN, BACKEND, FRONTEND, TESTS, REVIEW, BACKEND_REFINE, TESTS_REFINE]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Fail, true), Phase::Refining);

        signals.insert(FRONTEND_REFINE);
        assert_eq!(evaluate(&signals, ReviewOutcome::Fail, true), Phase::Reviewing);
    }

    #[test]
    fn compound_beats_failed_review() {
        let signals = set(&[COMPOUND, BACKEND, FRONTEND, TESTS, REVIEW]);
        assert_eq!(evaluate(&signals, ReviewOutcome::Fail, true), Phase::Compounding);
    }

    #[test]
    fn compound_without_implementation_signals_still_compounding() {
        assert_eq!(evaluate(&set(&[COMPOUND]), ReviewOutcome::Pending, false), Phase::Compounding);
    }

    #[test]
    fn pr_is_complete() {
        assert_eq!(evaluate(&set(&[COMPOUND, PR]), ReviewOutcome::Pass, true), Phase::Complete);
        assert_eq!(evaluate(&set(&[PR]), ReviewOutcome::Pending, false), Phase::Complete);
    }

    #[test]
    fn determine_phase_reads_review_fresh() {
        let artifacts = MemoryArtifacts::new();
        let signals = set(&[PLAN, BACKEND, FRONTEND, TESTS, REVIEW]);

        artifacts.write(Artifact::Review, "STATUS: FAIL").unwrap();
        assert_eq!(determine_phase(&signals, &artifacts), Phase::Refining);

        artifacts.write(Artifact::Review, "STATUS: PASS").unwrap();
        assert_eq!(determine_phase(&signals, &artifacts), Phase::Compounding);
    }

    #[test]
    fn determine_phase_is_deterministic() {
        let artifacts = MemoryArtifacts::new();
        artifacts.write(Artifact::Plan, "# Plan: x").unwrap();
        artifacts.write(Artifact::Review, "STATUS: FAIL").unwrap();
        let signals = set(&[PLAN, BACKEND, FRONTEND, TESTS, REVIEW, FRONTEND_REFINE]);

        let first = determine_phase(&signals, &artifacts);
        for _ in 0..10 {
            assert_eq!(determine_phase(&signals, &artifacts), first);
        }
    }

    #[test]
    fn phase_parses_and_displays() {
        for phase in Phase::ALL {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
        assert!("done".parse::<Phase>().is_err());
    }
}
