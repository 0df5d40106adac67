//! Bounded review/refine loop policy.
//!
//! Refusals are advisory: they carry a reason for the user and never change
//! state. Reaching the iteration cap means a human has to take over.

use super::review::ReviewOutcome;
use super::signals::{REFINE_SIGNALS, SignalSet};
use super::state::WorkflowState;

/// Refine rounds allowed before escalation.
pub const MAX_ITERATIONS: u32 = 3;

pub const ESCALATE_REASON: &str = "max iterations reached, escalate to human";

/// Outcome of asking the controller for a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub advance: bool,
    pub reason: String,
}

impl Decision {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            advance: true,
            reason: reason.into(),
        }
    }

    pub fn refuse(reason: impl Into<String>) -> Self {
        Self {
            advance: false,
            reason: reason.into(),
        }
    }

    /// Refused because the iteration cap was hit.
    pub fn is_escalation(&self) -> bool {
        !self.advance && self.reason == ESCALATE_REASON
    }
}

/// Start another refine round. On success `state.iteration` is incremented;
/// no signals are touched.
pub fn request_refine(state: &mut WorkflowState, review: ReviewOutcome) -> Decision {
    if review != ReviewOutcome::Fail {
        return Decision::refuse(format!(
            "refine needs a failed review (review is {review})"
        ));
    }
    if state.iteration >= MAX_ITERATIONS {
        tracing::warn!(iteration = state.iteration, "refine refused at iteration cap");
        return Decision::refuse(ESCALATE_REASON);
    }
    state.iteration += 1;
    Decision::proceed(format!(
        "refine round {} of {MAX_ITERATIONS}",
        state.iteration
    ))
}

/// Ask the reviewer to look again once every domain worker has refined.
pub fn request_re_review(signals: &SignalSet, review: ReviewOutcome) -> Decision {
    if review != ReviewOutcome::Fail {
        return Decision::refuse(format!(
            "re-review follows a failed review (review is {review})"
        ));
    }
    let missing: Vec<&str> = REFINE_SIGNALS
        .into_iter()
        .filter(|s| !signals.contains(s))
        .collect();
    if missing.is_empty() {
        Decision::proceed("all refine signals present")
    } else {
        Decision::refuse(format!("waiting on refine signals: {}", missing.join(", ")))
    }
}

/// Move on to compounding once the review passed.
pub fn request_compound(review: ReviewOutcome) -> Decision {
    if review.is_pass() {
        Decision::proceed(format!("review {review}"))
    } else {
        Decision::refuse(format!("compound needs a passing review (review is {review})"))
    }
}
