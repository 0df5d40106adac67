//! Review outcome classification.
//!
//! The review document is free-form text written by the reviewer agent. Only
//! the `STATUS:` marker and a warnings co-occurrence heuristic are inspected.
//! Nothing here fails: anything inconclusive is `Pending`.

use std::fmt;

use serde::{Deserialize, Serialize};

const PASS_MARKER: &str = "STATUS: PASS";
const FAIL_MARKER: &str = "STATUS: FAIL";
const WARNINGS_MARKER: &str = "PASS_WITH_WARNINGS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewOutcome {
    Pass,
    PassWithWarnings,
    Fail,
    Pending,
}

impl ReviewOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::PassWithWarnings => "PASS_WITH_WARNINGS",
            Self::Fail => "FAIL",
            Self::Pending => "PENDING",
        }
    }

    /// Review passed, with or without warnings.
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass | Self::PassWithWarnings)
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a review document.
///
/// `artifact` is `None` when the document is missing or unreadable.
pub fn classify_review(artifact: Option<&str>, review_signal_present: bool) -> ReviewOutcome {
    if !review_signal_present {
        return ReviewOutcome::Pending;
    }
    let Some(text) = artifact else {
        return ReviewOutcome::Pending;
    };

    if text.contains(PASS_MARKER) {
        // Known fuzzy match: a passing report that mentions both words
        // anywhere is treated as passing with warnings.
        let warned = text.contains(WARNINGS_MARKER)
            || (text.contains("Warnings") && text.contains("Non-blocking"));
        if warned {
            ReviewOutcome::PassWithWarnings
        } else {
            ReviewOutcome::Pass
        }
    } else if text.contains(FAIL_MARKER) {
        ReviewOutcome::Fail
    } else {
        ReviewOutcome::Pending
    }
}
