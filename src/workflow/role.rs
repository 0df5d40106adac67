use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::signals;

/// Agent roles the orchestrator dispatches work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Backend,
    Frontend,
    Tests,
    Reviewer,
    Compound,
}

impl Role {
    pub const ALL: [Self; 6] = [
        Self::Planner,
        Self::Backend,
        Self::Frontend,
        Self::Tests,
        Self::Reviewer,
        Self::Compound,
    ];

    /// The three workers that implement and refine in parallel.
    pub const DOMAIN: [Self; 3] = [Self::Backend, Self::Frontend, Self::Tests];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Tests => "tests",
            Self::Reviewer => "reviewer",
            Self::Compound => "compound",
        }
    }

    /// Signal the role writes when its task is done.
    pub const fn signal(self) -> &'static str {
        match self {
            Self::Planner => signals::PLAN,
            Self::Backend => signals::BACKEND,
            Self::Frontend => signals::FRONTEND,
            Self::Tests => signals::TESTS,
            Self::Reviewer => signals::REVIEW,
            Self::Compound => signals::COMPOUND,
        }
    }

    /// Signal written after a refine pass; only domain workers refine.
    pub const fn refine_signal(self) -> Option<&'static str> {
        match self {
            Self::Backend => Some(signals::BACKEND_REFINE),
            Self::Frontend => Some(signals::FRONTEND_REFINE),
            Self::Tests => Some(signals::TESTS_REFINE),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown role {s:?}"))
    }
}
