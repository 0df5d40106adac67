//! Branch-scoped, append-only event log.
//!
//! Each append rewrites the whole JSON array. Events arrive at human pace,
//! so the log is never compacted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{sanitize_branch, write_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,
    SessionResume,
    PhaseChange,
    WorkerDispatch,
    WorkerComplete,
    Review,
    Git,
    Error,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::SessionResume => "session_resume",
            Self::PhaseChange => "phase_change",
            Self::WorkerDispatch => "worker_dispatch",
            Self::WorkerComplete => "worker_complete",
            Self::Review => "review",
            Self::Git => "git",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl TimelineEvent {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Derived metrics over one branch's log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimelineSummary {
    pub total: usize,
    pub by_kind: BTreeMap<EventKind, usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub dispatches: usize,
    pub errors: usize,
}

impl TimelineSummary {
    pub fn from_events(events: &[TimelineEvent]) -> Self {
        let mut by_kind = BTreeMap::new();
        for event in events {
            *by_kind.entry(event.kind).or_insert(0) += 1;
        }
        let started_at = events.first().map(|e| e.timestamp);
        let last_at = events.last().map(|e| e.timestamp);
        let duration_secs = match (started_at, last_at) {
            (Some(first), Some(last)) => (last - first).num_seconds().max(0),
            _ => 0,
        };
        Self {
            total: events.len(),
            dispatches: by_kind.get(&EventKind::WorkerDispatch).copied().unwrap_or(0),
            errors: by_kind.get(&EventKind::Error).copied().unwrap_or(0),
            by_kind,
            started_at,
            last_at,
            duration_secs,
        }
    }
}

/// Event log for one branch.
#[derive(Debug, Clone)]
pub struct Timeline {
    path: PathBuf,
}

impl Timeline {
    /// Log for `branch_key` under `dir`. The key is sanitized again so raw
    /// branch names are safe to pass.
    pub fn new(dir: &Path, branch_key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", sanitize_branch(branch_key))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All events in chronological order. A missing or corrupt log reads as
    /// empty.
    pub fn events(&self) -> Vec<TimelineEvent> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "timeline corrupt, treating as empty");
            Vec::new()
        })
    }

    pub fn append(&self, event: TimelineEvent) -> anyhow::Result<()> {
        let mut events = self.events();
        tracing::debug!(kind = event.kind.as_str(), message = %event.message, "timeline event");
        events.push(event);
        let json = serde_json::to_string_pretty(&events).context("serializing timeline")?;
        write_atomic(&self.path, &json)
    }

    /// Append, logging instead of failing. The log is diagnostic, so a
    /// failed write must not abort a workflow transition.
    pub fn record(&self, event: TimelineEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append timeline event");
        }
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<TimelineEvent> {
        let events = self.events();
        let skip = events.len().saturating_sub(n);
        events.into_iter().skip(skip).collect()
    }

    pub fn summary(&self) -> TimelineSummary {
        TimelineSummary::from_events(&self.events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn append_then_recent_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = Timeline::new(dir.path(), "main");
        for i in 0..5 {
            timeline
                .append(TimelineEvent::new(EventKind::PhaseChange, format!("event {i}")))
                .unwrap();
        }

        let recent = timeline.recent(3);
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
        assert_eq!(timeline.recent(50).len(), 5);
        assert!(timeline.recent(0).is_empty());
    }

    #[test]
    fn logs_are_branch_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let a = Timeline::new(dir.path(), "feature/a");
        let b = Timeline::new(dir.path(), "feature/b");
        a.append(TimelineEvent::new(EventKind::SessionStart, "a")).unwrap();

        assert_eq!(a.events().len(), 1);
        assert!(b.events().is_empty());
        assert!(dir.path().join("feature-a.json").exists());
    }

    #[test]
    fn event_type_serializes_as_type_field() {
        let event = TimelineEvent::new(EventKind::WorkerDispatch, "backend")
            .with_data(serde_json::json!({ "role": "backend" }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "worker_dispatch");
        assert_eq!(json["data"]["role"], "backend");

        let bare = serde_json::to_value(TimelineEvent::new(EventKind::Git, "push")).unwrap();
        assert!(bare.get("data").is_none());
    }

    #[test]
    fn corrupt_log_reads_empty_and_append_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = Timeline::new(dir.path(), "main");
        fs::write(timeline.path(), "[{").unwrap();
        assert!(timeline.events().is_empty());

        timeline.append(TimelineEvent::new(EventKind::Error, "x")).unwrap();
        assert_eq!(timeline.events().len(), 1);
    }

    #[test]
    fn summary_counts_and_duration() {
        let start = Utc::now();
        let mut events = vec![
            TimelineEvent::new(EventKind::SessionStart, "start"),
            TimelineEvent::new(EventKind::WorkerDispatch, "backend"),
            TimelineEvent::new(EventKind::WorkerDispatch, "frontend"),
            TimelineEvent::new(EventKind::Error, "push failed"),
        ];
        for (i, event) in events.iter_mut().enumerate() {
            event.timestamp = start + Duration::seconds(i64::try_from(i).unwrap() * 30);
        }

        let summary = TimelineSummary::from_events(&events);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.dispatches, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.duration_secs, 90);
        assert_eq!(summary.by_kind.get(&EventKind::SessionStart), Some(&1));
    }

    #[test]
    fn empty_summary() {
        let summary = TimelineSummary::from_events(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.duration_secs, 0);
        assert!(summary.started_at.is_none());
    }
}
