//! Signal store: named completion markers shared between the orchestrator
//! and the agent processes.
//!
//! On disk a signal is `<dir>/<name>.done`. The file body is an RFC 3339
//! timestamp used only for diagnostics. Absence means false.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;

pub const PLAN: &str = "plan";
pub const BACKEND: &str = "backend";
pub const FRONTEND: &str = "frontend";
pub const TESTS: &str = "tests";
pub const REVIEW: &str = "review";
pub const COMPOUND: &str = "compound";
pub const PR: &str = "pr";
pub const BACKEND_REFINE: &str = "backend-refine";
pub const FRONTEND_REFINE: &str = "frontend-refine";
pub const TESTS_REFINE: &str = "tests-refine";

/// Signals written by the three domain workers after implementing.
pub const DOMAIN_SIGNALS: [&str; 3] = [BACKEND, FRONTEND, TESTS];
/// Signals written by the three domain workers after a refine pass.
pub const REFINE_SIGNALS: [&str; 3] = [BACKEND_REFINE, FRONTEND_REFINE, TESTS_REFINE];

const MARKER_EXT: &str = "done";

/// Snapshot of the signals observed at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SignalSet(BTreeSet<String>);

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// True when every name in `names` is present.
    pub fn has_all(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.contains(n))
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SignalSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Marker capability used by the phase engine and the session.
///
/// Writes are idempotent per name and never coordinated across writers.
pub trait SignalStore {
    /// Create (or re-stamp) the marker for `name`.
    fn set_signal(&self, name: &str) -> anyhow::Result<()>;

    /// Remove the marker for `name`. Missing markers are not an error.
    fn clear_signal(&self, name: &str) -> anyhow::Result<()>;

    /// Remove every marker.
    fn clear_all(&self) -> anyhow::Result<()>;

    /// Enumerate currently set signals. Never fails: an unreadable store
    /// reads as empty.
    fn read_all(&self) -> SignalSet;

    /// Replace the whole set with `signals` (clear, then recreate). Every
    /// name is validated before anything is cleared.
    fn replace_all(&self, signals: &SignalSet) -> anyhow::Result<()> {
        for name in signals.iter() {
            validate_signal_name(name)?;
        }
        self.clear_all()?;
        for name in signals.iter() {
            self.set_signal(name)?;
        }
        Ok(())
    }
}

/// Filesystem-backed store over a directory of `<name>.done` files.
#[derive(Debug, Clone)]
pub struct FsSignals {
    dir: PathBuf,
}

impl FsSignals {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        validate_signal_name(name)?;
        Ok(self.dir.join(format!("{name}.{MARKER_EXT}")))
    }

    /// Timestamp payload of a marker, if present and readable.
    pub fn stamp(&self, name: &str) -> Option<String> {
        let path = self.marker_path(name).ok()?;
        fs::read_to_string(path).ok().map(|s| s.trim().to_string())
    }
}

impl SignalStore for FsSignals {
    fn set_signal(&self, name: &str) -> anyhow::Result<()> {
        let path = self.marker_path(name)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        fs::write(&path, chrono::Utc::now().to_rfc3339())
            .with_context(|| format!("writing signal {}", path.display()))?;
        tracing::debug!(signal = name, "signal set");
        Ok(())
    }

    fn clear_signal(&self, name: &str) -> anyhow::Result<()> {
        let path = self.marker_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(signal = name, "signal cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("removing {}", path.display()))),
        }
    }

    fn clear_all(&self) -> anyhow::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("listing {}", self.dir.display())));
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == MARKER_EXT) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(
                            anyhow::Error::new(e).context(format!("removing {}", path.display()))
                        );
                    }
                }
            }
        }
        tracing::debug!(dir = %self.dir.display(), "all signals cleared");
        Ok(())
    }

    fn read_all(&self) -> SignalSet {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return SignalSet::new();
        };
        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != MARKER_EXT {
                    return None;
                }
                let name = path.file_stem()?.to_str()?;
                if let Err(e) = validate_signal_name(name) {
                    tracing::debug!(path = %path.display(), error = %e, "ignoring foreign marker");
                    return None;
                }
                Some(name.to_string())
            })
            .collect()
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySignals {
    inner: Mutex<SignalSet>,
}

impl MemorySignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(names: &[&str]) -> Self {
        Self {
            inner: Mutex::new(names.iter().copied().collect()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignalSet> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SignalStore for MemorySignals {
    fn set_signal(&self, name: &str) -> anyhow::Result<()> {
        validate_signal_name(name)?;
        self.lock().insert(name);
        Ok(())
    }

    fn clear_signal(&self, name: &str) -> anyhow::Result<()> {
        self.lock().remove(name);
        Ok(())
    }

    fn clear_all(&self) -> anyhow::Result<()> {
        *self.lock() = SignalSet::new();
        Ok(())
    }

    fn read_all(&self) -> SignalSet {
        self.lock().clone()
    }
}

/// Signal names map to file names, so keep them to `[a-z0-9][a-z0-9-]*`.
pub fn validate_signal_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty()
        || name.len() > 64
        || name.starts_with('-')
        || !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        anyhow::bail!("invalid signal name {name:?}: must match [a-z0-9][a-z0-9-]*, max 64 chars");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_signal_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path().join("signals"));

        store.set_signal(BACKEND).unwrap();
        store.set_signal(BACKEND).unwrap();

        let signals = store.read_all();
        assert_eq!(signals.len(), 1);
        assert!(signals.contains(BACKEND));
    }

    #[test]
    fn marker_payload_is_a_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path());
        store.set_signal(PLAN).unwrap();

        let stamp = store.stamp(PLAN).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok(), "got {stamp}");
        assert!(dir.path().join("plan.done").exists());
    }

    #[test]
    fn read_all_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path().join("does-not-exist"));
        assert!(store.read_all().is_empty());
    }

    #[test]
    fn read_all_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path());
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        fs::write(dir.path().join("tests-refine.done"), "").unwrap();

        let signals = store.read_all();
        assert_eq!(signals.iter().collect::<Vec<_>>(), vec![TESTS_REFINE]);
    }

    #[test]
    fn read_all_skips_invalid_marker_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path());
        store.set_signal(PLAN).unwrap();
        fs::write(dir.path().join("Backend.done"), "").unwrap();
        fs::write(dir.path().join("a.b.done"), "").unwrap();

        let signals = store.read_all();
        assert_eq!(signals.iter().collect::<Vec<_>>(), vec![PLAN]);
    }

    #[test]
    fn replace_all_with_invalid_name_keeps_current_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path());
        store.set_signal(PLAN).unwrap();
        store.set_signal(BACKEND).unwrap();

        let target: SignalSet = [REVIEW, "Backend"].into_iter().collect();
        assert!(store.replace_all(&target).is_err());

        let live = store.read_all();
        assert!(live.contains(PLAN));
        assert!(live.contains(BACKEND));
        assert!(!live.contains(REVIEW));
    }

    #[test]
    fn clear_missing_signal_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path().join("signals"));
        store.clear_signal(REVIEW).unwrap();
        store.clear_all().unwrap();
    }

    #[test]
    fn clear_all_keeps_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSignals::new(dir.path());
        store.set_signal(BACKEND).unwrap();
        store.set_signal(FRONTEND).unwrap();
        fs::write(dir.path().join("README"), "keep").unwrap();

        store.clear_all().unwrap();

        assert!(store.read_all().is_empty());
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn replace_all_drops_unlisted_signals() {
        let store = MemorySignals::with(&[PLAN, BACKEND, REVIEW]);
        let target: SignalSet = [PLAN, FRONTEND].into_iter().collect();

        store.replace_all(&target).unwrap();

        assert_eq!(store.read_all(), target);
    }

    #[test]
    fn rejects_path_like_names() {
        let store = MemorySignals::new();
        assert!(store.set_signal("../escape").is_err());
        assert!(store.set_signal("").is_err());
        assert!(store.set_signal("-flag").is_err());
        assert!(store.set_signal("Backend").is_err());
        assert!(store.set_signal("backend-refine").is_ok());
    }

    #[test]
    fn has_all_requires_every_name() {
        let set: SignalSet = [BACKEND_REFINE, FRONTEND_REFINE].into_iter().collect();
        assert!(!set.has_all(&REFINE_SIGNALS));
        let set: SignalSet = REFINE_SIGNALS.into_iter().collect();
        assert!(set.has_all(&REFINE_SIGNALS));
    }
}
