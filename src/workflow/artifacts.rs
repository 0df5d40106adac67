//! Plan and review documents written by the planner and reviewer agents.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Plan,
    Review,
}

impl Artifact {
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Plan => "plan.md",
            Self::Review => "review.md",
        }
    }
}

/// Read side of the artifact documents.
///
/// `read` returns `None` both for missing and unreadable documents; callers
/// cannot and need not tell the two apart.
pub trait ArtifactSource {
    fn read(&self, artifact: Artifact) -> Option<String>;

    fn exists(&self, artifact: Artifact) -> bool {
        self.read(artifact).is_some()
    }

    fn write(&self, artifact: Artifact, content: &str) -> anyhow::Result<()>;

    fn remove(&self, artifact: Artifact) -> anyhow::Result<()>;
}

/// Artifacts stored as markdown files in the workflow directory.
#[derive(Debug, Clone)]
pub struct FsArtifacts {
    dir: PathBuf,
}

impl FsArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSource for FsArtifacts {
    fn read(&self, artifact: Artifact) -> Option<String> {
        fs::read_to_string(self.path(artifact)).ok()
    }

    fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    fn write(&self, artifact: Artifact, content: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let path = self.path(artifact);
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))
    }

    fn remove(&self, artifact: Artifact) -> anyhow::Result<()> {
        let path = self.path(artifact);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("removing {}", path.display()))),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryArtifacts {
    docs: Mutex<HashMap<Artifact, String>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Artifact, String>> {
        self.docs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ArtifactSource for MemoryArtifacts {
    fn read(&self, artifact: Artifact) -> Option<String> {
        self.lock().get(&artifact).cloned()
    }

    fn write(&self, artifact: Artifact, content: &str) -> anyhow::Result<()> {
        self.lock().insert(artifact, content.to_string());
        Ok(())
    }

    fn remove(&self, artifact: Artifact) -> anyhow::Result<()> {
        self.lock().remove(&artifact);
        Ok(())
    }
}

/// First markdown heading of the plan, with a leading `Plan:`/`Feature:`
/// label stripped.
pub fn feature_name_from_plan(plan: &str) -> Option<String> {
    let heading = Regex::new(r"(?m)^#{1,3}\s+(.+?)\s*#*\s*$").ok()?;
    let title = heading.captures(plan)?.get(1)?.as_str().trim();
    let label = Regex::new(r"(?i)^(?:implementation\s+)?(?:plan|feature)\s*[:\-]\s*").ok()?;
    let title = label.replace(title, "").trim().to_string();
    if title.is_empty() { None } else { Some(title) }
}
