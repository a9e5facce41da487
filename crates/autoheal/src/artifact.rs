//! Named run artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::result::{HealError, HealResult};

/// Content type of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Pretty-printed JSON
    Json,
    /// Plain text
    Text,
}

/// A stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical name
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Content type
    pub kind: ArtifactKind,
    /// When it was written
    pub created_at: DateTime<Utc>,
}

/// Named artifact persistence.
///
/// Callers add new names per run; overwriting a name is allowed but carries
/// no meaning.
pub trait ArtifactStore {
    /// Store a JSON value
    fn put_json(&self, name: &str, value: &serde_json::Value) -> HealResult<Artifact>;

    /// Store text
    fn put_text(&self, name: &str, text: &str) -> HealResult<Artifact>;

    /// Read an artifact back
    fn get(&self, name: &str) -> HealResult<String>;
}

/// Directory-backed artifact store.
///
/// `put_json("x")` writes `x.json` and `put_text("x")` writes `x.txt`. A
/// name that already has an extension, such as `patch.diff`, is used as is.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Open a store, creating the directory
    pub fn new(dir: impl Into<PathBuf>) -> HealResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| HealError::artifact(dir.display().to_string(), e.to_string()))?;
        Ok(Self { dir })
    }

    /// Store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str, default_ext: &str) -> HealResult<PathBuf> {
        let invalid = name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == "..";
        if invalid {
            return Err(HealError::artifact(name, "invalid artifact name"));
        }
        if Path::new(name).extension().is_some() {
            Ok(self.dir.join(name))
        } else {
            Ok(self.dir.join(format!("{name}.{default_ext}")))
        }
    }

    fn write(&self, name: &str, path: PathBuf, kind: ArtifactKind, body: &str) -> HealResult<Artifact> {
        std::fs::write(&path, body).map_err(|e| HealError::artifact(name, e.to_string()))?;
        debug!(artifact = name, path = %path.display(), "Stored artifact");
        Ok(Artifact {
            name: name.to_string(),
            path,
            kind,
            created_at: Utc::now(),
        })
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put_json(&self, name: &str, value: &serde_json::Value) -> HealResult<Artifact> {
        let path = self.path_for(name, "json")?;
        let body = serde_json::to_string_pretty(value)?;
        self.write(name, path, ArtifactKind::Json, &body)
    }

    fn put_text(&self, name: &str, text: &str) -> HealResult<Artifact> {
        let path = self.path_for(name, "txt")?;
        self.write(name, path, ArtifactKind::Text, text)
    }

    fn get(&self, name: &str) -> HealResult<String> {
        let candidates = [
            self.dir.join(name),
            self.dir.join(format!("{name}.json")),
            self.dir.join(format!("{name}.txt")),
        ];
        candidates
            .iter()
            .find(|p| p.is_file())
            .ok_or_else(|| HealError::artifact(name, "not found"))
            .and_then(|p| std::fs::read_to_string(p).map_err(|e| HealError::artifact(name, e.to_string())))
    }
}
