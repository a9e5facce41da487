//! Context retrieval over a local JSON-lines index.
//!
//! Records live in `<base_path>/index.jsonl`, one `{id, text, meta}` object
//! per line. Scoring is shared-token overlap with the query fields, which is
//! enough to ground a prompt with related past fixes or commits.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::discovery::walk_files;
use crate::result::{HealError, HealResult};

/// File name of the index inside the base path
pub const INDEX_FILE: &str = "index.jsonl";

/// One indexed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Stable id
    pub id: String,
    /// Searchable text
    pub text: String,
    /// Free-form metadata
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl IndexRecord {
    /// Record whose id is derived from `seed`
    #[must_use]
    pub fn new(seed: &str, text: impl Into<String>, meta: serde_json::Value) -> Self {
        Self {
            id: record_id(seed),
            text: text.into(),
            meta,
        }
    }
}

/// Short content hash used as a record id
#[must_use]
pub fn record_id(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// A record with its match score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Record id
    pub id: String,
    /// Record text
    pub text: String,
    /// Record metadata
    pub meta: serde_json::Value,
    /// Number of query tokens found in the record
    pub score: usize,
}

/// Named query fields, e.g. `broken = btnCheckout`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalQuery {
    fields: BTreeMap<String, String>,
}

impl RetrievalQuery {
    /// Empty query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Distinct lowercase tokens across all field values
    #[must_use]
    pub fn tokens(&self) -> BTreeSet<String> {
        self.fields.values().flat_map(|v| tokenize(v)).collect()
    }

    /// Query fields as JSON, for prompts and artifacts
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.fields).unwrap_or_default()
    }
}

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").expect("static pattern"))
}

fn tokenize(text: &str) -> BTreeSet<String> {
    token_pattern()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Source of context records for a prompt
pub trait Retriever {
    /// Up to `k` best records, highest score first
    fn topk(&self, query: &RetrievalQuery, k: usize) -> HealResult<Vec<ScoredRecord>>;
}

/// Retriever that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRetriever;

impl Retriever for EmptyRetriever {
    fn topk(&self, _query: &RetrievalQuery, _k: usize) -> HealResult<Vec<ScoredRecord>> {
        Ok(Vec::new())
    }
}

/// Token-overlap retriever over `<base_path>/index.jsonl`
#[derive(Debug, Clone)]
pub struct LocalRetriever {
    base_path: PathBuf,
}

impl LocalRetriever {
    /// Retriever rooted at `base_path`
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Index root
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Index file path
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    /// Every record in the index; a missing index is empty and malformed
    /// lines are skipped
    pub fn records(&self) -> HealResult<Vec<IndexRecord>> {
        let path = self.index_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IndexRecord>(line) {
                Ok(record) => out.push(record),
                Err(e) => warn!(line = n + 1, error = %e, "Skipping malformed index record"),
            }
        }
        Ok(out)
    }

    /// Append records whose ids are not yet indexed; returns how many were added
    pub fn add(&self, records: &[IndexRecord]) -> HealResult<usize> {
        let known: BTreeSet<String> = self.records()?.into_iter().map(|r| r.id).collect();
        let fresh: Vec<&IndexRecord> = records.iter().filter(|r| !known.contains(&r.id)).collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        std::fs::create_dir_all(&self.base_path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path())?;
        for record in &fresh {
            let mut line = serde_json::to_string(record)?;
            line.push('\n');
            file.write_all(line.as_bytes())?;
        }
        debug!(added = fresh.len(), index = %self.index_path().display(), "Indexed records");
        Ok(fresh.len())
    }
}

impl Retriever for LocalRetriever {
    fn topk(&self, query: &RetrievalQuery, k: usize) -> HealResult<Vec<ScoredRecord>> {
        let wanted = query.tokens();
        if wanted.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut scored: Vec<ScoredRecord> = self
            .records()?
            .into_iter()
            .filter_map(|r| {
                let have = tokenize(&r.text);
                let score = wanted.intersection(&have).count();
                (score > 0).then(|| ScoredRecord {
                    id: r.id,
                    text: r.text,
                    meta: r.meta,
                    score,
                })
            })
            .collect();
        // Stable: ties keep index order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Local index fed from the commit history of an application repository
#[derive(Debug, Clone)]
pub struct GitHistoryRetriever {
    store: LocalRetriever,
}

impl GitHistoryRetriever {
    /// History index rooted at `base_path`
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            store: LocalRetriever::new(base_path),
        }
    }

    /// Index the last `limit` commits of `repo` (message plus zero-context
    /// diff); returns the number of new records
    pub fn ingest_commits(&self, repo: &Path, limit: usize) -> HealResult<usize> {
        let list = git(repo, &["rev-list", "--max-count", &limit.to_string(), "HEAD"])?;
        let mut records = Vec::new();
        for sha in list.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let message = git(repo, &["log", "-1", "--pretty=%B", sha])?.trim().to_string();
            let diff = git(repo, &["show", "--pretty=", "--unified=0", sha])?;
            let text = format!("COMMIT: {sha}\nMESSAGE:\n{message}\n\nDIFF (u=0):\n{diff}");
            let seed: String = format!("{sha}{}", message.chars().take(200).collect::<String>());
            records.push(IndexRecord::new(
                &seed,
                text,
                serde_json::json!({"commit": sha, "message": message}),
            ));
        }
        self.store.add(&records)
    }
}

impl Retriever for GitHistoryRetriever {
    fn topk(&self, query: &RetrievalQuery, k: usize) -> HealResult<Vec<ScoredRecord>> {
        self.store.topk(query, k)
    }
}

fn git(repo: &Path, args: &[&str]) -> HealResult<String> {
    let output = Command::new("git").args(args).current_dir(repo).output()?;
    if !output.status.success() {
        return Err(HealError::invalid_input(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One file in the index directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the base path
    pub path: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Last modification time, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// Audit listing of the index directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Index root
    pub base_path: PathBuf,
    /// Whether the root exists
    pub exists: bool,
    /// Number of files
    pub count: usize,
    /// Sum of file sizes
    pub total_size_bytes: u64,
    /// Files in path order
    pub files: Vec<ManifestFile>,
    /// Note for a missing root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IndexManifest {
    /// List the files under `base_path`
    #[must_use]
    pub fn scan(base_path: &Path) -> Self {
        if !base_path.is_dir() {
            return Self {
                base_path: base_path.to_path_buf(),
                exists: false,
                count: 0,
                total_size_bytes: 0,
                files: Vec::new(),
                message: Some("index path not found; retrieval is optional".to_string()),
            };
        }
        let files: Vec<ManifestFile> = walk_files(base_path)
            .into_iter()
            .filter_map(|p| {
                let meta = std::fs::metadata(&p).ok()?;
                let rel = p.strip_prefix(base_path).unwrap_or(&p);
                Some(ManifestFile {
                    path: rel.to_string_lossy().replace('\\', "/"),
                    size_bytes: meta.len(),
                    mtime: meta.modified().ok().map(DateTime::<Utc>::from),
                })
            })
            .collect();
        Self {
            base_path: base_path.to_path_buf(),
            exists: true,
            count: files.len(),
            total_size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            files,
            message: None,
        }
    }
}
