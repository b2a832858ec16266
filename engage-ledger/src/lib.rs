use chrono::{DateTime, Utc};
use engage_core::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Writes `tmp` with `write`, then renames it over `target`. The temp file
/// never outlives a failure of either step.
fn replace_via(
    tmp: &Path,
    target: &Path,
    write: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<(), LedgerError> {
    if let Err(source) = write(tmp) {
        let _ = fs::remove_file(tmp);
        return Err(LedgerError::Write {
            path: tmp.display().to_string(),
            source,
        });
    }

    if let Err(source) = fs::rename(tmp, target) {
        let _ = fs::remove_file(tmp);
        return Err(LedgerError::Replace {
            path: target.display().to_string(),
            source,
        });
    }
    Ok(())
}

/// Identifier namespace. Equal strings in different namespaces are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Video,
    Comment,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    processed_videos: BTreeSet<String>,
    #[serde(default)]
    processed_comments: BTreeSet<String>,
    #[serde(default)]
    last_run: Option<DateTime<Utc>>,
}

/// Durable record of which videos and comments have already been handled.
///
/// Loaded once at construction and mutated in memory. Every `persist` writes
/// a temp file next to the target and renames it over, so an interrupted
/// write never damages the previous state.
#[derive(Debug)]
pub struct ActionLedger {
    path: PathBuf,
    videos: BTreeSet<String>,
    comments: BTreeSet<String>,
    last_run: Option<DateTime<Utc>>,
}

impl ActionLedger {
    /// `~/.engagerunner/state.json`, or `./.engagerunner/state.json` when no
    /// home directory is known.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".engagerunner")
            .join("state.json")
    }

    /// Never fails: a missing file starts empty, and an unreadable or
    /// malformed file is logged and also starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load(&path);

        info!(
            "Ledger at {}: {} videos, {} comments processed",
            path.display(),
            state.processed_videos.len(),
            state.processed_comments.len()
        );

        Self {
            path,
            videos: state.processed_videos,
            comments: state.processed_comments,
            last_run: state.last_run,
        }
    }

    fn load(path: &Path) -> LedgerFile {
        if !path.exists() {
            debug!("No ledger file at {}, starting empty", path.display());
            return LedgerFile::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Could not read ledger {}: {}. Starting empty; earlier actions may repeat",
                    path.display(),
                    e
                );
                return LedgerFile::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Ledger {} is malformed: {}. Starting empty; earlier actions may repeat",
                    path.display(),
                    e
                );
                LedgerFile::default()
            }
        }
    }

    fn set(&self, kind: RecordKind) -> &BTreeSet<String> {
        match kind {
            RecordKind::Video => &self.videos,
            RecordKind::Comment => &self.comments,
        }
    }

    pub fn is_processed(&self, kind: RecordKind, id: &str) -> bool {
        self.set(kind).contains(id)
    }

    /// Returns `true` when the id was not marked before.
    pub fn mark_processed(&mut self, kind: RecordKind, id: &str) -> bool {
        let set = match kind {
            RecordKind::Video => &mut self.videos,
            RecordKind::Comment => &mut self.comments,
        };
        set.insert(id.to_string())
    }

    /// Flushes the in-memory sets. On failure the in-memory state is kept as
    /// is and the previous file stays intact.
    pub fn persist(&mut self) -> Result<(), LedgerError> {
        let now = Utc::now();
        let state = LedgerFile {
            processed_videos: self.videos.clone(),
            processed_comments: self.comments.clone(),
            last_run: Some(now),
        };
        let content = serde_json::to_string_pretty(&state)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| LedgerError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let tmp_file = dir.join(format!(".state-{}.tmp", Uuid::new_v4()));
        replace_via(&tmp_file, &self.path, |tmp| fs::write(tmp, &content))?;

        self.last_run = Some(now);
        debug!(
            "Persisted ledger to {} ({} videos, {} comments)",
            self.path.display(),
            self.videos.len(),
            self.comments.len()
        );
        Ok(())
    }

    pub fn processed_count(&self, kind: RecordKind) -> usize {
        self.set(kind).len()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
