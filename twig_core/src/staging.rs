//! The staging area: pending changes for the next commit.

use crate::commit::{BlobRef, FileRecord, Tracker};
use crate::error::Result;
use crate::hash::Hash;
use crate::store::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Staged changes keyed by path. Persisted as a single JSON record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingArea {
    changes: BTreeMap<String, FileRecord>,
}

/// The staging area compared with the tracker and the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingDiff {
    /// Staged paths the tracker does not have.
    pub added: Vec<String>,
    /// Staged paths replacing tracked content.
    pub modified: Vec<String>,
    /// Staged deletions.
    pub deleted: Vec<String>,
    /// Staged paths whose working file has since changed or vanished.
    pub stale: Vec<String>,
}

impl StagingArea {
    /// Load the staging record, or an empty area if none was saved.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }

    /// Stage a change. The last write for a path wins.
    pub fn stage(&mut self, path: &str, record: FileRecord) {
        self.changes.insert(path.to_string(), record);
    }

    /// Drop a staged change, if any.
    pub fn unstage(&mut self, path: &str) -> Option<FileRecord> {
        self.changes.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.changes.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn changes(&self) -> &BTreeMap<String, FileRecord> {
        &self.changes
    }

    pub fn diff_against(&self, tracker: &Tracker, working: &BTreeMap<String, Hash>) -> StagingDiff {
        let mut diff = StagingDiff::default();

        for (path, record) in &self.changes {
            match record.blob {
                BlobRef::Deleted => diff.deleted.push(path.clone()),
                BlobRef::Present(staged) => {
                    let tracked = tracker.get(path).is_some_and(BlobRef::is_present);
                    if tracked {
                        diff.modified.push(path.clone());
                    } else {
                        diff.added.push(path.clone());
                    }
                    if working.get(path) != Some(&staged) {
                        diff.stale.push(path.clone());
                    }
                }
            }
        }

        diff
    }
}
