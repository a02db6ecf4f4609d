//! Working directory status relative to the tracker and staging area.

use crate::branch::MergeState;
use crate::commit::{BlobRef, Tracker};
use crate::hash::Hash;
use crate::staging::StagingArea;
use std::collections::{BTreeMap, BTreeSet};

/// How an unstaged working file differs from what would be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unstaged {
    Modified,
    Deleted,
}

impl Unstaged {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unstaged::Modified => "modified",
            Unstaged::Deleted => "deleted",
        }
    }
}

/// Everything `twig status` reports. Lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub current_branch: String,
    pub branches: Vec<String>,
    /// Staged additions and modifications.
    pub staged: Vec<String>,
    /// Staged deletions.
    pub removed: Vec<String>,
    pub unstaged: Vec<(String, Unstaged)>,
    pub untracked: Vec<String>,
    pub merge: Option<MergeState>,
}

/// Working files neither present in the tracker nor staged.
pub fn untracked_files(
    tracker: &Tracker,
    staging: &StagingArea,
    working: &BTreeMap<String, Hash>,
) -> Vec<String> {
    working
        .keys()
        .filter(|path| {
            staging.get(path).is_none() && !tracker.get(*path).is_some_and(BlobRef::is_present)
        })
        .cloned()
        .collect()
}

/// Tracked or staged content whose working file has since diverged.
///
/// A staged deletion hides the tracked entry; a staged addition replaces it.
pub fn unstaged_changes(
    tracker: &Tracker,
    staging: &StagingArea,
    working: &BTreeMap<String, Hash>,
) -> Vec<(String, Unstaged)> {
    let mut expected: BTreeMap<&str, Hash> = tracker
        .iter()
        .filter_map(|(path, blob)| blob.hash().map(|h| (path.as_str(), h)))
        .collect();
    for (path, record) in staging.changes() {
        match record.blob {
            BlobRef::Present(hash) => {
                expected.insert(path, hash);
            }
            BlobRef::Deleted => {
                expected.remove(path.as_str());
            }
        }
    }

    expected
        .into_iter()
        .filter_map(|(path, hash)| match working.get(path) {
            None => Some((path.to_string(), Unstaged::Deleted)),
            Some(live) if *live != hash => Some((path.to_string(), Unstaged::Modified)),
            Some(_) => None,
        })
        .collect()
}

/// Assemble a status report.
pub fn compute(
    current_branch: &str,
    branches: Vec<String>,
    merge: Option<MergeState>,
    tracker: &Tracker,
    staging: &StagingArea,
    working: &BTreeMap<String, Hash>,
) -> Status {
    let diff = staging.diff_against(tracker, working);
    let staged: BTreeSet<String> = diff.added.into_iter().chain(diff.modified).collect();

    Status {
        current_branch: current_branch.to_string(),
        branches,
        staged: staged.into_iter().collect(),
        removed: diff.deleted,
        unstaged: unstaged_changes(tracker, staging, working),
        untracked: untracked_files(tracker, staging, working),
        merge,
    }
}
