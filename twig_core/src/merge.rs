//! Three-way merge against a recorded merge base.
//!
//! Every path in the incoming head's table is classified against the base and
//! the current head. Paths only the current side knows about are left alone.

use crate::commit::{ChangeKind, Commit, FileRecord};
use crate::error::Result;
use crate::hash::Hash;
use crate::staging::StagingArea;
use crate::store::Store;
use crate::worktree::Worktree;
use tracing::{debug, warn};

/// What a merge does to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Leave the working file and staging untouched.
    Keep,
    /// Take the incoming content and stage it.
    Take(FileRecord),
    /// Delete the working file and stage the deletion.
    Delete,
    /// Write a conflict marker; either side may be empty.
    Conflict {
        mine: Option<Hash>,
        theirs: Option<Hash>,
    },
}

/// Result of `Repository::merge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The other branch is already part of this one; nothing changed.
    Ancestor,
    /// This branch was behind and now points at the other head.
    FastForward { head: Hash },
    /// A merge commit was created.
    Merged { commit: Hash },
    /// Conflict markers were written and the merge is left open.
    Conflicted { conflicts: Vec<String> },
}

/// Decide the fate of `path`, whose incoming record is `theirs`.
///
/// Deletion rows are checked before content rows, so a delete/modify clash is
/// always a conflict rather than a silent delete.
pub fn classify(path: &str, base: &Commit, mine: &Commit, theirs: &FileRecord) -> Disposition {
    let mine = mine.blob(path);
    let theirs = theirs.blob.hash();

    match base.blob(path) {
        Some(base) => match (theirs, mine) {
            (None, Some(m)) if m == base => Disposition::Delete,
            (None, None) => Disposition::Keep,
            (None, Some(m)) => Disposition::Conflict {
                mine: Some(m),
                theirs: None,
            },
            (Some(t), _) if t == base => Disposition::Keep,
            (Some(t), None) => Disposition::Conflict {
                mine: None,
                theirs: Some(t),
            },
            (Some(t), Some(m)) if m == base => Disposition::Take(FileRecord::modified(t)),
            (Some(t), Some(m)) if m == t => Disposition::Keep,
            (Some(t), Some(m)) => Disposition::Conflict {
                mine: Some(m),
                theirs: Some(t),
            },
        },
        None => match (theirs, mine) {
            (None, _) => Disposition::Keep,
            (Some(t), Some(m)) if m == t => Disposition::Keep,
            (Some(t), Some(m)) => Disposition::Conflict {
                mine: Some(m),
                theirs: Some(t),
            },
            (Some(t), None) => Disposition::Take(FileRecord::added(t)),
        },
    }
}

/// Classify every path of `theirs`, in path order.
pub fn plan(base: &Commit, mine: &Commit, theirs: &Commit) -> Vec<(String, Disposition)> {
    theirs
        .files()
        .iter()
        .map(|(path, record)| (path.clone(), classify(path, base, mine, record)))
        .collect()
}

/// The conflict file body. An absent side contributes nothing.
pub fn conflict_marker(mine: &[u8], theirs: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(mine.len() + theirs.len() + 32);
    out.extend_from_slice(b"<<<<<<< HEAD\n");
    out.extend_from_slice(mine);
    out.extend_from_slice(b"=======\n");
    out.extend_from_slice(theirs);
    out.extend_from_slice(b">>>>>>>\n");
    out
}

/// Paths the plan writes that the current head does not have.
pub(crate) fn introduced(plan: &[(String, Disposition)]) -> Vec<String> {
    plan.iter()
        .filter(|(_, disposition)| {
            matches!(
                disposition,
                Disposition::Take(FileRecord {
                    change: ChangeKind::Added,
                    ..
                }) | Disposition::Conflict { mine: None, .. }
            )
        })
        .map(|(path, _)| path.clone())
        .collect()
}

/// Apply a merge plan to the working tree and staging area.
///
/// Returns the conflicted paths. Conflict files are written but never staged.
pub(crate) fn apply(
    store: &Store,
    worktree: &Worktree,
    staging: &mut StagingArea,
    plan: &[(String, Disposition)],
) -> Result<Vec<String>> {
    let mut conflicts = Vec::new();

    for (path, disposition) in plan {
        debug!(path = %path, ?disposition, "merge decision");
        match disposition {
            Disposition::Keep => {}
            Disposition::Take(record) => {
                if let Some(hash) = record.blob.hash() {
                    worktree.write(path, &store.get_blob(&hash)?)?;
                }
                staging.stage(path, *record);
            }
            Disposition::Delete => {
                worktree.delete(path)?;
                staging.stage(path, FileRecord::deleted());
            }
            Disposition::Conflict { mine, theirs } => {
                let mine = read_side(store, *mine)?;
                let theirs = read_side(store, *theirs)?;
                worktree.write(path, &conflict_marker(&mine, &theirs))?;
                warn!(path = %path, "merge conflict");
                conflicts.push(path.clone());
            }
        }
    }

    Ok(conflicts)
}

fn read_side(store: &Store, side: Option<Hash>) -> Result<Vec<u8>> {
    match side {
        Some(hash) => store.get_blob(&hash),
        None => Ok(Vec::new()),
    }
}
