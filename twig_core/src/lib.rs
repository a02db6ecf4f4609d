//! # Twig Core
//!
//! A small local version-control system built on a BLAKE3 content-addressed store.
//!
//! File contents are stored once as immutable blobs keyed by their hash. Commits
//! snapshot the tracked-file table, branches are named linear histories that
//! remember a merge base per peer branch, and merges compare the two heads
//! against that recorded base.
//!
//! ## Features
//!
//! - Content-addressed blob storage with zstd compression for larger files
//! - Content-derived commit ids, abbreviable to any unique prefix
//! - Staging area reconciled against the working directory
//! - Three-way merge with conflict markers and fast-forwarding
//! - Reflog of every branch-pointer update
//!
//! ## Example
//!
//! ```no_run
//! use twig_core::{MergeOutcome, Repository};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (repo, mut session) = Repository::init("./project")?;
//!
//! std::fs::write("./project/a.txt", "hello")?;
//! repo.add(&session, "a.txt")?;
//! repo.commit(&mut session, "first")?;
//!
//! repo.branch(&session, "feature")?;
//! if let MergeOutcome::Conflicted { conflicts } = repo.merge(&mut session, "feature")? {
//!     println!("{} conflicts", conflicts.len());
//! }
//!
//! // The session is persisted by the caller once the verbs succeed
//! repo.save_session(&session)?;
//! # Ok(())
//! # }
//! ```

mod branch;
mod commit;
mod error;
mod hash;
mod merge;
mod object;
mod reflog;
mod repository;
mod staging;
mod status;
mod store;
mod workspace;
mod worktree;

pub use branch::{Branch, BranchStore, MergeState};
pub use commit::{BlobRef, ChangeKind, Commit, FileRecord, FileTable, Tracker};
pub use error::{Error, Result};
pub use hash::{Algorithm, Hash};
pub use merge::{Disposition, MergeOutcome, classify, conflict_marker};
pub use object::{ObjectHeader, ObjectType};
pub use reflog::ReflogEntry;
pub use repository::{DEFAULT_BRANCH, INITIAL_MESSAGE, Repository};
pub use staging::{StagingArea, StagingDiff};
pub use status::{Status, Unstaged};
pub use store::Store;
pub use workspace::{Identity, Session};
pub use worktree::{REPO_DIR, Worktree};
