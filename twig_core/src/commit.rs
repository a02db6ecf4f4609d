//! Commit records and the file tables they snapshot.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::staging::StagingArea;
use crate::store::Store;
use crate::worktree::Worktree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-path records of a commit, keyed by work-dir-relative path.
pub type FileTable = BTreeMap<String, FileRecord>;

/// The checked-out commit's content, path to blob.
pub type Tracker = BTreeMap<String, BlobRef>;

/// What a table says a path's content is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobRef {
    Present(Hash),
    Deleted,
}

impl BlobRef {
    /// The blob hash, if the content is present.
    pub fn hash(&self) -> Option<Hash> {
        match self {
            BlobRef::Present(hash) => Some(*hash),
            BlobRef::Deleted => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, BlobRef::Present(_))
    }
}

/// How a path changed relative to the parent commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Same,
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Same => "same",
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// One path's entry in a commit or the staging area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub blob: BlobRef,
    pub change: ChangeKind,
}

impl FileRecord {
    pub fn added(hash: Hash) -> Self {
        Self {
            blob: BlobRef::Present(hash),
            change: ChangeKind::Added,
        }
    }

    pub fn modified(hash: Hash) -> Self {
        Self {
            blob: BlobRef::Present(hash),
            change: ChangeKind::Modified,
        }
    }

    pub fn deleted() -> Self {
        Self {
            blob: BlobRef::Deleted,
            change: ChangeKind::Deleted,
        }
    }

    /// The same content, marked unchanged.
    pub fn unchanged(&self) -> Self {
        Self {
            blob: self.blob,
            change: ChangeKind::Same,
        }
    }
}

/// The hashed portion of a commit. Field order is the encoding order.
#[derive(Serialize)]
struct CanonicalCommit<'a> {
    files: &'a FileTable,
    author: &'a str,
    timestamp: &'a DateTime<Utc>,
    message: &'a str,
    parent: Option<&'a Hash>,
}

#[derive(Deserialize)]
struct StoredCommit {
    files: FileTable,
    author: String,
    timestamp: DateTime<Utc>,
    message: String,
    parent: Option<Hash>,
}

/// An immutable snapshot of the file table plus its lineage pointer.
///
/// The id is the BLAKE3 hash of the canonical JSON encoding of every other
/// field, so two commits built from identical inputs share an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    id: Hash,
    files: FileTable,
    author: String,
    timestamp: DateTime<Utc>,
    message: String,
    parent: Option<Hash>,
}

impl Commit {
    /// Build a commit from the parent's table with the staged changes on top.
    ///
    /// Parent entries carry over as `Same`. Every staged blob must already be
    /// in the store, since blobs are written when a file is staged.
    pub fn create(
        store: &Store,
        staging: &StagingArea,
        prior: &FileTable,
        author: &str,
        message: &str,
        parent: Option<Hash>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let mut files: FileTable = prior
            .iter()
            .map(|(path, record)| (path.clone(), record.unchanged()))
            .collect();

        for (path, record) in staging.changes() {
            if let Some(hash) = record.blob.hash()
                && !store.has_blob(&hash)
            {
                return Err(Error::object_not_found(hash.to_hex()));
            }
            files.insert(path.clone(), *record);
        }

        Self::from_parts(files, author.to_string(), timestamp, message.to_string(), parent)
    }

    fn from_parts(
        files: FileTable,
        author: String,
        timestamp: DateTime<Utc>,
        message: String,
        parent: Option<Hash>,
    ) -> Result<Self> {
        let mut commit = Self {
            id: Hash::from_bytes([0u8; 32]),
            files,
            author,
            timestamp,
            message,
            parent,
        };
        commit.id = Hash::hash_bytes(&commit.encode()?);
        Ok(commit)
    }

    /// Canonical encoding that the id is computed over.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let canonical = CanonicalCommit {
            files: &self.files,
            author: &self.author,
            timestamp: &self.timestamp,
            message: &self.message,
            parent: self.parent.as_ref(),
        };
        Ok(serde_json::to_vec(&canonical)?)
    }

    fn decode(id: Hash, payload: &[u8]) -> Result<Self> {
        let stored: StoredCommit = serde_json::from_slice(payload)?;
        Ok(Self {
            id,
            files: stored.files,
            author: stored.author,
            timestamp: stored.timestamp,
            message: stored.message,
            parent: stored.parent,
        })
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn parent(&self) -> Option<Hash> {
        self.parent
    }

    /// Whether `path` is present (and not deleted) in this commit.
    pub fn contains(&self, path: &str) -> bool {
        self.blob(path).is_some()
    }

    /// The blob a present path points at.
    pub fn blob(&self, path: &str) -> Option<Hash> {
        self.files.get(path).and_then(|record| record.blob.hash())
    }

    /// The tracker a checkout of this commit produces.
    pub fn tracker(&self) -> Tracker {
        self.files
            .iter()
            .map(|(path, record)| (path.clone(), record.blob))
            .collect()
    }

    /// Materialize this commit into the working tree.
    ///
    /// Writes every present record and deletes files that `current` has present
    /// but this commit does not.
    pub fn checkout_all(
        &self,
        store: &Store,
        worktree: &Worktree,
        current: &Tracker,
    ) -> Result<()> {
        for (path, blob) in current {
            if blob.is_present() && !self.contains(path) {
                worktree.delete(path)?;
            }
        }

        for (path, record) in &self.files {
            if let BlobRef::Present(hash) = record.blob {
                worktree.write(path, &store.get_blob(&hash)?)?;
            }
        }

        debug!(commit = %self.id.short(), "checked out commit");
        Ok(())
    }

    /// Restore one path from this commit into the working tree.
    pub fn checkout_one(&self, store: &Store, worktree: &Worktree, path: &str) -> Result<()> {
        let hash = self
            .blob(path)
            .ok_or_else(|| Error::file_not_in_commit(path))?;
        worktree.write(path, &store.get_blob(&hash)?)
    }
}

impl Store {
    /// Persist a commit. Rewriting an existing commit is a no-op.
    pub fn put_commit(&self, commit: &Commit) -> Result<()> {
        self.put_commit_payload(&commit.id, &commit.encode()?)?;
        debug!(commit = %commit.id.short(), "stored commit");
        Ok(())
    }

    /// Load a commit by its full id.
    pub fn get_commit(&self, id: &Hash) -> Result<Commit> {
        let payload = self.get_commit_payload(id).map_err(|e| match e {
            Error::ObjectNotFound { .. } => Error::commit_not_found(id.to_hex()),
            other => other,
        })?;
        Commit::decode(*id, &payload)
    }

    /// Resolve a full or abbreviated commit id.
    pub fn resolve_commit(&self, prefix: &str) -> Result<Hash> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::commit_not_found(prefix));
        }

        let matches: Vec<Hash> = self
            .commit_ids()?
            .into_iter()
            .filter(|id| id.matches_prefix(prefix))
            .collect();

        match matches.as_slice() {
            [] => Err(Error::commit_not_found(prefix)),
            [id] => Ok(*id),
            _ => Err(Error::AmbiguousCommit {
                prefix: prefix.to_string(),
                matches: matches.len(),
            }),
        }
    }

    /// Every commit ever made, newest first.
    pub fn all_commits(&self) -> Result<Vec<Commit>> {
        let mut commits = self
            .commit_ids()?
            .iter()
            .map(|id| self.get_commit(id))
            .collect::<Result<Vec<_>>>()?;
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.id.cmp(&b.id)));
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store, Worktree) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path().join(".twig"), Algorithm::Blake3).unwrap();
        let worktree = Worktree::new(temp_dir.path());
        (temp_dir, store, worktree)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// A parentless commit of `staging` by "ann".
    fn root(store: &Store, staging: &StagingArea, message: &str, secs: i64) -> Result<Commit> {
        Commit::create(store, staging, &FileTable::new(), "ann", message, None, at(secs))
    }

    /// A commit of `staging` on top of `parent`.
    fn child(
        store: &Store,
        staging: &StagingArea,
        parent: &Commit,
        message: &str,
        secs: i64,
    ) -> Commit {
        let prior = parent.files();
        Commit::create(store, staging, prior, "ann", message, Some(parent.id()), at(secs)).unwrap()
    }

    fn stage(store: &Store, staging: &mut StagingArea, path: &str, data: &[u8]) -> Hash {
        let hash = store.put_blob(data).unwrap();
        staging.stage(path, FileRecord::added(hash));
        hash
    }

    #[test]
    fn test_create_overlays_staging_on_prior() {
        let (_dir, store, _tree) = setup();
        let mut staging = StagingArea::default();
        let a = stage(&store, &mut staging, "a.txt", b"a");
        let first = root(&store, &staging, "first", 10).unwrap();

        let mut staging = StagingArea::default();
        let b = stage(&store, &mut staging, "b.txt", b"b");
        let second = child(&store, &staging, &first, "second", 20);

        assert_eq!(second.parent(), Some(first.id()));
        assert_eq!(second.files()["a.txt"].change, ChangeKind::Same);
        assert_eq!(second.files()["a.txt"].blob, BlobRef::Present(a));
        assert_eq!(second.files()["b.txt"], FileRecord::added(b));
    }

    #[test]
    fn test_create_requires_staged_blobs() {
        let (_dir, store, _tree) = setup();
        let mut staging = StagingArea::default();
        staging.stage("ghost.txt", FileRecord::added(Hash::hash_bytes(b"never stored")));

        let err = root(&store, &staging, "m", 0).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
    }

    #[test]
    fn test_identical_inputs_share_an_id() {
        let (_dir, store, _tree) = setup();
        let mut staging = StagingArea::default();
        stage(&store, &mut staging, "a.txt", b"a");

        let one = root(&store, &staging, "m", 5).unwrap();
        let two = root(&store, &staging, "m", 5).unwrap();
        let later = root(&store, &staging, "m", 6).unwrap();

        assert_eq!(one.id(), two.id());
        assert_ne!(one.id(), later.id());
    }

    #[test]
    fn test_put_get_commit() {
        let (_dir, store, _tree) = setup();
        let mut staging = StagingArea::default();
        stage(&store, &mut staging, "a.txt", b"a");
        staging.stage("gone.txt", FileRecord::deleted());

        let commit = root(&store, &staging, "msg", 7).unwrap();
        store.put_commit(&commit).unwrap();

        let loaded = store.get_commit(&commit.id()).unwrap();
        assert_eq!(loaded, commit);
        assert!(loaded.contains("a.txt"));
        assert!(!loaded.contains("gone.txt"));
        assert!(!loaded.contains("other.txt"));
    }

    #[test]
    fn test_get_commit_not_found() {
        let (_dir, store, _tree) = setup();
        let err = store.get_commit(&Hash::hash_bytes(b"x")).unwrap_err();
        assert!(matches!(err, Error::CommitNotFound { .. }));
    }

    #[test]
    fn test_resolve_commit_prefixes() {
        let (_dir, store, _tree) = setup();
        let staging = StagingArea::default();
        let commit = root(&store, &staging, "m", 1).unwrap();
        store.put_commit(&commit).unwrap();

        let hex = commit.id().to_hex();
        assert_eq!(store.resolve_commit(&hex).unwrap(), commit.id());
        assert_eq!(store.resolve_commit(&hex[..6]).unwrap(), commit.id());
        assert!(matches!(
            store.resolve_commit("zz").unwrap_err(),
            Error::CommitNotFound { .. }
        ));
        assert!(store.resolve_commit("").is_err());
    }

    #[test]
    fn test_resolve_commit_ambiguous() {
        let (_dir, store, _tree) = setup();
        let staging = StagingArea::default();
        // Enough commits that two share a leading hex digit
        for secs in 0..17 {
            let commit = root(&store, &staging, "m", secs).unwrap();
            store.put_commit(&commit).unwrap();
        }

        let ids = store.commit_ids().unwrap();
        let digit = (0..16)
            .map(|d| format!("{:x}", d))
            .find(|d| ids.iter().filter(|id| id.matches_prefix(d)).count() > 1)
            .unwrap();
        assert!(matches!(
            store.resolve_commit(&digit).unwrap_err(),
            Error::AmbiguousCommit { .. }
        ));
    }

    #[test]
    fn test_checkout_all_writes_and_removes() {
        let (_dir, store, tree) = setup();
        let mut staging = StagingArea::default();
        stage(&store, &mut staging, "keep.txt", b"keep");
        stage(&store, &mut staging, "old.txt", b"old");
        let first = root(&store, &staging, "1", 1).unwrap();
        first.checkout_all(&store, &tree, &Tracker::new()).unwrap();
        assert_eq!(tree.read("old.txt").unwrap(), b"old");

        let mut staging = StagingArea::default();
        staging.stage("old.txt", FileRecord::deleted());
        stage(&store, &mut staging, "dir/new.txt", b"new");
        let second = child(&store, &staging, &first, "2", 2);

        tree.write("untracked.txt", b"mine").unwrap();
        second.checkout_all(&store, &tree, &first.tracker()).unwrap();

        assert!(!tree.exists("old.txt"));
        assert_eq!(tree.read("keep.txt").unwrap(), b"keep");
        assert_eq!(tree.read("dir/new.txt").unwrap(), b"new");
        assert_eq!(tree.read("untracked.txt").unwrap(), b"mine");
    }

    #[test]
    fn test_checkout_one() {
        let (_dir, store, tree) = setup();
        let mut staging = StagingArea::default();
        stage(&store, &mut staging, "a.txt", b"original");
        let commit = root(&store, &staging, "1", 1).unwrap();

        tree.write("a.txt", b"edited").unwrap();
        commit.checkout_one(&store, &tree, "a.txt").unwrap();
        assert_eq!(tree.read("a.txt").unwrap(), b"original");

        let err = commit.checkout_one(&store, &tree, "b.txt").unwrap_err();
        assert!(matches!(err, Error::FileNotInCommit { .. }));
    }

    #[test]
    fn test_blob_ref_serializes_tagged() {
        let json = serde_json::to_string(&BlobRef::Deleted).unwrap();
        assert_eq!(json, "\"deleted\"");
        let hash = Hash::hash_bytes(b"x");
        let json = serde_json::to_string(&BlobRef::Present(hash)).unwrap();
        assert_eq!(json, format!("{{\"present\":\"{}\"}}", hash.to_hex()));
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            max_shrink_iters: 1000,
            ..ProptestConfig::default()
        })]

        /// Distinct file tables produce distinct commit ids
        #[test]
        fn prop_distinct_tables_distinct_ids(
            a in prop::collection::btree_map("[a-z]{1,8}", any::<[u8; 32]>(), 0..6),
            b in prop::collection::btree_map("[a-z]{1,8}", any::<[u8; 32]>(), 0..6),
        ) {
            prop_assume!(a != b);
            let table = |m: &BTreeMap<String, [u8; 32]>| -> FileTable {
                m.iter()
                    .map(|(p, h)| (p.clone(), FileRecord::added(Hash::from_bytes(*h))))
                    .collect()
            };
            let one = Commit::from_parts(table(&a), "ann".into(), at(0), "m".into(), None)?;
            let two = Commit::from_parts(table(&b), "ann".into(), at(0), "m".into(), None)?;
            prop_assert_ne!(one.id(), two.id());
        }
    }
}
