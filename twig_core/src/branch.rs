//! Branches: named linear histories with pairwise merge bases.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::store::{Store, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// An unfinished merge, recorded on the branch being merged into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    /// The branch being merged in.
    pub branch: String,
    /// Its head when the merge started.
    pub their_head: Hash,
    /// Paths left with conflict markers.
    pub conflicts: Vec<String>,
    /// Paths the merge created that the head did not have.
    #[serde(default)]
    pub introduced: Vec<String>,
}

/// A named, mutable pointer to a linear commit history.
///
/// `head` is always the last element of `history`. `merge_bases` holds, per
/// peer branch, the newest commit known to be common to both; only pairwise
/// ancestors are tracked, not a full commit graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    name: String,
    history: Vec<Hash>,
    head: Hash,
    merge_bases: BTreeMap<String, Hash>,
    merge: Option<MergeState>,
}

impl Branch {
    /// A branch whose history is the single commit `root`.
    pub fn new(name: &str, root: Hash) -> Self {
        Self {
            name: name.to_string(),
            history: vec![root],
            head: root,
            merge_bases: BTreeMap::new(),
            merge: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn head(&self) -> Hash {
        self.head
    }

    /// Commit ids, oldest first.
    pub fn history(&self) -> &[Hash] {
        &self.history
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.history.contains(id)
    }

    pub fn merge_base(&self, other: &str) -> Option<Hash> {
        self.merge_bases.get(other).copied()
    }

    pub fn merge_bases(&self) -> &BTreeMap<String, Hash> {
        &self.merge_bases
    }

    pub fn merge_state(&self) -> Option<&MergeState> {
        self.merge.as_ref()
    }

    pub fn is_merging(&self) -> bool {
        self.merge.is_some()
    }

    pub fn begin_merge(&mut self, state: MergeState) {
        self.merge = Some(state);
    }

    pub fn clear_merge(&mut self) -> Option<MergeState> {
        self.merge.take()
    }

    fn set_merge_base(&mut self, other: &str, id: Hash) {
        self.merge_bases.insert(other.to_string(), id);
    }

    /// Drop every commit after `id`, making it the head.
    ///
    /// Returns false, leaving the branch untouched, if `id` is not in the history.
    pub fn truncate_to(&mut self, id: &Hash) -> bool {
        match self.history.iter().position(|h| h == id) {
            Some(pos) => {
                self.history.truncate(pos + 1);
                self.head = *id;
                true
            }
            None => false,
        }
    }

    /// The newest commit of this branch that `other` also has.
    pub fn newest_shared(&self, other: &Branch) -> Option<Hash> {
        self.history
            .iter()
            .rev()
            .find(|id| other.contains(id))
            .copied()
    }
}

/// Reads and writes branch records under `branches/`.
pub struct BranchStore<'a> {
    store: &'a Store,
}

impl<'a> BranchStore<'a> {
    /// Create a new BranchStore for the given store.
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Get the path to a branch record, validating the name.
    fn branch_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.store.root().join("branches").join(name))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.branch_path(name)?.is_file())
    }

    /// Load a branch, or `BranchNotFound`.
    pub fn load(&self, name: &str) -> Result<Branch> {
        let path = self.branch_path(name)?;
        if !path.exists() {
            return Err(Error::branch_not_found(name));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write a branch record atomically.
    pub fn save(&self, branch: &Branch) -> Result<()> {
        let path = self.branch_path(&branch.name)?;
        write_atomic(&path, &serde_json::to_vec_pretty(branch)?)
    }

    /// All branch names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.store.root().join("branches"))? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && let Some(name) = entry.file_name().to_str()
                && validate_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete a branch pointer. Its commits stay in the store.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.branch_path(name)?;
        if !path.exists() {
            return Err(Error::branch_not_found(name));
        }
        fs::remove_file(&path)?;
        info!(branch = name, "removed branch");
        Ok(())
    }

    /// Branch `name` off `from`.
    ///
    /// The new branch copies `from`'s history and merge bases, and both record
    /// `from`'s head as their mutual merge base.
    pub fn create(&self, name: &str, from: &mut Branch) -> Result<Branch> {
        if self.exists(name)? {
            return Err(Error::branch_exists(name));
        }

        let mut branch = Branch {
            name: name.to_string(),
            history: from.history.clone(),
            head: from.head,
            merge_bases: from.merge_bases.clone(),
            merge: None,
        };
        branch.merge_bases.remove(name);
        branch.set_merge_base(&from.name, from.head);
        from.set_merge_base(name, from.head);

        self.save(&branch)?;
        self.save(from)?;
        info!(branch = name, from = %from.name, head = %from.head.short(), "created branch");
        Ok(branch)
    }

    /// Append a commit and move the head.
    ///
    /// If the branch is mid-merge this completes it: both participants record
    /// the incoming head as their merge base and the merge state is cleared.
    pub fn add_commit(&self, branch: &mut Branch, id: Hash) -> Result<()> {
        branch.history.push(id);
        branch.head = id;

        if let Some(state) = branch.merge.take() {
            branch.set_merge_base(&state.branch, state.their_head);
            // The other side may have been removed while the merge was open.
            if self.exists(&state.branch)? {
                let mut other = self.load(&state.branch)?;
                other.set_merge_base(&branch.name, state.their_head);
                self.save(&other)?;
            }
            info!(
                branch = %branch.name,
                other = %state.branch,
                base = %state.their_head.short(),
                "completed merge"
            );
        }

        self.save(branch)?;
        info!(branch = %branch.name, head = %id.short(), "advanced branch");
        Ok(())
    }

    /// Move `branch` up to `onto`'s head.
    ///
    /// Only valid when `branch`'s head is already in `onto`'s history.
    pub fn fast_forward(&self, branch: &mut Branch, onto: &mut Branch) -> Result<()> {
        if !onto.contains(&branch.head) {
            return Err(Error::NotFastForward {
                branch: branch.name.clone(),
                onto: onto.name.clone(),
            });
        }

        branch.history = onto.history.clone();
        branch.head = onto.head;
        branch.merge = None;
        branch.set_merge_base(&onto.name, onto.head);
        onto.set_merge_base(&branch.name, onto.head);

        self.save(branch)?;
        self.save(onto)?;
        info!(
            branch = %branch.name,
            onto = %onto.name,
            head = %onto.head.short(),
            "fast-forwarded"
        );
        Ok(())
    }
}

impl Store {
    /// Get the branch store for this repository.
    pub fn branches(&self) -> BranchStore<'_> {
        BranchStore::new(self)
    }
}

/// Branch names become file names and reflog fields, so no traversal,
/// separators or `|`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_branch_name("Branch name cannot be empty"));
    }
    if name.contains("..") || name.contains(['/', '\\', '|']) {
        return Err(Error::invalid_branch_name(format!(
            "{} (must not contain .., '|' or path separators)",
            name
        )));
    }
    if name.starts_with('.') || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::invalid_branch_name(format!(
            "{} (must not start with '.' or contain whitespace)",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Algorithm;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::init(temp_dir.path(), Algorithm::Blake3).unwrap();
        (temp_dir, store)
    }

    fn id(n: u8) -> Hash {
        Hash::hash_bytes(&[n])
    }

    fn master(store: &Store) -> Branch {
        let branch = Branch::new("master", id(0));
        store.branches().save(&branch).unwrap();
        branch
    }

    #[test]
    fn test_save_load() {
        let (_dir, store) = setup();
        let branch = master(&store);
        assert_eq!(store.branches().load("master").unwrap(), branch);
        assert_eq!(branch.head(), id(0));
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = setup();
        let err = store.branches().load("nope").unwrap_err();
        assert!(matches!(err, Error::BranchNotFound { .. }));
    }

    #[test]
    fn test_create_records_mutual_merge_base() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        branches.add_commit(&mut from, id(1)).unwrap();

        let feature = branches.create("feature", &mut from).unwrap();
        assert_eq!(feature.history(), from.history());
        assert_eq!(feature.head(), id(1));
        assert_eq!(feature.merge_base("master"), Some(id(1)));
        assert_eq!(from.merge_base("feature"), Some(id(1)));

        // Both sides persisted
        assert_eq!(branches.load("master").unwrap().merge_base("feature"), Some(id(1)));
        assert_eq!(branches.load("feature").unwrap(), feature);
    }

    #[test]
    fn test_create_existing_fails() {
        let (_dir, store) = setup();
        let mut from = master(&store);
        let err = store.branches().create("master", &mut from).unwrap_err();
        assert!(matches!(err, Error::BranchExists { .. }));
    }

    #[test]
    fn test_create_copies_peer_bases() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        let mut feature = branches.create("feature", &mut from).unwrap();
        let spin = branches.create("spin", &mut feature).unwrap();

        // spin inherits feature's view of master
        assert_eq!(spin.merge_base("master"), Some(id(0)));
        assert_eq!(spin.merge_base("feature"), Some(id(0)));
        assert_eq!(spin.merge_base("spin"), None);
    }

    #[test]
    fn test_add_commit_finalizes_merge() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        let mut feature = branches.create("feature", &mut from).unwrap();
        branches.add_commit(&mut feature, id(2)).unwrap();
        branches.add_commit(&mut from, id(3)).unwrap();

        from.begin_merge(MergeState {
            branch: "feature".into(),
            their_head: id(2),
            conflicts: vec!["a.txt".into()],
            introduced: Vec::new(),
        });
        branches.add_commit(&mut from, id(4)).unwrap();

        assert!(!from.is_merging());
        assert_eq!(from.head(), id(4));
        assert_eq!(from.history(), &[id(0), id(3), id(4)]);
        assert_eq!(from.merge_base("feature"), Some(id(2)));
        assert_eq!(branches.load("feature").unwrap().merge_base("master"), Some(id(2)));
    }

    #[test]
    fn test_fast_forward() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        let mut feature = branches.create("feature", &mut from).unwrap();
        branches.add_commit(&mut feature, id(5)).unwrap();

        branches.fast_forward(&mut from, &mut feature).unwrap();
        assert_eq!(from.head(), feature.head());
        assert_eq!(from.history(), feature.history());
        assert_eq!(from.merge_base("feature"), Some(id(5)));
        assert_eq!(feature.merge_base("master"), Some(id(5)));
    }

    #[test]
    fn test_fast_forward_requires_ancestor() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        let mut feature = branches.create("feature", &mut from).unwrap();
        branches.add_commit(&mut feature, id(5)).unwrap();
        branches.add_commit(&mut from, id(6)).unwrap();

        let err = branches.fast_forward(&mut from, &mut feature).unwrap_err();
        assert!(matches!(err, Error::NotFastForward { .. }));
        assert_eq!(branches.load("master").unwrap().head(), id(6));
    }

    #[test]
    fn test_list_and_remove() {
        let (_dir, store) = setup();
        let branches = store.branches();
        let mut from = master(&store);
        branches.create("zeta", &mut from).unwrap();
        branches.create("alpha", &mut from).unwrap();

        assert_eq!(branches.list().unwrap(), vec!["alpha", "master", "zeta"]);

        branches.remove("zeta").unwrap();
        assert_eq!(branches.list().unwrap(), vec!["alpha", "master"]);
        assert!(matches!(
            branches.remove("zeta").unwrap_err(),
            Error::BranchNotFound { .. }
        ));
    }

    #[test]
    fn test_truncate_and_newest_shared() {
        let mut a = Branch::new("a", id(0));
        a.history.extend([id(1), id(2)]);
        a.head = id(2);
        let mut b = a.clone();
        b.name = "b".into();
        b.history.truncate(2);
        b.history.push(id(9));
        b.head = id(9);

        assert_eq!(a.newest_shared(&b), Some(id(1)));
        assert!(a.truncate_to(&id(1)));
        assert_eq!(a.head(), id(1));
        assert_eq!(a.history(), &[id(0), id(1)]);
        assert!(!a.truncate_to(&id(9)));
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("foo/bar").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("a|b").is_err());
        assert!(validate_name("feature-1").is_ok());
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            max_shrink_iters: 1000,
            ..ProptestConfig::default()
        })]

        /// Valid branch names are accepted and round-trip through the store
        #[test]
        fn prop_valid_branch_names_accepted(name in "[a-zA-Z0-9_][a-zA-Z0-9_-]{0,40}") {
            let temp_dir = TempDir::new().unwrap();
            let store = Store::init(temp_dir.path(), Algorithm::Blake3)?;

            let branch = Branch::new(&name, id(1));
            store.branches().save(&branch)?;
            prop_assert_eq!(store.branches().load(&name)?, branch);
        }
    }
}
