//! One method per user-facing verb.
//!
//! Every verb validates its preconditions before writing anything, then writes
//! new objects, then moves pointers: branch records first, the staging record
//! after. The caller saves the `Session` last, once the verb has succeeded.

use crate::branch::{Branch, MergeState};
use crate::commit::{BlobRef, Commit, FileRecord};
use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::merge::{self, MergeOutcome};
use crate::reflog::{Reflog, ReflogEntry};
use crate::staging::StagingArea;
use crate::status::{self, Status};
use crate::store::Store;
use crate::workspace::{Identity, Session};
use crate::worktree::{REPO_DIR, Worktree, normalize_path};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the branch `init` creates.
pub const DEFAULT_BRANCH: &str = "master";

/// Message of the root commit every repository starts from.
pub const INITIAL_MESSAGE: &str = "initial commit";

/// A repository: the object store plus the working tree it versions.
#[derive(Debug)]
pub struct Repository {
    store: Store,
    worktree: Worktree,
    reflog: Reflog,
}

impl Repository {
    /// Create a repository in `work_dir`.
    ///
    /// Starts `master` at an empty root commit stamped with the Unix epoch, so
    /// every repository shares the same first commit shape.
    pub fn init<P: AsRef<Path>>(work_dir: P) -> Result<(Self, Session)> {
        let work_dir = work_dir.as_ref();
        let root = work_dir.join(REPO_DIR);
        if root.exists() {
            return Err(Error::AlreadyInitialized);
        }

        let store = Store::init(&root, Algorithm::Blake3)?;
        let repo = Self::from_store(store, work_dir);
        let session = Session {
            branch: DEFAULT_BRANCH.to_string(),
            identity: Identity::from_env(),
            tracker: Default::default(),
        };

        let initial = Commit::create(
            &repo.store,
            &StagingArea::default(),
            &Default::default(),
            &session.identity.to_string(),
            INITIAL_MESSAGE,
            None,
            DateTime::<Utc>::default(),
        )?;
        repo.store.put_commit(&initial)?;

        let branch = Branch::new(DEFAULT_BRANCH, initial.id());
        repo.store.branches().save(&branch)?;
        repo.record(&branch, None, "init", INITIAL_MESSAGE)?;
        session.save(&repo.store)?;

        info!(root = %root.display(), "initialized repository");
        Ok((repo, session))
    }

    /// Open the repository rooted at `work_dir`.
    pub fn open<P: AsRef<Path>>(work_dir: P) -> Result<Self> {
        let work_dir = work_dir.as_ref();
        let store = Store::open(work_dir.join(REPO_DIR))?;
        Ok(Self::from_store(store, work_dir))
    }

    fn from_store(store: Store, work_dir: &Path) -> Self {
        let reflog = Reflog::new(store.root().join("reflog"));
        Self {
            store,
            worktree: Worktree::new(work_dir),
            reflog,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn worktree(&self) -> &Worktree {
        &self.worktree
    }

    pub fn load_session(&self) -> Result<Session> {
        Session::load(&self.store)
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        session.save(&self.store)
    }

    fn staging_path(&self) -> PathBuf {
        self.store.root().join("staging")
    }

    pub fn staging(&self) -> Result<StagingArea> {
        StagingArea::load(&self.staging_path())
    }

    fn save_staging(&self, staging: &StagingArea) -> Result<()> {
        staging.save(&self.staging_path())
    }

    /// Append a reflog line for a branch whose head moved from `old`.
    fn record(
        &self,
        branch: &Branch,
        old: Option<Hash>,
        action: &str,
        message: &str,
    ) -> Result<()> {
        self.reflog.append(&ReflogEntry {
            timestamp: Utc::now().timestamp(),
            branch: branch.name().to_string(),
            old,
            new: branch.head(),
            action: action.to_string(),
            message: message.to_string(),
        })
    }

    /// Fail if materializing `target` would overwrite an untracked working file.
    ///
    /// A file whose content already equals the target's is not in the way. A
    /// directory where the target has a file, or an untracked file where the
    /// target needs a directory, is.
    fn check_untracked(
        &self,
        session: &Session,
        staging: &StagingArea,
        target: &Commit,
    ) -> Result<()> {
        let working = self.worktree.snapshot()?;
        let untracked = status::untracked_files(&session.tracker, staging, &working);
        let target_paths: Vec<&str> = target
            .files()
            .iter()
            .filter(|(_, record)| record.blob.is_present())
            .map(|(path, _)| path.as_str())
            .collect();

        let mut in_the_way: Vec<String> = untracked
            .iter()
            .filter(|path| {
                let prefix = format!("{}/", path);
                target
                    .blob(path)
                    .is_some_and(|hash| working.get(*path) != Some(&hash))
                    || target_paths.iter().any(|t| t.starts_with(&prefix))
            })
            .cloned()
            .collect();
        // Tracked files under a directory are removed before the target is
        // written; anything else keeps the directory alive.
        in_the_way.extend(
            target_paths
                .iter()
                .filter(|path| {
                    let prefix = format!("{}/", path);
                    working.keys().any(|live| {
                        live.starts_with(&prefix)
                            && !session.tracker.get(live).is_some_and(BlobRef::is_present)
                    })
                })
                .map(|path| path.to_string()),
        );

        if in_the_way.is_empty() {
            Ok(())
        } else {
            Err(Error::untracked_in_the_way(in_the_way))
        }
    }

    /// Materialize `target` over the current checkout and retarget the tracker.
    fn switch_to(&self, session: &mut Session, target: &Commit) -> Result<()> {
        target.checkout_all(&self.store, &self.worktree, &session.tracker)?;
        session.tracker = target.tracker();
        Ok(())
    }

    /// Stage a working file.
    ///
    /// Content identical to the tracked version is unstaged instead, which
    /// also cancels a pending removal. Returns the staged blob, if any.
    pub fn add(&self, session: &Session, path: &str) -> Result<Option<Hash>> {
        let rel = normalize_path(path)?;
        let bytes = self.worktree.read(&rel)?;
        let mut staging = self.staging()?;
        let tracked = session.tracker.get(&rel).and_then(|blob| blob.hash());

        let hash = Hash::hash_bytes(&bytes);
        let staged = if tracked == Some(hash) {
            staging.unstage(&rel);
            None
        } else {
            self.store.put_blob(&bytes)?;
            let record = match tracked {
                Some(_) => FileRecord::modified(hash),
                None => FileRecord::added(hash),
            };
            staging.stage(&rel, record);
            Some(hash)
        };

        self.save_staging(&staging)?;
        debug!(path = %rel, staged = staged.is_some(), "add");
        Ok(staged)
    }

    /// Commit the staging area onto the current branch.
    ///
    /// While a merge is open an empty staging area is allowed; the commit then
    /// closes the merge.
    pub fn commit(&self, session: &mut Session, message: &str) -> Result<Commit> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        let branches = self.store.branches();
        let mut branch = branches.load(&session.branch)?;
        let mut staging = self.staging()?;
        if staging.is_empty() && !branch.is_merging() {
            return Err(Error::NothingToCommit);
        }

        let head = self.store.get_commit(&branch.head())?;
        let commit = Commit::create(
            &self.store,
            &staging,
            head.files(),
            &session.identity.to_string(),
            message,
            Some(head.id()),
            Utc::now(),
        )?;
        self.store.put_commit(&commit)?;

        let action = if branch.is_merging() { "commit (merge)" } else { "commit" };
        branches.add_commit(&mut branch, commit.id())?;
        self.record(&branch, Some(head.id()), action, message)?;

        staging.clear();
        self.save_staging(&staging)?;
        session.tracker = commit.tracker();

        info!(branch = %branch.name(), commit = %commit.id().short(), "committed");
        Ok(commit)
    }

    /// The current branch's history, newest first.
    pub fn log(&self, session: &Session) -> Result<Vec<Commit>> {
        let branch = self.store.branches().load(&session.branch)?;
        branch
            .history()
            .iter()
            .rev()
            .map(|id| self.store.get_commit(id))
            .collect()
    }

    /// Every commit in the store, newest first.
    pub fn global_log(&self) -> Result<Vec<Commit>> {
        self.store.all_commits()
    }

    /// Ids of commits whose message contains `message`.
    pub fn find(&self, message: &str) -> Result<Vec<Hash>> {
        let ids: Vec<Hash> = self
            .store
            .all_commits()?
            .into_iter()
            .filter(|commit| commit.message().contains(message))
            .map(|commit| commit.id())
            .collect();
        if ids.is_empty() {
            return Err(Error::NoCommitWithMessage {
                message: message.to_string(),
            });
        }
        Ok(ids)
    }

    /// Switch to another branch and materialize its head.
    pub fn checkout_branch(&self, session: &mut Session, name: &str) -> Result<()> {
        if name == session.branch {
            return Err(Error::AlreadyOnBranch);
        }
        let branches = self.store.branches();
        let target = branches.load(name)?;
        let current = branches.load(&session.branch)?;
        if let Some(state) = current.merge_state() {
            return Err(Error::MergeInProgress {
                branch: state.branch.clone(),
            });
        }

        let head = self.store.get_commit(&target.head())?;
        let mut staging = self.staging()?;
        self.check_untracked(session, &staging, &head)?;

        self.switch_to(session, &head)?;
        staging.clear();
        self.save_staging(&staging)?;
        session.branch = name.to_string();

        info!(branch = name, head = %head.id().short(), "switched branch");
        Ok(())
    }

    /// Restore one file from `commit` (default: the current head). Staging is untouched.
    pub fn checkout_file(&self, session: &Session, commit: Option<&str>, path: &str) -> Result<()> {
        let rel = normalize_path(path)?;
        let id = match commit {
            Some(prefix) => self.store.resolve_commit(prefix)?,
            None => self.store.branches().load(&session.branch)?.head(),
        };
        self.store
            .get_commit(&id)?
            .checkout_one(&self.store, &self.worktree, &rel)
    }

    /// Unstage a file, and if it is tracked, stage its removal and delete it.
    pub fn remove(&self, session: &Session, path: &str) -> Result<()> {
        let rel = normalize_path(path)?;
        let mut staging = self.staging()?;
        let staged = staging.get(&rel).is_some_and(|r| r.blob.is_present());
        let tracked = session.tracker.get(&rel).is_some_and(|b| b.is_present());

        if !staged && !tracked {
            return Err(Error::NoReasonToRemove { path: rel });
        }

        staging.unstage(&rel);
        if tracked {
            staging.stage(&rel, FileRecord::deleted());
            self.worktree.delete(&rel)?;
        }
        self.save_staging(&staging)
    }

    /// Create a branch at the current head. Does not switch to it.
    pub fn branch(&self, session: &Session, name: &str) -> Result<Branch> {
        let branches = self.store.branches();
        if branches.exists(name)? {
            return Err(Error::branch_exists(name));
        }
        let mut current = branches.load(&session.branch)?;
        let branch = branches.create(name, &mut current)?;
        self.record(&branch, None, "branch", &format!("created from {}", current.name()))?;
        Ok(branch)
    }

    /// Delete a branch pointer. Its commits remain in the store.
    pub fn remove_branch(&self, session: &Session, name: &str) -> Result<()> {
        if name == session.branch {
            return Err(Error::RemoveCurrentBranch);
        }
        self.store.branches().remove(name)
    }

    /// Move a branch head back to `commit` and materialize it.
    ///
    /// The current branch is searched first, then the others by name; if the
    /// commit belongs to another branch, that branch becomes current. Commits
    /// after the target drop out of the branch's history.
    pub fn reset(&self, session: &mut Session, commit: &str) -> Result<Commit> {
        let id = self.store.resolve_commit(commit)?;
        let branches = self.store.branches();
        let mut current = branches.load(&session.branch)?;

        let mut owner = None;
        if !current.contains(&id) {
            for name in branches.list()? {
                if name == session.branch {
                    continue;
                }
                let candidate = branches.load(&name)?;
                if candidate.contains(&id) {
                    owner = Some(candidate);
                    break;
                }
            }
            if owner.is_none() {
                return Err(Error::commit_not_found(commit));
            }
        }

        let target = self.store.get_commit(&id)?;
        let mut staging = self.staging()?;
        self.check_untracked(session, &staging, &target)?;

        self.switch_to(session, &target)?;

        let merge_was_open = current.clear_merge().is_some();
        let mut branch = match owner {
            Some(other) => {
                if merge_was_open {
                    branches.save(&current)?;
                }
                other
            }
            None => current,
        };
        let old = branch.head();
        branch.truncate_to(&id);
        branch.clear_merge();
        branches.save(&branch)?;
        self.record(&branch, Some(old), "reset", target.message())?;

        staging.clear();
        self.save_staging(&staging)?;
        session.branch = branch.name().to_string();

        info!(branch = %branch.name(), head = %id.short(), "reset");
        Ok(target)
    }

    /// Merge branch `other` into the current branch.
    pub fn merge(&self, session: &mut Session, other: &str) -> Result<MergeOutcome> {
        let branches = self.store.branches();
        let mut current = branches.load(&session.branch)?;
        if let Some(state) = current.merge_state() {
            return Err(Error::MergeInProgress {
                branch: state.branch.clone(),
            });
        }
        let mut staging = self.staging()?;
        if !staging.is_empty() {
            return Err(Error::UncommittedChanges);
        }
        if other == session.branch {
            return Err(Error::MergeWithSelf);
        }
        let mut incoming = branches.load(other)?;

        if current.contains(&incoming.head())
            || current.merge_base(other) == Some(incoming.head())
        {
            info!(branch = %current.name(), other, "already merged");
            return Ok(MergeOutcome::Ancestor);
        }

        let theirs = self.store.get_commit(&incoming.head())?;

        if incoming.contains(&current.head()) {
            self.check_untracked(session, &staging, &theirs)?;
            let old = current.head();
            self.switch_to(session, &theirs)?;
            branches.fast_forward(&mut current, &mut incoming)?;
            self.record(&current, Some(old), "merge (fast-forward)", other)?;
            return Ok(MergeOutcome::FastForward { head: theirs.id() });
        }

        let base_id = current
            .merge_base(other)
            .or_else(|| incoming.merge_base(current.name()))
            .or_else(|| current.newest_shared(&incoming))
            .ok_or_else(|| Error::commit_not_found(format!("merge base of {}", other)))?;
        let base = self.store.get_commit(&base_id)?;
        let mine = self.store.get_commit(&current.head())?;
        self.check_untracked(session, &staging, &theirs)?;

        debug!(
            base = %base.id().short(),
            mine = %mine.id().short(),
            theirs = %theirs.id().short(),
            "three-way merge"
        );
        let plan = merge::plan(&base, &mine, &theirs);
        let conflicts = merge::apply(&self.store, &self.worktree, &mut staging, &plan)?;

        current.begin_merge(MergeState {
            branch: other.to_string(),
            their_head: theirs.id(),
            conflicts: conflicts.clone(),
            introduced: merge::introduced(&plan),
        });

        if !conflicts.is_empty() {
            branches.save(&current)?;
            self.save_staging(&staging)?;
            info!(branch = %current.name(), other, conflicts = conflicts.len(), "merge left open");
            return Ok(MergeOutcome::Conflicted { conflicts });
        }

        let message = format!("Merged {} with {}.", other, session.branch);
        let commit = Commit::create(
            &self.store,
            &staging,
            mine.files(),
            &session.identity.to_string(),
            &message,
            Some(mine.id()),
            Utc::now(),
        )?;
        self.store.put_commit(&commit)?;
        self.switch_to(session, &commit)?;

        branches.add_commit(&mut current, commit.id())?;
        self.record(&current, Some(mine.id()), "merge", &message)?;
        staging.clear();
        self.save_staging(&staging)?;

        Ok(MergeOutcome::Merged { commit: commit.id() })
    }

    /// Abandon an open merge and restore the head commit.
    ///
    /// Files the merge created are deleted. Files staged by hand while the
    /// merge was open stay on disk, untracked.
    pub fn abort_merge(&self, session: &mut Session) -> Result<MergeState> {
        let branches = self.store.branches();
        let mut current = branches.load(&session.branch)?;
        let state = current.clear_merge().ok_or(Error::NoMergeInProgress)?;
        let head = self.store.get_commit(&current.head())?;
        let mut staging = self.staging()?;

        for path in state.introduced.iter().filter(|path| !head.contains(path)) {
            self.worktree.delete(path)?;
        }
        self.switch_to(session, &head)?;

        branches.save(&current)?;
        staging.clear();
        self.save_staging(&staging)?;

        info!(branch = %current.name(), other = %state.branch, "merge aborted");
        Ok(state)
    }

    /// Working directory status for the current branch.
    pub fn status(&self, session: &Session) -> Result<Status> {
        let branches = self.store.branches();
        let current = branches.load(&session.branch)?;
        let staging = self.staging()?;
        let working = self.worktree.snapshot()?;

        Ok(status::compute(
            &session.branch,
            branches.list()?,
            current.merge_state().cloned(),
            &session.tracker,
            &staging,
            &working,
        ))
    }

    /// The most recent `limit` branch-pointer updates, newest first.
    pub fn reflog(&self, limit: usize) -> Result<Vec<ReflogEntry>> {
        self.reflog.read_recent(limit)
    }

    /// Set `user.name` or `user.email`.
    pub fn set_identity(&self, session: &mut Session, key: &str, value: &str) -> Result<()> {
        session.identity.set(key, value)
    }
}
