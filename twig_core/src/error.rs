//! Error types for twig_core.
//!
//! Variants fall into two groups. User errors describe a precondition the
//! command checked before touching anything; the CLI renders them as a single
//! line. Everything else is a storage fault and aborts the command.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using twig_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during repository operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A persisted record could not be encoded or decoded.
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// A header, config file or reflog line does not follow its format.
    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    /// Object not found in store.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// Repository metadata is unreadable or inconsistent.
    #[error("Invalid repository at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Invalid object type.
    #[error("Invalid object type: expected {expected}, got {got}")]
    InvalidObjectType { expected: String, got: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// Compression or decompression failed.
    #[error("Compression error: {reason}")]
    Compression { reason: String },

    /// No repository in the working directory.
    #[error("Not in an initialized twig directory.")]
    NotInitialized,

    /// `init` on a directory that already has a repository.
    #[error("A twig version-control system already exists in the current directory.")]
    AlreadyInitialized,

    /// Invalid branch name.
    #[error("Invalid branch name: {reason}")]
    InvalidBranchName { reason: String },

    /// Branch does not exist.
    #[error("A branch with that name does not exist.")]
    BranchNotFound { name: String },

    /// Branch already exists.
    #[error("A branch with that name already exists.")]
    BranchExists { name: String },

    /// No commit matches the given id or prefix.
    #[error("No commit with that id exists.")]
    CommitNotFound { id: String },

    /// `find` matched nothing.
    #[error("Found no commit with that message.")]
    NoCommitWithMessage { message: String },

    /// More than one commit matches the given prefix.
    #[error("Commit id {prefix} is ambiguous ({matches} matches).")]
    AmbiguousCommit { prefix: String, matches: usize },

    /// Commit requested with an empty staging area.
    #[error("No changes added to the commit.")]
    NothingToCommit,

    /// Commit requested with a blank message.
    #[error("Please enter a commit message.")]
    EmptyMessage,

    /// A working file that is not tracked would be overwritten.
    #[error("There is an untracked file in the way; delete it or add it first.")]
    UntrackedFileInTheWay { paths: Vec<String> },

    /// Merge requested with the active branch as the source.
    #[error("Cannot merge a branch with itself.")]
    MergeWithSelf,

    /// Fast-forward requested for a branch that is not behind its target.
    #[error("Branch {branch} cannot be fast-forwarded onto {onto}.")]
    NotFastForward { branch: String, onto: String },

    /// Merge requested while changes are staged.
    #[error("You have uncommitted changes.")]
    UncommittedChanges,

    /// Merge requested while another merge is unfinished.
    #[error("A merge with {branch} is in progress; commit the resolution or abort it.")]
    MergeInProgress { branch: String },

    /// Merge abort requested with no merge in progress.
    #[error("There is no merge in progress.")]
    NoMergeInProgress,

    /// `rm-branch` on the active branch.
    #[error("Cannot remove the current branch.")]
    RemoveCurrentBranch,

    /// `checkout` of the branch that is already active.
    #[error("No need to checkout the current branch.")]
    AlreadyOnBranch,

    /// Working file does not exist.
    #[error("File does not exist.")]
    FileNotFound { path: String },

    /// Path is absent from the requested commit.
    #[error("File does not exist in that commit.")]
    FileNotInCommit { path: String },

    /// `rm` on a path that is neither tracked nor staged.
    #[error("No reason to remove the file.")]
    NoReasonToRemove { path: String },

    /// Unknown configuration key.
    #[error("Unknown configuration key: {key}")]
    UnknownConfigKey { key: String },
}

impl Error {
    /// Returns true for precondition failures reported to the user.
    ///
    /// These are detected before any state is written. Everything else is a
    /// storage fault.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Error::Io { .. }
                | Error::Serialization { .. }
                | Error::CorruptedObject { .. }
                | Error::InvalidHash { .. }
                | Error::InvalidFormat { .. }
                | Error::ObjectNotFound { .. }
                | Error::InvalidStore { .. }
                | Error::InvalidObjectType { .. }
                | Error::UnsupportedAlgorithm { .. }
                | Error::Compression { .. }
        )
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidObjectType error.
    pub fn invalid_object_type(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::InvalidObjectType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Create a Compression error.
    pub fn compression_error(reason: impl Into<String>) -> Self {
        Error::Compression {
            reason: reason.into(),
        }
    }

    /// Create an InvalidBranchName error.
    pub fn invalid_branch_name(reason: impl Into<String>) -> Self {
        Error::InvalidBranchName {
            reason: reason.into(),
        }
    }

    /// Create a BranchNotFound error.
    pub fn branch_not_found(name: impl Into<String>) -> Self {
        Error::BranchNotFound { name: name.into() }
    }

    /// Create a BranchExists error.
    pub fn branch_exists(name: impl Into<String>) -> Self {
        Error::BranchExists { name: name.into() }
    }

    /// Create a CommitNotFound error.
    pub fn commit_not_found(id: impl Into<String>) -> Self {
        Error::CommitNotFound { id: id.into() }
    }

    /// Create an UntrackedFileInTheWay error.
    pub fn untracked_in_the_way(paths: Vec<String>) -> Self {
        Error::UntrackedFileInTheWay { paths }
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Error::FileNotFound { path: path.into() }
    }

    /// Create a FileNotInCommit error.
    pub fn file_not_in_commit(path: impl Into<String>) -> Self {
        Error::FileNotInCommit { path: path.into() }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_classified() {
        assert!(Error::NothingToCommit.is_user_error());
        assert!(Error::MergeWithSelf.is_user_error());
        assert!(Error::branch_not_found("dev").is_user_error());
        assert!(Error::untracked_in_the_way(vec!["a.txt".into()]).is_user_error());
    }

    #[test]
    fn test_storage_faults_are_not_user_errors() {
        let io = Error::from(std::io::Error::other("disk on fire"));
        assert!(!io.is_user_error());
        assert!(!Error::corrupted_object("/x", "bad").is_user_error());
        assert!(!Error::object_not_found("abcd").is_user_error());
        assert!(!Error::invalid_format("bad magic").is_user_error());
    }

    #[test]
    fn test_messages_are_single_lines() {
        let errors = [
            Error::NotInitialized,
            Error::RemoveCurrentBranch,
            Error::commit_not_found("123"),
            Error::file_not_in_commit("a.txt"),
        ];
        for err in errors {
            assert!(!err.to_string().contains('\n'));
        }
    }
}
