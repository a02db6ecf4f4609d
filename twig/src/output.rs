//! Output formatting for CLI commands.
//!
//! Every command produces a serializable DTO for `--json` and a text rendering
//! for humans. Errors go to stderr in the same format.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};
use twig_core::{Commit, Hash, ReflogEntry, Status};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, message: &str, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: message.to_string(),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "{}", message);
            }
        }
    }
}

/// Timestamp format used by `log`.
fn format_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%a %b %-d %H:%M:%S %Y %z").to_string()
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// A commit as shown by `log`, `global-log` and `commit`.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub id: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Hash>,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl From<&Commit> for CommitInfo {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.id(),
            parent: commit.parent(),
            author: commit.author().to_string(),
            timestamp: commit.timestamp(),
            message: commit.message().to_string(),
        }
    }
}

impl CommitInfo {
    /// One `===` block of log output.
    pub fn render(&self) -> String {
        format!(
            "===\ncommit {}\nAuthor: {}\nDate: {}\n{}\n\n",
            self.id,
            self.author,
            format_date(&self.timestamp),
            self.message
        )
    }
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub branch: String,
    pub initial_commit: Hash,
}

/// Output for `add` command.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
    /// Blob staged for the path; absent when the file matched the tracked version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<Hash>,
}

/// Output for `commit` command.
#[derive(Debug, Serialize)]
pub struct CommitOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    pub commit: CommitInfo,
}

/// Output for `rm` command.
#[derive(Debug, Serialize)]
pub struct RmOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
}

/// Output for `log` and `global-log` commands.
#[derive(Debug, Serialize)]
pub struct LogOutput {
    pub success: bool,
    pub result_code: u8,
    pub commits: Vec<CommitInfo>,
}

/// Output for `find` command.
#[derive(Debug, Serialize)]
pub struct FindOutput {
    pub success: bool,
    pub result_code: u8,
    pub message: String,
    pub ids: Vec<Hash>,
}

/// Unstaged change reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct UnstagedInfo {
    pub path: String,
    pub change: String,
}

/// Open merge reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct MergeInfo {
    pub branch: String,
    pub their_head: Hash,
    pub conflicts: Vec<String>,
}

/// Output for `status` command.
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    pub branches: Vec<String>,
    pub staged: Vec<String>,
    pub removed: Vec<String>,
    pub unstaged: Vec<UnstagedInfo>,
    pub untracked: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeInfo>,
}

impl From<Status> for StatusOutput {
    fn from(status: Status) -> Self {
        Self {
            success: true,
            result_code: 0,
            branch: status.current_branch,
            branches: status.branches,
            staged: status.staged,
            removed: status.removed,
            unstaged: status
                .unstaged
                .into_iter()
                .map(|(path, change)| UnstagedInfo {
                    path,
                    change: change.as_str().to_string(),
                })
                .collect(),
            untracked: status.untracked,
            merge: status.merge.map(|m| MergeInfo {
                branch: m.branch,
                their_head: m.their_head,
                conflicts: m.conflicts,
            }),
        }
    }
}

impl StatusOutput {
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(merge) = &self.merge {
            let _ = writeln!(
                out,
                "Merging {} ({} conflicts)\n",
                merge.branch,
                merge.conflicts.len()
            );
        }

        out.push_str("=== Branches ===\n");
        for name in &self.branches {
            let marker = if *name == self.branch { "*" } else { "" };
            let _ = writeln!(out, "{}{}", marker, name);
        }

        out.push_str("\n=== Staged Files ===\n");
        for path in &self.staged {
            let _ = writeln!(out, "{}", path);
        }

        out.push_str("\n=== Removed Files ===\n");
        for path in &self.removed {
            let _ = writeln!(out, "{}", path);
        }

        out.push_str("\n=== Modifications Not Staged For Commit ===\n");
        for info in &self.unstaged {
            let _ = writeln!(out, "{} ({})", info.path, info.change);
        }

        out.push_str("\n=== Untracked Files ===\n");
        for path in &self.untracked {
            let _ = writeln!(out, "{}", path);
        }
        out.push('\n');
        out
    }
}

/// Output for `checkout` command.
#[derive(Debug, Serialize)]
pub struct CheckoutOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Output for `branch` command.
#[derive(Debug, Serialize)]
pub struct BranchOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
    pub head: Hash,
}

/// Output for `rm-branch` command.
#[derive(Debug, Serialize)]
pub struct RmBranchOutput {
    pub success: bool,
    pub result_code: u8,
    pub name: String,
}

/// Output for `reset` command.
#[derive(Debug, Serialize)]
pub struct ResetOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    pub commit: Hash,
}

/// Output for `merge` command.
#[derive(Debug, Serialize)]
pub struct MergeOutput {
    pub success: bool,
    pub result_code: u8,
    pub branch: String,
    /// One of "ancestor", "fast-forward", "merged", "conflicted", "aborted".
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<Hash>,
    pub conflicts: Vec<String>,
}

/// Reflog entry for `reflog` command.
#[derive(Debug, Clone, Serialize)]
pub struct ReflogEntryInfo {
    pub timestamp: i64,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Hash>,
    pub new: Hash,
    pub action: String,
    pub message: String,
}

impl From<ReflogEntry> for ReflogEntryInfo {
    fn from(entry: ReflogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            branch: entry.branch,
            old: entry.old,
            new: entry.new,
            action: entry.action,
            message: entry.message,
        }
    }
}

/// Output for `reflog` command.
#[derive(Debug, Serialize)]
pub struct ReflogOutput {
    pub success: bool,
    pub result_code: u8,
    pub entries: Vec<ReflogEntryInfo>,
}

/// Output for `config` command.
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub success: bool,
    pub result_code: u8,
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_commit_render() {
        let info = CommitInfo {
            id: Hash::hash_bytes(b"c"),
            parent: None,
            author: "Ann <ann@example.org>".into(),
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            message: "initial commit".into(),
        };
        let text = info.render();
        assert!(text.starts_with(&format!("===\ncommit {}\n", info.id)));
        assert!(text.contains("Date: Thu Jan 1 00:00:00 1970 +0000\n"));
        assert!(text.ends_with("initial commit\n\n"));

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("parent").is_none());
        assert_eq!(json["id"], info.id.to_hex());
    }

    #[test]
    fn test_status_render_marks_current_branch() {
        let status = Status {
            current_branch: "master".into(),
            branches: vec!["feature".into(), "master".into()],
            staged: vec!["a.txt".into()],
            untracked: vec!["loose.txt".into()],
            ..Default::default()
        };
        let text = StatusOutput::from(status).render();
        assert!(text.starts_with("=== Branches ===\nfeature\n*master\n"));
        assert!(text.contains("=== Staged Files ===\na.txt\n"));
        assert!(text.contains("=== Untracked Files ===\nloose.txt\n"));
        assert!(!text.contains("Merging"));
    }
}
