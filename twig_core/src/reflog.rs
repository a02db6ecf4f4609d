//! Reflog: an append-only journal of branch-pointer updates.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Number of pipe-delimited fields in a reflog line.
const FIELDS: usize = 6;

/// One recorded move of a branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    /// Unix timestamp of the update.
    pub timestamp: i64,
    /// Branch whose head moved.
    pub branch: String,
    /// Previous head, `None` for a newly created branch.
    pub old: Option<Hash>,
    /// New head.
    pub new: Hash,
    /// Verb that moved it (e.g. "commit", "merge", "reset").
    pub action: String,
    /// Free text, usually the commit message.
    pub message: String,
}

impl ReflogEntry {
    /// Serialize the entry to a pipe-delimited line.
    ///
    /// The message is last so it may itself contain pipes; newlines are folded.
    pub fn to_line(&self) -> String {
        let old = self.old.map_or_else(|| "-".to_string(), |h| h.to_hex());
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.timestamp,
            self.branch,
            old,
            self.new,
            self.action,
            self.message.replace(['\n', '\r'], " ")
        )
    }

    /// Parse an entry from a pipe-delimited line.
    pub fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.splitn(FIELDS, '|').collect();
        if parts.len() != FIELDS {
            return Err(Error::invalid_format(format!(
                "Invalid reflog entry format: expected {} fields, got {}",
                FIELDS,
                parts.len()
            )));
        }

        let timestamp = parts[0].parse::<i64>().map_err(|_| {
            Error::invalid_format(format!("Invalid timestamp in reflog entry: {}", parts[0]))
        })?;
        let old = match parts[2] {
            "-" => None,
            hex => Some(Hash::from_hex(hex)?),
        };

        Ok(Self {
            timestamp,
            branch: parts[1].to_string(),
            old,
            new: Hash::from_hex(parts[3])?,
            action: parts[4].to_string(),
            message: parts[5].to_string(),
        })
    }
}

/// The reflog file.
#[derive(Debug)]
pub struct Reflog {
    path: PathBuf,
}

impl Reflog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append an entry, creating the file on first use.
    pub fn append(&self, entry: &ReflogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        file.flush()?;
        Ok(())
    }

    /// The most recent `count` entries, newest first. Unparseable lines are skipped.
    pub fn read_recent(&self, count: usize) -> Result<Vec<ReflogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(entry) = ReflogEntry::from_line(line) {
                entries.push(entry);
            }
        }

        Ok(entries.into_iter().rev().take(count).collect())
    }
}
