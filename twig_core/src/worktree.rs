//! Working directory file I/O.
//!
//! Paths handed to and returned from this module are relative to the work dir
//! and always use `/` as the separator, which is also how they are keyed in
//! commit, staging and tracker tables.

use crate::error::{Error, Result};
use crate::hash::Hash;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Name of the repository directory inside the work dir.
pub const REPO_DIR: &str = ".twig";

/// The files a repository versions, rooted at the work dir.
#[derive(Debug, Clone)]
pub struct Worktree {
    root: PathBuf,
}

impl Worktree {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a tracked path.
    pub fn full_path(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Whether a regular file exists at `rel`.
    pub fn exists(&self, rel: &str) -> bool {
        self.full_path(rel).is_file()
    }

    /// Read a working file. A missing file is `FileNotFound`.
    pub fn read(&self, rel: &str) -> Result<Vec<u8>> {
        match fs::read(self.full_path(rel)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::file_not_found(rel)),
            Err(e) => Err(e.into()),
        }
    }

    /// Hash a working file, or `None` if it does not exist.
    pub fn hash(&self, rel: &str) -> Result<Option<Hash>> {
        let path = self.full_path(rel);
        if !path.is_file() {
            return Ok(None);
        }
        Hash::hash_file(&path).map(Some)
    }

    /// Write `bytes` to a working file, creating parent directories.
    pub fn write(&self, rel: &str, bytes: &[u8]) -> Result<()> {
        let path = self.full_path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!(path = rel, bytes = bytes.len(), "wrote working file");
        Ok(())
    }

    /// Delete a working file if present, pruning directories it leaves empty.
    pub fn delete(&self, rel: &str) -> Result<()> {
        let path = self.full_path(rel);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = rel, "deleted working file"),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    /// List every working file, sorted.
    ///
    /// Honors `.gitignore` files and never descends into the repository directory.
    pub fn list(&self) -> Result<Vec<String>> {
        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(false) // Include hidden files
            .git_ignore(true) // Respect .gitignore
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != REPO_DIR)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if let Some(rel) = self.relative(entry.path()) {
                files.push(rel);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Hash every working file.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Hash>> {
        let mut table = BTreeMap::new();
        for rel in self.list()? {
            let hash = Hash::hash_file(&self.full_path(&rel))?;
            table.insert(rel, hash);
        }
        Ok(table)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

/// Normalize a user-supplied path into table form.
///
/// Accepts `./` prefixes and platform separators; rejects absolute paths,
/// `..` components and anything inside the repository directory.
pub fn normalize_path(input: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in Path::new(&input.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| Error::file_not_found(input))?;
                parts.push(part.to_string());
            }
            Component::CurDir => {}
            _ => return Err(Error::file_not_found(input)),
        }
    }

    if parts.is_empty() || parts[0] == REPO_DIR {
        return Err(Error::file_not_found(input));
    }
    Ok(parts.join("/"))
}
