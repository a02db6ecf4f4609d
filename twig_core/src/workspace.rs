//! Per-invocation session: active branch, identity and file tracker.
//!
//! A command loads the session once, threads it through the repository
//! operations by `&mut`, and saves it after they succeed.

use crate::commit::Tracker;
use crate::error::{Error, Result};
use crate::store::{Store, config_entries, write_atomic};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;

/// Author recorded on commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// `$USER@$HOSTNAME`, the identity of a fresh install.
    pub fn from_env() -> Self {
        let name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "twig".to_string());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self {
            email: format!("{}@{}", name, host),
            name,
        }
    }

    /// Apply a `user.*` config key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "user.name" => self.name = value.to_string(),
            "user.email" => self.email = value.to_string(),
            _ => {
                return Err(Error::UnknownConfigKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Name of the checked-out branch.
    pub branch: String,
    pub identity: Identity,
    /// Mirror of the checked-out commit's file table.
    pub tracker: Tracker,
}

impl Session {
    /// Read the session from `config` and `tracker`.
    pub fn load(store: &Store) -> Result<Self> {
        let config_path = store.root().join("config");
        let content = fs::read_to_string(&config_path)?;

        let mut branch = None;
        let mut identity = Identity::from_env();
        for (key, value) in config_entries(&content) {
            match key {
                "branch" => branch = Some(value.to_string()),
                "user.name" | "user.email" => identity.set(key, value)?,
                _ => {}
            }
        }
        let branch =
            branch.ok_or_else(|| Error::invalid_store(&config_path, "no active branch in config"))?;

        let tracker_path = store.root().join("tracker");
        let tracker = if tracker_path.exists() {
            serde_json::from_slice(&fs::read(&tracker_path)?)?
        } else {
            Tracker::new()
        };

        Ok(Self {
            branch,
            identity,
            tracker,
        })
    }

    /// Persist the session. The config keeps the store's version and algorithm.
    pub fn save(&self, store: &Store) -> Result<()> {
        write_atomic(
            &store.root().join("tracker"),
            &serde_json::to_vec_pretty(&self.tracker)?,
        )?;

        let config = format!(
            "# twig repository config\n\
             version=1\nalgo={}\nbranch={}\nuser.name={}\nuser.email={}\n",
            store.algorithm().as_str(),
            self.branch,
            self.identity.name,
            self.identity.email,
        );
        write_atomic(&store.root().join("config"), config.as_bytes())
    }
}
