//! JSON persistence for the subject tree, profile and account
//!
//! Each record lives in `<data_dir>/<key>.json`. A missing file means the
//! record has never been written and loads as its default; an unreadable one
//! is an error so nothing silently overwrites it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{SubjectData, User, UserProfile};

pub const DATA_KEY: &str = "neura-data";
pub const PROFILE_KEY: &str = "neura-profile";
pub const USER_KEY: &str = "neura-user";
pub const ACTIVE_GOAL_KEY: &str = "neura-active-goal";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything persisted, as loaded at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub subjects: Vec<SubjectData>,
    pub profile: UserProfile,
    pub user: User,
    pub active_goal_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) the store directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        debug!(?dir, "Store::open: called");
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%key, "Store::read: absent");
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Serialize { path, source })
    }

    /// Write via a sibling temp file so a crash never leaves half a record
    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let text = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&tmp, text).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })?;
        debug!(%key, "Store::write: saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Snapshot, StoreError> {
        debug!("Store::load: called");
        let snapshot = Snapshot {
            subjects: self.read(DATA_KEY)?.unwrap_or_default(),
            profile: self.read(PROFILE_KEY)?.unwrap_or_else(UserProfile::dev_default),
            user: self.read(USER_KEY)?.unwrap_or_default(),
            active_goal_id: self.read(ACTIVE_GOAL_KEY)?.flatten(),
        };
        info!(
            subjects = snapshot.subjects.len(),
            active_goal = ?snapshot.active_goal_id,
            "Loaded state from {}",
            self.dir.display()
        );
        Ok(snapshot)
    }

    pub fn save_subjects(&self, subjects: &[SubjectData]) -> Result<(), StoreError> {
        self.write(DATA_KEY, &subjects)
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.write(PROFILE_KEY, profile)
    }

    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(USER_KEY, user)
    }

    pub fn save_active_goal(&self, goal_id: Option<&str>) -> Result<(), StoreError> {
        self.write(ACTIVE_GOAL_KEY, &goal_id)
    }
}
