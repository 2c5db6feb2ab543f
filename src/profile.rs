//! User profiles.
//!
//! Profiles live in `users.json`, an object keyed by username. Authentication
//! and password storage belong to whatever wrote the file; any extra fields on
//! a record (a password hash, for instance) are preserved but never read.

use crate::store::{self, StoreError};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Who is listening. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub language: String,
    pub favorite_artist: String,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no profile named `{0}`")]
    NotFound(String),

    #[error("a profile named `{0}` already exists")]
    AlreadyExists(String),

    #[error("profile name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read access to `users.json`, plus signup.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    ///
    /// [`ProfileError::NotFound`] if no such user; store errors if the file
    /// is unreadable or the record is malformed.
    pub fn get(&self, name: &str) -> Result<Profile, ProfileError> {
        let users = self.load()?;
        let record = users
            .get(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;

        Profile::deserialize(record).map_err(|source| {
            ProfileError::Store(StoreError::StoreCorrupt {
                path: self.path.clone(),
                source,
            })
        })
    }

    /// Adds a new profile.
    ///
    /// # Errors
    ///
    /// [`ProfileError::AlreadyExists`] if the name is taken.
    pub fn register(&self, profile: &Profile) -> Result<(), ProfileError> {
        if profile.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }

        let mut users = self.load()?;
        if users.contains_key(&profile.name) {
            return Err(ProfileError::AlreadyExists(profile.name.clone()));
        }

        let record = serde_json::to_value(profile).map_err(StoreError::Serialize)?;
        users.insert(profile.name.clone(), record);
        store::write_json_atomic(&self.path, &users)?;

        info!("Registered profile {}", profile.name);
        Ok(())
    }

    /// All usernames, sorted.
    ///
    /// # Errors
    ///
    /// Store errors if the file is unreadable.
    pub fn names(&self) -> Result<Vec<String>, ProfileError> {
        let mut names: Vec<String> = self.load()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(store::read_json(&self.path)?.unwrap_or_default())
    }
}
