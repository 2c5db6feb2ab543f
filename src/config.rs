//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! moodtune. It provides platform-appropriate data storage locations and
//! ensures necessary directories exist.
//!
//! ## Data Storage
//!
//! moodtune keeps its files in the platform-standard data directory:
//! - Linux: `~/.local/share/moodtune/`
//! - macOS: `~/Library/Application Support/moodtune/`
//! - Windows: `%APPDATA%\moodtune\`
//!
//! | file           | contents                                  |
//! |----------------|-------------------------------------------|
//! | `history.json` | playback history (append-only)            |
//! | `users.json`   | user profiles                             |
//! | `config.json`  | optional [`RuntimeConfig`] overrides      |
//!
//! ## Config File
//!
//! Every field of `config.json` is optional:
//!
//! ```json
//! {
//!   "sample_period_ms": 500,
//!   "min_confidence": 0.4,
//!   "default_mood": "happy",
//!   "player": { "program": "vlc", "args": ["--intf", "dummy", "{url}"] },
//!   "fallback": {
//!     "sad": [{ "title": "Rainy day", "url": "https://example.org/rainy.mp3" }]
//!   }
//! }
//! ```

use crate::external::CommandSpec;
use crate::mood::MoodLabel;
use crate::playback::FallbackCatalog;
use crate::query::DEFAULT_KEYWORD;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HISTORY_FILE: &str = "history.json";
pub const USERS_FILE: &str = "users.json";
pub const CONFIG_FILE: &str = "config.json";

/// Returns the platform-appropriate data directory for moodtune, creating it
/// if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The moodtune subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please pass --data-dir or set MOODTUNE_DATA_DIR."
        )
    })?;

    let moodtune_dir = data_dir.join("moodtune");
    ensure_dir(&moodtune_dir)?;
    Ok(moodtune_dir)
}

/// Uses `dir` when given, the platform default otherwise.
///
/// # Errors
///
/// See [`get_data_dir`].
pub fn resolve_data_dir(dir: Option<&Path>) -> Result<PathBuf> {
    match dir {
        Some(dir) => {
            ensure_dir(dir)?;
            Ok(dir.to_path_buf())
        }
        None => get_data_dir(),
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| {
        format!(
            "Failed to create moodtune data directory at {}. Please check file permissions.",
            dir.display()
        )
    })
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Relative paths are taken relative to the data directory.
    pub history_path: PathBuf,
    pub users_path: PathBuf,
    /// How often the emotion signal is sampled.
    pub sample_period_ms: u64,
    /// Classifications below this confidence are ignored.
    pub min_confidence: f32,
    /// Mood used for a play request before any mood was detected.
    pub default_mood: MoodLabel,
    pub query_keyword: String,
    pub resolver: CommandSpec,
    pub player: CommandSpec,
    /// How long a new player process is watched for an immediate failure.
    pub player_startup_grace_ms: u64,
    pub fallback: FallbackCatalog,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from(HISTORY_FILE),
            users_path: PathBuf::from(USERS_FILE),
            sample_period_ms: 300,
            min_confidence: 0.0,
            default_mood: MoodLabel::Happy,
            query_keyword: DEFAULT_KEYWORD.to_string(),
            resolver: CommandSpec::default_resolver(),
            player: CommandSpec::default_player(),
            player_startup_grace_ms: 250,
            fallback: FallbackCatalog::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads `config_path` (default: `<data_dir>/config.json`) and anchors
    /// relative paths in `data_dir`. A missing config file means defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load(data_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let path = config_path.map_or_else(|| data_dir.join(CONFIG_FILE), Path::to_path_buf);

        let config = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => RuntimeConfig::default(),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                RuntimeConfig::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(config.with_data_dir(data_dir))
    }

    /// Anchors relative paths in `data_dir`.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.history_path = anchor(data_dir, &self.history_path, HISTORY_FILE);
        self.users_path = anchor(data_dir, &self.users_path, USERS_FILE);
        self
    }

    #[must_use]
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms.max(1))
    }

    #[must_use]
    pub fn player_startup_grace(&self) -> Duration {
        Duration::from_millis(self.player_startup_grace_ms)
    }
}

fn anchor(data_dir: &Path, path: &Path, default_name: &str) -> PathBuf {
    if path.as_os_str().is_empty() {
        data_dir.join(default_name)
    } else if path.is_relative() {
        data_dir.join(path)
    } else {
        path.to_path_buf()
    }
}
