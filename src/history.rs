//! # History Module
//!
//! Append-only log of playback decisions and the per-user mood statistics
//! derived from it.
//!
//! ## File Format
//!
//! The log is a single JSON array, one object per playback:
//!
//! ```json
//! [
//!   {
//!     "user": "asha",
//!     "timestamp": "2026-10-19T21:04",
//!     "mood": "sad",
//!     "query": "Diljit Dosanjh Punjabi sad song",
//!     "source_url": "https://www.youtube.com/watch?v=...",
//!     "title": "..."
//!   }
//! ]
//! ```
//!
//! Older logs wrote the source under `url`; that name is still accepted on
//! read. Records are never modified: an append re-writes the array with every
//! existing record untouched (unknown fields included) plus the new one.

use crate::mood::MoodLabel;
use crate::store::{self, StoreError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Minute precision, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// One successful playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub timestamp: String,
    pub mood: MoodLabel,
    pub query: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl HistoryEntry {
    /// Builds an entry stamped with the current local time.
    #[must_use]
    pub fn now(
        user: impl Into<String>,
        mood: MoodLabel,
        query: impl Into<String>,
        source_url: impl Into<String>,
        title: Option<String>,
    ) -> Self {
        Self {
            user: user.into(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            mood,
            query: query.into(),
            source_url: source_url.into(),
            title,
        }
    }
}

/// A record as it sits on disk. The mood stays a string so labels this
/// version does not know about survive a read without failing it.
#[derive(Debug, Deserialize)]
struct StoredEntry {
    user: String,
    timestamp: String,
    mood: String,
    query: String,
    #[serde(alias = "url")]
    source_url: String,
    #[serde(default)]
    title: Option<String>,
}

impl StoredEntry {
    fn into_entry(self) -> Option<HistoryEntry> {
        let mood = match self.mood.parse::<MoodLabel>() {
            Ok(mood) => mood,
            Err(e) => {
                debug!("Skipping history record from {}: {e}", self.timestamp);
                return None;
            }
        };

        Some(HistoryEntry {
            user: self.user,
            timestamp: self.timestamp,
            mood,
            query: self.query,
            source_url: self.source_url,
            title: self.title,
        })
    }
}

/// Count of history entries per mood for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoodTally {
    happy: usize,
    sad: usize,
    stressed: usize,
}

impl MoodTally {
    #[must_use]
    pub fn get(&self, mood: MoodLabel) -> usize {
        match mood {
            MoodLabel::Happy => self.happy,
            MoodLabel::Sad => self.sad,
            MoodLabel::Stressed => self.stressed,
        }
    }

    pub fn record(&mut self, mood: MoodLabel) {
        match mood {
            MoodLabel::Happy => self.happy += 1,
            MoodLabel::Sad => self.sad += 1,
            MoodLabel::Stressed => self.stressed += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.happy + self.sad + self.stressed
    }

    /// `(mood, count)` for every label, zero counts included.
    pub fn iter(&self) -> impl Iterator<Item = (MoodLabel, usize)> + '_ {
        MoodLabel::ALL.into_iter().map(|mood| (mood, self.get(mood)))
    }

    /// Horizontal bar chart, one line per mood, scaled so the largest count
    /// spans `width` cells.
    #[must_use]
    pub fn render_bars(&self, width: usize) -> String {
        let max = self.iter().map(|(_, n)| n).max().unwrap_or(0);
        let mut out = String::new();
        for (mood, n) in self.iter() {
            let cells = if max == 0 { 0 } else { (n * width + max - 1) / max };
            out.push_str(&format!("{:<8} {:>4} {}\n", mood.as_str(), n, "#".repeat(cells)));
        }
        out
    }
}

impl FromIterator<MoodLabel> for MoodTally {
    fn from_iter<I: IntoIterator<Item = MoodLabel>>(iter: I) -> Self {
        let mut tally = MoodTally::default();
        for mood in iter {
            tally.record(mood);
        }
        tally
    }
}

impl fmt::Display for MoodTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(mood, n)| format!("{mood}: {n}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Append-only playback log backed by a JSON file.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry` after every existing record.
    ///
    /// # Errors
    ///
    /// Fails without touching the file if the existing log is corrupt, and
    /// fails if the new log cannot be written.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records = self.load_raw()?;
        // Validate before rewriting so a corrupt log is never clobbered.
        parse_records(&self.path, &records)?;

        records.push(serde_json::to_value(entry).map_err(StoreError::Serialize)?);
        store::write_json_atomic(&self.path, &records)?;

        info!(
            "Logged {} playback for {} ({} records)",
            entry.mood,
            entry.user,
            records.len()
        );
        Ok(())
    }

    /// Entries for `user` in insertion order.
    ///
    /// Every call re-reads the log, so the sequence can be restarted by
    /// calling again. Records with an unrecognised mood are skipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::StoreCorrupt`] if the log exists but cannot be parsed.
    /// A missing log is simply empty.
    pub fn entries_for<'a>(
        &self,
        user: &'a str,
    ) -> Result<impl Iterator<Item = HistoryEntry> + 'a, StoreError> {
        let records = parse_records(&self.path, &self.load_raw()?)?;
        Ok(records
            .into_iter()
            .filter(move |record| record.user == user)
            .filter_map(StoredEntry::into_entry))
    }

    /// Mood counts for `user`; other users' entries are excluded.
    ///
    /// # Errors
    ///
    /// Same as [`HistoryStore::entries_for`].
    pub fn tally(&self, user: &str) -> Result<MoodTally, StoreError> {
        Ok(self.entries_for(user)?.map(|entry| entry.mood).collect())
    }

    /// Distinct users present in the log, first appearance first.
    ///
    /// # Errors
    ///
    /// Same as [`HistoryStore::entries_for`].
    pub fn users(&self) -> Result<Vec<String>, StoreError> {
        let mut users: Vec<String> = Vec::new();
        for record in parse_records(&self.path, &self.load_raw()?)? {
            if !users.contains(&record.user) {
                users.push(record.user);
            }
        }
        Ok(users)
    }

    fn load_raw(&self) -> Result<Vec<Value>, StoreError> {
        let records: Option<Vec<Value>> = store::read_json(&self.path)?;
        if records.is_none() {
            debug!("No history at {} yet", self.path.display());
        }
        Ok(records.unwrap_or_default())
    }
}

fn parse_records(path: &Path, records: &[Value]) -> Result<Vec<StoredEntry>, StoreError> {
    records
        .iter()
        .map(|record| {
            StoredEntry::deserialize(record).map_err(|source| {
                warn!("Unreadable history record in {}: {source}", path.display());
                StoreError::StoreCorrupt {
                    path: path.to_path_buf(),
                    source,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(user: &str, mood: MoodLabel) -> HistoryEntry {
        HistoryEntry {
            user: user.to_string(),
            timestamp: "2026-10-19T21:04".to_string(),
            mood,
            query: format!("artist english {mood} song"),
            source_url: "https://example.org/watch?v=1".to_string(),
            title: None,
        }
    }

    fn store() -> (TempDir, HistoryStore) {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        (dir, store)
    }

    #[test]
    fn test_tally_counts_only_the_user() {
        let (_dir, store) = store();
        for mood in [
            MoodLabel::Happy,
            MoodLabel::Happy,
            MoodLabel::Sad,
            MoodLabel::Stressed,
            MoodLabel::Happy,
        ] {
            store.append(&entry("u", mood)).unwrap();
        }
        store.append(&entry("other", MoodLabel::Sad)).unwrap();

        let tally = store.tally("u").unwrap();
        assert_eq!(tally.get(MoodLabel::Happy), 3);
        assert_eq!(tally.get(MoodLabel::Sad), 1);
        assert_eq!(tally.get(MoodLabel::Stressed), 1);
        assert_eq!(tally.total(), 5);
    }

    #[test]
    fn test_render_bars_scales_to_largest() {
        let tally: MoodTally = [MoodLabel::Happy, MoodLabel::Happy, MoodLabel::Happy, MoodLabel::Sad]
            .into_iter()
            .collect();
        let chart = tally.render_bars(6);
        let lines: Vec<&str> = chart.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("happy"));
        assert!(lines[0].ends_with(" ######"));
        assert!(lines[1].ends_with(" ##"));
        assert!(lines[2].starts_with("stressed"));
        assert!(!lines[2].contains('#'));
        assert!(!MoodTally::default().render_bars(10).contains('#'));
    }

    #[test]
    fn test_missing_file_is_empty_not_error() {
        let (_dir, store) = store();
        assert_eq!(store.tally("u").unwrap(), MoodTally::default());
        assert_eq!(store.entries_for("u").unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let (_dir, store) = store();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.tally("u").unwrap_err().is_corrupt());
        assert!(store.entries_for("u").err().unwrap().is_corrupt());
    }

    #[test]
    fn test_zero_byte_log_is_corrupt() {
        let (_dir, store) = store();
        fs::write(store.path(), "").unwrap();

        assert!(store.tally("u").unwrap_err().is_corrupt());
        assert!(store.entries_for("u").err().unwrap().is_corrupt());
        assert!(store.append(&entry("u", MoodLabel::Sad)).unwrap_err().is_corrupt());
        assert_eq!(fs::read(store.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_append_refuses_to_overwrite_corrupt_log() {
        let (_dir, store) = store();
        fs::write(store.path(), "[{\"user\": 3}]").unwrap();

        let err = store.append(&entry("u", MoodLabel::Happy)).unwrap_err();
        assert!(err.is_corrupt());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[{\"user\": 3}]");
    }

    #[test]
    fn test_entries_keep_insertion_order_and_restart() {
        let (_dir, store) = store();
        store.append(&entry("u", MoodLabel::Sad)).unwrap();
        store.append(&entry("u", MoodLabel::Happy)).unwrap();

        let first: Vec<MoodLabel> = store.entries_for("u").unwrap().map(|e| e.mood).collect();
        let second: Vec<MoodLabel> = store.entries_for("u").unwrap().map(|e| e.mood).collect();
        assert_eq!(first, vec![MoodLabel::Sad, MoodLabel::Happy]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_legacy_records_and_unknown_moods() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            r#"[
              {"user": "u", "timestamp": "2025-01-01 10:00", "mood": "happy", "query": "q", "url": "https://a"},
              {"user": "u", "timestamp": "2025-01-01 10:05", "mood": "angry", "query": "q", "url": "https://b"}
            ]"#,
        )
        .unwrap();

        let entries: Vec<HistoryEntry> = store.entries_for("u").unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_url, "https://a");
        assert_eq!(store.tally("u").unwrap().total(), 1);

        // Appending keeps the unknown record verbatim.
        store.append(&entry("u", MoodLabel::Sad)).unwrap();
        let raw: Vec<Value> = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[1]["mood"], "angry");
        assert_eq!(raw[1]["url"], "https://b");
    }

    #[test]
    fn test_title_is_optional_on_disk() {
        let (_dir, store) = store();
        store.append(&entry("u", MoodLabel::Happy)).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("title"));
        assert!(raw.contains("source_url"));
    }

    #[test]
    fn test_users_are_distinct() {
        let (_dir, store) = store();
        store.append(&entry("b", MoodLabel::Happy)).unwrap();
        store.append(&entry("a", MoodLabel::Happy)).unwrap();
        store.append(&entry("b", MoodLabel::Sad)).unwrap();

        assert_eq!(store.users().unwrap(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_timestamp_has_minute_precision() {
        let entry = HistoryEntry::now("u", MoodLabel::Happy, "q", "https://a", None);
        assert!(chrono::NaiveDateTime::parse_from_str(&entry.timestamp, TIMESTAMP_FORMAT).is_ok());
        assert_eq!(entry.timestamp.len(), "2026-10-19T21:04".len());
    }
}
