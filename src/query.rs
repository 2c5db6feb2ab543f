//! Search query construction from a profile and a mood.

use crate::mood::MoodLabel;
use crate::profile::Profile;
use std::fmt;

/// Keyword appended to every query unless configured otherwise.
pub const DEFAULT_KEYWORD: &str = "song";

/// Text handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackQuery {
    pub text: String,
}

impl fmt::Display for PlaybackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds `"{favorite_artist} {language} {mood} {keyword}"`.
///
/// Pure and deterministic: identical inputs always give an identical query.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    keyword: String,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD)
    }
}

impl QueryBuilder {
    #[must_use]
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    #[must_use]
    pub fn build(&self, profile: &Profile, mood: MoodLabel) -> PlaybackQuery {
        // Blank profile fields are dropped so the query never has double spaces.
        let text = [
            profile.favorite_artist.trim(),
            profile.language.trim(),
            mood.as_str(),
            self.keyword.trim(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

        PlaybackQuery { text }
    }
}
