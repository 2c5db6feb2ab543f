//! # Session Controller
//!
//! Ties one user's mood detection to their playback session and history.
//!
//! ```text
//! sampling tick ──► EmotionSampler ──► MoodDebouncer ──► current mood
//!                                                            │
//! play request ──► QueryBuilder(profile, mood) ──► PlaybackSession ──► HistoryStore
//! ```
//!
//! The controller is `Sync` and meant to be shared through an `Arc` between
//! a [`SamplingLoop`](crate::sampling::SamplingLoop) and whatever handles
//! user requests.

use crate::history::{HistoryEntry, HistoryStore, MoodTally};
use crate::mood::{Classifier, EmotionSampler, MoodChangeEvent, MoodDebouncer, MoodLabel};
use crate::playback::{NowPlaying, PlaybackError, PlaybackSession, SessionState};
use crate::profile::Profile;
use crate::query::QueryBuilder;
use crate::store::StoreError;
use log::{debug, error, info};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// Playback started but the history entry could not be written.
    #[error("playback started but was not recorded: {0}")]
    History(#[from] StoreError),
}

pub struct SessionController<C> {
    profile: Profile,
    sampler: EmotionSampler<C>,
    debouncer: Mutex<MoodDebouncer>,
    queries: QueryBuilder,
    default_mood: MoodLabel,
    session: PlaybackSession,
    history: HistoryStore,
}

impl<C: Classifier> SessionController<C> {
    pub fn new(
        profile: Profile,
        sampler: EmotionSampler<C>,
        session: PlaybackSession,
        history: HistoryStore,
    ) -> Self {
        Self {
            profile,
            sampler,
            debouncer: Mutex::new(MoodDebouncer::new()),
            queries: QueryBuilder::default(),
            default_mood: MoodLabel::Happy,
            session,
            history,
        }
    }

    /// Mood used by [`play`](Self::play) before any mood has been detected.
    #[must_use]
    pub fn with_default_mood(mut self, mood: MoodLabel) -> Self {
        self.default_mood = mood;
        self
    }

    #[must_use]
    pub fn with_query_builder(mut self, queries: QueryBuilder) -> Self {
        self.queries = queries;
        self
    }

    #[must_use]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Feeds one frame through the sampler and debouncer.
    ///
    /// Returns the change event when the stable mood moved. An unavailable
    /// classification leaves the current mood untouched.
    pub fn on_frame(&self, frame: &C::Frame) -> Option<MoodChangeEvent> {
        let mood = self.sampler.sample(frame)?;
        self.observe(mood)
    }

    /// Records a mood sample that did not come from the classifier.
    pub fn observe(&self, mood: MoodLabel) -> Option<MoodChangeEvent> {
        let event = self.debouncer().observe(mood)?;
        info!("Mood for {}: {event}", self.profile.name);
        Some(event)
    }

    /// Last stable mood, `None` until the first sample.
    #[must_use]
    pub fn current_mood(&self) -> Option<MoodLabel> {
        self.debouncer().current()
    }

    /// Plays music for the current mood and logs it.
    ///
    /// # Errors
    ///
    /// Playback errors leave nothing in the history. A history write failure
    /// is returned as [`ControllerError::History`] while the music keeps
    /// playing.
    pub fn play(&self) -> Result<HistoryEntry, ControllerError> {
        let mood = self.current_mood().unwrap_or_else(|| {
            debug!("No mood detected yet, using {}", self.default_mood);
            self.default_mood
        });
        self.play_as(mood)
    }

    /// Same as [`play`](Self::play) with an explicit mood.
    ///
    /// # Errors
    ///
    /// See [`play`](Self::play).
    pub fn play_as(&self, mood: MoodLabel) -> Result<HistoryEntry, ControllerError> {
        let query = self.queries.build(&self.profile, mood);
        let entry = self.session.play(&query, mood, &self.profile.name)?;

        if let Err(e) = self.history.append(&entry) {
            error!("Failed to record playback of `{}`: {e}", entry.query);
            return Err(e.into());
        }
        Ok(entry)
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    #[must_use]
    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.session.now_playing()
    }

    /// Mood statistics for this profile.
    ///
    /// # Errors
    ///
    /// [`StoreError::StoreCorrupt`] if the history log is unreadable.
    pub fn tally(&self) -> Result<MoodTally, StoreError> {
        self.history.tally(&self.profile.name)
    }

    /// This profile's playback history, oldest first.
    ///
    /// # Errors
    ///
    /// [`StoreError::StoreCorrupt`] if the history log is unreadable.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.history.entries_for(&self.profile.name)?.collect())
    }

    fn debouncer(&self) -> MutexGuard<'_, MoodDebouncer> {
        self.debouncer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
