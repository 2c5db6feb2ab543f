//! # Playback Session
//!
//! Owns at most one live audio stream and moves it through
//!
//! ```text
//! Idle → Resolving → Starting → Playing → Idle
//! ```
//!
//! ## Rules
//!
//! - A new `play()` releases the current stream before anything else, so two
//!   streams are never alive under one session. If the current stream will
//!   not stop, the new `play()` fails with [`PlaybackError::ReleaseFailed`]
//!   and the old stream stays in the session.
//! - Only one `play()` may be in flight; a concurrent one gets
//!   [`PlaybackError::SessionBusy`].
//! - `stop()` never waits on a resolve or start and never fails. While a `play()` is still resolving
//!   or starting, `stop()` cancels it: nothing starts, or whatever started is
//!   released before another `play()` is accepted.
//! - The resolver and player run without the session lock held.
//!
//! A resolution failure falls back to the [`FallbackCatalog`] entry for the
//! mood when one is configured, and is surfaced as
//! [`PlaybackError::ResolutionFailed`] otherwise.

use crate::history::HistoryEntry;
use crate::mood::MoodLabel;
use crate::query::PlaybackQuery;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Audio that is currently playing. Dropping the session stops it.
pub trait StreamHandle: Send {
    /// Releases the stream. Must be safe to call on a stream that already ended.
    fn stop(&mut self) -> anyhow::Result<()>;
}

/// Turns a search query into something playable.
pub trait Resolver: Send + Sync {
    /// Any error means "not found".
    fn resolve(&self, query: &PlaybackQuery) -> anyhow::Result<ResolvedStream>;
}

/// Audio output.
pub trait Player: Send + Sync {
    fn start(&self, stream_url: &str) -> anyhow::Result<Box<dyn StreamHandle>>;
}

/// Resolver result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Direct media URL handed to the player.
    pub stream_url: String,
    pub title: String,
    /// Stable page URL recorded in the history.
    pub canonical_url: String,
}

/// A known-good stream played when resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackStream {
    pub title: String,
    pub url: String,
}

/// Curated streams per mood, used only when the resolver finds nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackCatalog {
    streams: HashMap<MoodLabel, Vec<FallbackStream>>,
}

impl FallbackCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mood: MoodLabel, stream: FallbackStream) {
        self.streams.entry(mood).or_default().push(stream);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.values().all(Vec::is_empty)
    }

    /// A random catalog entry for `mood`, if any.
    #[must_use]
    pub fn pick(&self, mood: MoodLabel) -> Option<ResolvedStream> {
        let stream = self.streams.get(&mood)?.choose(&mut rand::thread_rng())?;
        Some(ResolvedStream {
            stream_url: stream.url.clone(),
            title: stream.title.clone(),
            canonical_url: stream.url.clone(),
        })
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no stream found for `{query}`: {source:#}")]
    ResolutionFailed {
        query: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to start {url}: {source:#}")]
    StartFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("another play request is already in progress")]
    SessionBusy,

    #[error("playback was stopped before it started")]
    Cancelled,

    /// The current stream refused to stop, so nothing new was started.
    #[error("could not stop \"{title}\": {source:#}")]
    ReleaseFailed {
        title: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Starting,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::Starting => "starting",
            SessionState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// What the session is playing, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub query: String,
    pub mood: MoodLabel,
    pub canonical_url: String,
}

enum Slot {
    Idle,
    /// A `play()` is between resolve and start. `generation` identifies it so
    /// a cancelled call can tell it lost the slot.
    Pending { generation: u64, state: SessionState },
    /// `stop()` arrived while the player was starting. The stream it may have
    /// started is released before the slot goes idle, so no new `play()` can
    /// overlap it.
    Cancelling { generation: u64 },
    Playing {
        handle: Box<dyn StreamHandle>,
        now_playing: NowPlaying,
    },
}

struct Inner {
    slot: Slot,
    generation: u64,
}

impl Inner {
    fn owns(&self, generation: u64) -> bool {
        matches!(self.slot, Slot::Pending { generation: g, .. } if g == generation)
    }

    fn in_flight(&self) -> bool {
        matches!(self.slot, Slot::Pending { .. } | Slot::Cancelling { .. })
    }
}

/// Single-stream playback state machine.
pub struct PlaybackSession {
    resolver: Box<dyn Resolver>,
    player: Box<dyn Player>,
    fallback: FallbackCatalog,
    inner: Mutex<Inner>,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("state", &self.state())
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    pub fn new(resolver: Box<dyn Resolver>, player: Box<dyn Player>) -> Self {
        Self {
            resolver,
            player,
            fallback: FallbackCatalog::default(),
            inner: Mutex::new(Inner {
                slot: Slot::Idle,
                generation: 0,
            }),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackCatalog) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.lock().slot {
            Slot::Idle | Slot::Cancelling { .. } => SessionState::Idle,
            Slot::Pending { state, .. } => *state,
            Slot::Playing { .. } => SessionState::Playing,
        }
    }

    #[must_use]
    pub fn now_playing(&self) -> Option<NowPlaying> {
        match &self.lock().slot {
            Slot::Playing { now_playing, .. } => Some(now_playing.clone()),
            _ => None,
        }
    }

    /// Replaces whatever is playing with the best match for `query`.
    ///
    /// Returns the history entry describing the new playback; persisting it
    /// is the caller's job.
    ///
    /// # Errors
    ///
    /// See [`PlaybackError`]. [`PlaybackError::SessionBusy`] leaves the
    /// in-flight request untouched and [`PlaybackError::ReleaseFailed`] leaves
    /// the previous stream playing; any other error leaves the session idle
    /// with the previous stream already released.
    pub fn play(
        &self,
        query: &PlaybackQuery,
        mood: MoodLabel,
        user: &str,
    ) -> Result<HistoryEntry, PlaybackError> {
        let (generation, previous) = {
            let mut inner = self.lock();
            if inner.in_flight() {
                return Err(PlaybackError::SessionBusy);
            }
            inner.generation += 1;
            let generation = inner.generation;
            let previous = std::mem::replace(
                &mut inner.slot,
                Slot::Pending {
                    generation,
                    state: SessionState::Resolving,
                },
            );
            (generation, previous)
        };

        if let Slot::Playing { mut handle, now_playing } = previous {
            info!("Replacing \"{}\"", now_playing.title);
            if let Err(source) = handle.stop() {
                warn!("\"{}\" did not stop, not starting another stream: {source:#}", now_playing.title);
                let title = now_playing.title.clone();
                let mut inner = self.lock();
                if inner.owns(generation) {
                    // Kept so a later stop() or drop can retry.
                    inner.slot = Slot::Playing { handle, now_playing };
                }
                return Err(PlaybackError::ReleaseFailed { title, source });
            }
        }

        debug!("Resolving `{query}`");
        let resolved = match self.resolver.resolve(query) {
            Ok(resolved) => resolved,
            Err(source) => match self.fallback.pick(mood) {
                Some(fallback) => {
                    warn!("No stream for `{query}` ({source:#}), using fallback \"{}\"", fallback.title);
                    fallback
                }
                None => {
                    self.abandon(generation);
                    warn!("No stream for `{query}`: {source:#}");
                    return Err(PlaybackError::ResolutionFailed {
                        query: query.text.clone(),
                        source,
                    });
                }
            },
        };

        {
            let mut inner = self.lock();
            if !inner.owns(generation) {
                info!("Stop requested while resolving `{query}`, not starting");
                return Err(PlaybackError::Cancelled);
            }
            inner.slot = Slot::Pending {
                generation,
                state: SessionState::Starting,
            };
        }

        debug!("Starting {}", resolved.stream_url);
        let handle = match self.player.start(&resolved.stream_url) {
            Ok(handle) => handle,
            Err(source) => {
                self.abandon(generation);
                warn!("Player failed on {}: {source:#}", resolved.stream_url);
                return Err(PlaybackError::StartFailed {
                    url: resolved.stream_url,
                    source,
                });
            }
        };

        let now_playing = NowPlaying {
            title: resolved.title.clone(),
            query: query.text.clone(),
            mood,
            canonical_url: resolved.canonical_url.clone(),
        };

        {
            let mut inner = self.lock();
            if inner.owns(generation) {
                inner.slot = Slot::Playing { handle, now_playing };
                info!("Now playing \"{}\" ({mood})", resolved.title);
                return Ok(HistoryEntry::now(
                    user,
                    mood,
                    query.text.clone(),
                    resolved.canonical_url,
                    Some(resolved.title),
                ));
            }
        }

        info!("Stop requested while starting \"{}\", releasing it", resolved.title);
        release(handle);
        self.abandon(generation);
        Err(PlaybackError::Cancelled)
    }

    /// Stops playback or cancels an in-flight `play()`. No-op when idle.
    pub fn stop(&self) {
        let mut inner = self.lock();
        let next = match inner.slot {
            Slot::Pending {
                generation,
                state: SessionState::Starting,
            } => Slot::Cancelling { generation },
            Slot::Cancelling { generation } => Slot::Cancelling { generation },
            _ => Slot::Idle,
        };
        match std::mem::replace(&mut inner.slot, next) {
            Slot::Idle => debug!("Stop on idle session"),
            Slot::Cancelling { .. } => debug!("Stop already pending"),
            Slot::Pending { state, .. } => info!("Cancelling playback while {state}"),
            // Released under the lock so a new play() cannot start alongside it.
            Slot::Playing { handle, now_playing } => {
                info!("Stopping \"{}\"", now_playing.title);
                release(handle);
            }
        }
    }

    /// Returns to idle if `generation` still holds the slot.
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        let held = match inner.slot {
            Slot::Pending { generation: g, .. } | Slot::Cancelling { generation: g } => g == generation,
            _ => false,
        };
        if held {
            inner.slot = Slot::Idle;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Playing { handle, .. } = std::mem::replace(&mut inner.slot, Slot::Idle) {
            release(handle);
        }
    }
}

fn release(mut handle: Box<dyn StreamHandle>) {
    if let Err(e) = handle.stop() {
        warn!("Stream did not stop cleanly: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;

    #[derive(Default)]
    struct Counters {
        resolves: AtomicUsize,
        starts: AtomicUsize,
        live: AtomicUsize,
        max_live: AtomicUsize,
    }

    struct Handle(Arc<Counters>, bool);

    impl StreamHandle for Handle {
        fn stop(&mut self) -> anyhow::Result<()> {
            if !self.1 {
                self.1 = true;
                self.0.live.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    struct FakeResolver {
        counters: Arc<Counters>,
        found: bool,
    }

    impl Resolver for FakeResolver {
        fn resolve(&self, query: &PlaybackQuery) -> anyhow::Result<ResolvedStream> {
            self.counters.resolves.fetch_add(1, Ordering::SeqCst);
            if !self.found {
                return Err(anyhow!("nothing matched"));
            }
            Ok(ResolvedStream {
                stream_url: format!("https://media.test/{}", query.text.replace(' ', "+")),
                title: format!("Best of {}", query.text),
                canonical_url: "https://video.test/watch?v=1".to_string(),
            })
        }
    }

    struct FakePlayer {
        counters: Arc<Counters>,
        works: bool,
    }

    impl Player for FakePlayer {
        fn start(&self, _stream_url: &str) -> anyhow::Result<Box<dyn StreamHandle>> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if !self.works {
                return Err(anyhow!("no audio device"));
            }
            let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_live.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(Handle(Arc::clone(&self.counters), false)))
        }
    }

    struct ToggleResolver {
        found: Arc<AtomicBool>,
    }

    impl Resolver for ToggleResolver {
        fn resolve(&self, query: &PlaybackQuery) -> anyhow::Result<ResolvedStream> {
            if !self.found.load(Ordering::SeqCst) {
                return Err(anyhow!("nothing matched"));
            }
            Ok(ResolvedStream {
                stream_url: "https://media.test/a".to_string(),
                title: query.text.clone(),
                canonical_url: "https://video.test/a".to_string(),
            })
        }
    }

    /// Blocks inside `resolve` until the test lets it go.
    struct GatedResolver {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        inner: FakeResolver,
    }

    impl Resolver for GatedResolver {
        fn resolve(&self, query: &PlaybackQuery) -> anyhow::Result<ResolvedStream> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            self.inner.resolve(query)
        }
    }

    /// Blocks inside `start` until the test lets it go.
    struct GatedPlayer {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        inner: FakePlayer,
    }

    impl Player for GatedPlayer {
        fn start(&self, stream_url: &str) -> anyhow::Result<Box<dyn StreamHandle>> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            self.inner.start(stream_url)
        }
    }

    fn session(found: bool, works: bool) -> (Arc<Counters>, PlaybackSession) {
        let counters = Arc::new(Counters::default());
        let session = PlaybackSession::new(
            Box::new(FakeResolver { counters: Arc::clone(&counters), found }),
            Box::new(FakePlayer { counters: Arc::clone(&counters), works }),
        );
        (counters, session)
    }

    fn gated_session() -> (Arc<Counters>, Arc<PlaybackSession>, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let counters = Arc::new(Counters::default());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let session = PlaybackSession::new(
            Box::new(GatedResolver {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
                inner: FakeResolver { counters: Arc::clone(&counters), found: true },
            }),
            Box::new(FakePlayer { counters: Arc::clone(&counters), works: true }),
        );
        (counters, Arc::new(session), entered_rx, release_tx)
    }

    fn query(text: &str) -> PlaybackQuery {
        PlaybackQuery { text: text.to_string() }
    }

    #[test]
    fn test_play_returns_history_entry() {
        let (counters, session) = session(true, true);

        let entry = session.play(&query("artist english sad song"), MoodLabel::Sad, "u").unwrap();

        assert_eq!(entry.user, "u");
        assert_eq!(entry.mood, MoodLabel::Sad);
        assert_eq!(entry.query, "artist english sad song");
        assert_eq!(entry.source_url, "https://video.test/watch?v=1");
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(counters.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

        let now = session.now_playing().unwrap();
        assert_eq!(now.title, "Best of artist english sad song");
    }

    #[test]
    fn test_at_most_one_stream_across_replays() {
        let (counters, session) = session(true, true);

        for i in 0..5 {
            session.play(&query(&format!("q{i}")), MoodLabel::Happy, "u").unwrap();
            assert_eq!(counters.live.load(Ordering::SeqCst), 1);
        }
        session.stop();
        session.play(&query("again"), MoodLabel::Happy, "u").unwrap();

        assert_eq!(counters.max_live.load(Ordering::SeqCst), 1);
        session.stop();
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolution_failure_without_fallback() {
        let (counters, session) = session(false, true);

        let err = session.play(&query("obscure"), MoodLabel::Sad, "u").unwrap_err();

        assert!(matches!(err, PlaybackError::ResolutionFailed { ref query, .. } if query == "obscure"));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_resolution_failure_uses_fallback_for_mood() {
        let (counters, session) = session(false, true);
        let mut catalog = FallbackCatalog::new();
        catalog.add(
            MoodLabel::Sad,
            FallbackStream {
                title: "Rainy day".to_string(),
                url: "https://fallback.test/rainy".to_string(),
            },
        );
        let session = session.with_fallback(catalog);

        let entry = session.play(&query("obscure"), MoodLabel::Sad, "u").unwrap();
        assert_eq!(entry.source_url, "https://fallback.test/rainy");
        assert_eq!(entry.title.as_deref(), Some("Rainy day"));

        // No entry for this mood: the failure is surfaced.
        let err = session.play(&query("obscure"), MoodLabel::Happy, "u").unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailed { .. }));
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_failure_leaves_session_idle() {
        let (counters, session) = session(true, false);

        let err = session.play(&query("q"), MoodLabel::Happy, "u").unwrap_err();

        assert!(matches!(err, PlaybackError::StartFailed { .. }));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.now_playing().is_none());
        assert_eq!(counters.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_replay_still_releases_previous_stream() {
        let counters = Arc::new(Counters::default());
        let found = Arc::new(AtomicBool::new(true));
        let session = PlaybackSession::new(
            Box::new(ToggleResolver { found: Arc::clone(&found) }),
            Box::new(FakePlayer { counters: Arc::clone(&counters), works: true }),
        );
        session.play(&query("first"), MoodLabel::Happy, "u").unwrap();
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);

        found.store(false, Ordering::SeqCst);
        assert!(session.play(&query("second"), MoodLabel::Happy, "u").is_err());

        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.now_playing().is_none());
    }

    /// Stream whose first `stop()` fails.
    struct StubbornHandle {
        attempts: Arc<AtomicUsize>,
    }

    impl StreamHandle for StubbornHandle {
        fn stop(&mut self) -> anyhow::Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(anyhow!("kill refused"));
            }
            Ok(())
        }
    }

    struct StubbornPlayer {
        attempts: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
    }

    impl Player for StubbornPlayer {
        fn start(&self, _stream_url: &str) -> anyhow::Result<Box<dyn StreamHandle>> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubbornHandle { attempts: Arc::clone(&self.attempts) }))
        }
    }

    #[test]
    fn test_replay_fails_when_current_stream_will_not_stop() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(AtomicUsize::new(0));
        let session = PlaybackSession::new(
            Box::new(FakeResolver { counters: Arc::new(Counters::default()), found: true }),
            Box::new(StubbornPlayer { attempts: Arc::clone(&attempts), starts: Arc::clone(&starts) }),
        );

        session.play(&query("first"), MoodLabel::Happy, "u").unwrap();
        let err = session.play(&query("second"), MoodLabel::Sad, "u").unwrap_err();

        assert!(matches!(err, PlaybackError::ReleaseFailed { ref title, .. } if title == "Best of first"));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(session.now_playing().unwrap().title, "Best of first");

        // The kept stream stops on the next attempt and the replay goes through.
        session.play(&query("third"), MoodLabel::Sad, "u").unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(session.now_playing().unwrap().title, "Best of third");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (counters, session) = session(true, true);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        session.play(&query("q"), MoodLabel::Happy, "u").unwrap();
        session.stop();
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_while_resolving_cancels_play() {
        let (counters, session, entered, release) = gated_session();

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.play(&query("slow"), MoodLabel::Sad, "u"))
        };

        entered.recv().unwrap();
        assert_eq!(session.state(), SessionState::Resolving);
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        release.send(()).unwrap();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(PlaybackError::Cancelled)));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_while_starting_releases_before_next_play() {
        let counters = Arc::new(Counters::default());
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        let session = Arc::new(PlaybackSession::new(
            Box::new(FakeResolver { counters: Arc::clone(&counters), found: true }),
            Box::new(GatedPlayer {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
                inner: FakePlayer { counters: Arc::clone(&counters), works: true },
            }),
        ));

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.play(&query("slow start"), MoodLabel::Happy, "u"))
        };

        entered.recv().unwrap();
        assert_eq!(session.state(), SessionState::Starting);
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);

        // The cancelled start has not been unwound yet.
        let early = session.play(&query("next"), MoodLabel::Happy, "u");
        assert!(matches!(early, Err(PlaybackError::SessionBusy)));

        release.send(()).unwrap();
        assert!(matches!(worker.join().unwrap(), Err(PlaybackError::Cancelled)));
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        session.play(&query("next"), MoodLabel::Happy, "u").unwrap();
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
        assert_eq!(counters.max_live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_play_is_rejected() {
        let (counters, session, entered, release) = gated_session();

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.play(&query("first"), MoodLabel::Happy, "u"))
        };

        entered.recv().unwrap();
        let busy = session.play(&query("second"), MoodLabel::Happy, "u");
        assert!(matches!(busy, Err(PlaybackError::SessionBusy)));

        release.send(()).unwrap();
        assert!(worker.join().unwrap().is_ok());
        assert_eq!(counters.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_session_releases_stream() {
        let (counters, session) = session(true, true);
        session.play(&query("q"), MoodLabel::Happy, "u").unwrap();
        drop(session);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_catalog_deserializes_by_mood() {
        let catalog: FallbackCatalog = serde_json::from_str(
            r#"{"stressed": [{"title": "Calm", "url": "https://fallback.test/calm"}]}"#,
        )
        .unwrap();

        assert!(!catalog.is_empty());
        assert!(catalog.pick(MoodLabel::Happy).is_none());
        assert_eq!(catalog.pick(MoodLabel::Stressed).unwrap().title, "Calm");
    }
}
