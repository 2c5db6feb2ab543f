//! Music that follows the listener's mood.
//!
//! Core modules:
//! - [`mood`] - Emotion coarsening and mood-change debouncing
//! - [`query`] - Search queries from a profile and a mood
//! - [`playback`] - The single-stream playback session
//! - [`history`] - Append-only playback log and mood tallies
//! - [`controller`] - Ties one user's mood, playback and history together
//! - [`sampling`] - Periodic background sampling of a frame source
//!
//! ### Supporting Modules
//!
//! - [`profile`] - Listener profiles in `users.json`
//! - [`external`] - Resolver, player and classifier adapters over external commands
//! - [`config`] - Configuration and data directory management
//! - [`store`] - Atomic JSON file persistence
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodtune::config::{self, RuntimeConfig};
//! use moodtune::controller::SessionController;
//! use moodtune::external::{CommandPlayer, CommandResolver, LineClassifier};
//! use moodtune::history::HistoryStore;
//! use moodtune::mood::EmotionSampler;
//! use moodtune::playback::PlaybackSession;
//! use moodtune::profile::ProfileStore;
//!
//! let data_dir = config::get_data_dir()?;
//! let config = RuntimeConfig::load(&data_dir, None)?;
//! let profile = ProfileStore::new(&config.users_path).get("meera")?;
//!
//! let session = PlaybackSession::new(
//!     Box::new(CommandResolver::new(config.resolver.clone())),
//!     Box::new(CommandPlayer::new(config.player.clone(), config.player_startup_grace())),
//! );
//! let controller = SessionController::new(
//!     profile,
//!     EmotionSampler::new(LineClassifier),
//!     session,
//!     HistoryStore::new(&config.history_path),
//! );
//!
//! controller.on_frame(&"sad 0.87".to_string());
//! let entry = controller.play()?;
//! println!("Playing {} for a {} mood", entry.source_url, entry.mood);
//! controller.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Mood Model
//!
//! Classifier verdicts are coarsened to three moods (happy, sad, stressed)
//! and debounced: only a change of mood is reported. A play request always
//! uses the latest stable mood, falling back to a configured default before
//! the first detection. At most one stream plays per session; each new play
//! releases the previous stream before resolving the next one.

pub mod cli;
pub mod completion;
pub mod config;
pub mod controller;
pub mod external;
pub mod history;
pub mod mood;
pub mod playback;
pub mod profile;
pub mod query;
pub mod sampling;
pub mod store;
