//! # moodtune
//!
//! Plays music that matches the listener's mood. Moods come from an external
//! facial-emotion detector (or are given by hand), and every successful play
//! is logged so the listener can see which moods dominate their listening.
//!
//! ## Usage
//!
//! ```bash
//! # Register a listener
//! moodtune profile add meera --language Hindi --artist "Shreya Ghoshal"
//!
//! # One track for a given mood
//! moodtune play --user meera --mood sad
//!
//! # Follow a detector that prints one "<emotion> <confidence>" line per frame
//! mkfifo /tmp/emotions
//! detector > /tmp/emotions &
//! moodtune session --user meera --emotions /tmp/emotions
//!
//! # Statistics
//! moodtune tally --user meera
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info, warn};
use moodtune::cli::{self, SessionCommand};
use moodtune::completion;
use moodtune::config::{self, RuntimeConfig};
use moodtune::controller::{ControllerError, SessionController};
use moodtune::external::{CommandPlayer, CommandResolver, LineClassifier, LineFrameSource};
use moodtune::history::{HistoryEntry, HistoryStore};
use moodtune::mood::{EmotionSampler, MoodLabel};
use moodtune::playback::{PlaybackError, PlaybackSession};
use moodtune::profile::{Profile, ProfileStore};
use moodtune::query::QueryBuilder;
use moodtune::sampling::SamplingLoop;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CHART_WIDTH: usize = 40;

type Controller = SessionController<LineClassifier>;

/// Main entry point for moodtune.
///
/// Initializes logging, parses command-line arguments, loads the runtime
/// configuration and routes commands.
///
/// # Logging
///
/// Controlled via `RUST_LOG`:
/// - `RUST_LOG=debug moodtune play -u meera` - Enable debug logging
/// - `RUST_LOG=moodtune::playback=trace moodtune session -u meera` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    let data_dir = config::resolve_data_dir(args.data_dir.as_deref())?;
    let config = RuntimeConfig::load(&data_dir, args.config.as_deref())?;
    debug!("Using data directory {}", data_dir.display());
    let profiles = ProfileStore::new(&config.users_path);

    match args.command {
        cli::Command::Profile { action } => match action {
            cli::ProfileAction::Add { name, language, artist } => {
                let profile = Profile {
                    name,
                    language,
                    favorite_artist: artist,
                };
                profiles.register(&profile)?;
                println!("Registered {}", profile.name);
            }
            cli::ProfileAction::Show { name } => {
                let profile = profiles.get(&name)?;
                println!("Name:            {}", profile.name);
                println!("Language:        {}", profile.language);
                println!("Favorite artist: {}", profile.favorite_artist);
            }
        },
        cli::Command::Play { user, mood } => {
            let controller = build_controller(&config, profiles.get(&user)?);
            info!("One-shot play for {user}");
            play_once(&controller, mood)?;
        }
        cli::Command::Session { user, emotions, period_ms } => {
            let controller = Arc::new(build_controller(&config, profiles.get(&user)?));
            let period = period_ms.map_or_else(|| config.sample_period(), |ms| Duration::from_millis(ms.max(1)));
            run_session(&controller, emotions.as_deref(), period)?;
        }
        cli::Command::History { user } => {
            let history = HistoryStore::new(&config.history_path);
            let mut shown = 0;
            for entry in history.entries_for(&user)? {
                print_entry(&entry);
                shown += 1;
            }
            if shown == 0 {
                println!("No history for {user}");
            }
        }
        cli::Command::Tally { user } => {
            let tally = HistoryStore::new(&config.history_path).tally(&user)?;
            println!("Moods played for {user} ({} total)", tally.total());
            print!("{}", tally.render_bars(CHART_WIDTH));
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
        cli::Command::CompleteUsers => {
            completion::print_user_completions(&profiles)?;
        }
    }

    Ok(())
}

fn build_controller(config: &RuntimeConfig, profile: Profile) -> Controller {
    let session = PlaybackSession::new(
        Box::new(CommandResolver::new(config.resolver.clone())),
        Box::new(CommandPlayer::new(config.player.clone(), config.player_startup_grace())),
    )
    .with_fallback(config.fallback.clone());

    SessionController::new(
        profile,
        EmotionSampler::new(LineClassifier).with_min_confidence(config.min_confidence),
        session,
        HistoryStore::new(&config.history_path),
    )
    .with_default_mood(config.default_mood)
    .with_query_builder(QueryBuilder::new(config.query_keyword.clone()))
}

/// Plays one track and blocks until Enter (or end of input).
fn play_once(controller: &Controller, mood: Option<MoodLabel>) -> Result<()> {
    let result = match mood {
        Some(mood) => controller.play_as(mood),
        None => controller.play(),
    };

    match result {
        Ok(entry) => print_now_playing(&entry),
        // The stream is running even though the log write failed.
        Err(ControllerError::History(e)) => warn!("Playing, but not recorded in history: {e}"),
        Err(e) => return Err(e.into()),
    }

    println!("Press Enter to stop");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    controller.stop();
    Ok(())
}

fn run_session(controller: &Arc<Controller>, emotions: Option<&Path>, period: Duration) -> Result<()> {
    let sampling = match emotions {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open emotion source {}", path.display()))?;
            let source = LineFrameSource::spawn(BufReader::new(file))?;
            let sampling = SamplingLoop::spawn(Arc::clone(controller), source, period, |event| {
                println!("mood: {event}");
            })?;
            Some(sampling)
        }
        None => None,
    };

    println!(
        "Session for {}. Commands: play, stop, mood <label>, status, tally, quit",
        controller.profile().name
    );

    let mut plays = Vec::new();
    let result = read_commands(controller, &mut plays);

    if let Some(sampling) = sampling {
        sampling.stop();
    }
    controller.stop();
    // Cancelled requests release whatever they started before returning.
    for play in plays {
        if play.join().is_err() {
            warn!("Play request thread panicked");
        }
    }
    // A request that had not reached the session before the stop may have started.
    controller.stop();
    info!("Session for {} ended", controller.profile().name);
    result
}

/// Runs stdin commands until `quit` or end of input.
fn read_commands(controller: &Arc<Controller>, plays: &mut Vec<JoinHandle<()>>) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        debug!("Session command: {command}");

        match command {
            SessionCommand::Play => {
                // Played off the input thread so `stop` can cancel a slow resolve.
                plays.retain(|play| !play.is_finished());
                let controller = Arc::clone(controller);
                let play = thread::Builder::new()
                    .name("play-request".to_string())
                    .spawn(move || report_play(controller.play()))
                    .context("Failed to spawn play request")?;
                plays.push(play);
            }
            SessionCommand::Stop => controller.stop(),
            SessionCommand::Mood(mood) => match controller.observe(mood) {
                Some(event) => println!("mood: {event}"),
                None => println!("mood unchanged ({mood})"),
            },
            SessionCommand::Status => print_status(controller),
            SessionCommand::Tally => match controller.tally() {
                Ok(tally) => print!("{}", tally.render_bars(CHART_WIDTH)),
                Err(e) => println!("{e}"),
            },
            SessionCommand::Quit => break,
        }
    }
    Ok(())
}

fn report_play(result: Result<HistoryEntry, ControllerError>) {
    match result {
        Ok(entry) => print_now_playing(&entry),
        Err(ControllerError::Playback(PlaybackError::Cancelled)) => println!("play cancelled"),
        Err(ControllerError::Playback(PlaybackError::SessionBusy)) => {
            println!("still starting the previous track, try again");
        }
        Err(e) => println!("{e}"),
    }
}

fn print_status(controller: &Controller) {
    let mood = controller
        .current_mood()
        .map_or_else(|| "not detected yet".to_string(), |m| m.to_string());
    println!("mood:  {mood}");
    println!("state: {}", controller.state());
    if let Some(now) = controller.now_playing() {
        println!("track: {} ({})", now.title, now.canonical_url);
    }
}

fn print_now_playing(entry: &HistoryEntry) {
    let title = entry.title.as_deref().unwrap_or(&entry.query);
    println!("Now playing ({}): {title}", entry.mood);
    println!("  {}", entry.source_url);
}

fn print_entry(entry: &HistoryEntry) {
    let title = entry.title.as_deref().unwrap_or(&entry.query);
    println!("{}  {:<8}  {title}  {}", entry.timestamp, entry.mood, entry.source_url);
}
