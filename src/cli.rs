//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for moodtune using Clap
//! derive macros, plus the small line protocol spoken on stdin by an
//! interactive `session`.
//!
//! ## Commands
//!
//! - `profile add|show`: Register or inspect a listener profile
//! - `play`: Play one track for a mood, stop on Enter
//! - `session`: Headless session driven by detector output and stdin commands
//! - `history`: List a user's playback history
//! - `tally`: Mood statistics as a bar chart
//! - `completion`: Shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! moodtune profile add meera --language Hindi --artist "Shreya Ghoshal"
//! moodtune play --user meera --mood sad
//! detector | moodtune session --user meera --emotions /dev/stdin
//! moodtune tally --user meera
//! ```

use crate::mood::{MoodLabel, UnknownMood};
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Global options locate the data directory and the optional config file;
/// everything else lives on the subcommands.
#[derive(Parser, Debug)]
#[command(name = "moodtune")]
#[command(about = "moodtune: music that follows your mood")]
#[command(version)]
pub struct Args {
    /// Directory holding history.json, users.json and config.json
    ///
    /// Defaults to the platform data directory (e.g. ~/.local/share/moodtune).
    #[arg(long, global = true, env = "MOODTUNE_DATA_DIR", value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Config file to use instead of <data-dir>/config.json
    #[arg(long, global = true, env = "MOODTUNE_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage listener profiles
    ///
    /// A profile supplies the language and favorite artist that shape every
    /// search query made on the listener's behalf.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Play one track and stop when Enter is pressed
    ///
    /// Builds a query from the profile and the mood, resolves it to a stream
    /// and starts the player. The play is recorded in the history.
    Play {
        /// Profile to play for
        #[arg(short, long)]
        user: String,

        /// Mood to play for (defaults to the configured default mood)
        #[arg(short, long, value_parser = parse_mood)]
        mood: Option<MoodLabel>,
    },

    /// Run an interactive session
    ///
    /// Reads commands from stdin: play, stop, mood <label>, status, tally,
    /// quit. With --emotions, a background loop samples detector output lines
    /// of the form `<emotion> [confidence]` and tracks the listener's mood.
    Session {
        /// Profile to run the session for
        #[arg(short, long)]
        user: String,

        /// File or FIFO with one classifier verdict per line
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        emotions: Option<PathBuf>,

        /// Sampling period in milliseconds (overrides the config)
        #[arg(long)]
        period_ms: Option<u64>,
    },

    /// List a user's playback history, oldest first
    History {
        #[arg(short, long)]
        user: String,
    },

    /// Show how often each mood was played for a user
    Tally {
        #[arg(short, long)]
        user: String,
    },

    /// Generate shell completions
    ///
    /// Outputs shell completion script for the specified shell.
    /// Save the output to your shell's completion directory.
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List registered users for completion (hidden command)
    #[command(hide = true)]
    CompleteUsers,
}

/// Profile management actions
#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Register a new profile
    Add {
        /// Unique profile name
        name: String,

        /// Preferred song language, e.g. "Tamil"
        #[arg(short, long, default_value = "")]
        language: String,

        /// Favorite artist, e.g. "A. R. Rahman"
        #[arg(short, long, default_value = "")]
        artist: String,
    },

    /// Show a profile
    Show {
        name: String,
    },
}

fn parse_mood(s: &str) -> Result<MoodLabel, UnknownMood> {
    s.parse()
}

/// One line typed into an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Play,
    Stop,
    /// Manual mood sample, fed through the debouncer like a detector verdict.
    Mood(MoodLabel),
    Status,
    Tally,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try play, stop, mood <label>, status, tally, quit)")]
    Unknown(String),
    #[error("usage: mood <happy|sad|stressed>")]
    MissingMood,
    #[error(transparent)]
    Mood(#[from] UnknownMood),
}

impl FromStr for SessionCommand {
    type Err = SessionCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(SessionCommandError::Empty);
        };

        match verb.to_ascii_lowercase().as_str() {
            "play" | "p" => Ok(SessionCommand::Play),
            "stop" | "s" => Ok(SessionCommand::Stop),
            "mood" | "m" => {
                let label = words.next().ok_or(SessionCommandError::MissingMood)?;
                Ok(SessionCommand::Mood(label.parse()?))
            }
            "status" => Ok(SessionCommand::Status),
            "tally" => Ok(SessionCommand::Tally),
            "quit" | "exit" | "q" => Ok(SessionCommand::Quit),
            other => Err(SessionCommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Play => f.write_str("play"),
            SessionCommand::Stop => f.write_str("stop"),
            SessionCommand::Mood(mood) => write!(f, "mood {mood}"),
            SessionCommand::Status => f.write_str("status"),
            SessionCommand::Tally => f.write_str("tally"),
            SessionCommand::Quit => f.write_str("quit"),
        }
    }
}
