//! # Shell Completion Module
//!
//! Completion scripts for the supported shells, plus the hidden
//! `complete-users` listing that scripts can call for `--user` values.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! moodtune completion bash > ~/.local/share/bash-completion/completions/moodtune
//!
//! # Generate zsh completions
//! moodtune completion zsh > ~/.config/zsh/completions/_moodtune
//! ```

use crate::profile::ProfileStore;
use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use log::debug;
use std::io::{self, Write};

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert CLI shell enum to `clap_complete` shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Registered user names, sorted. An unreadable profile file yields nothing
/// rather than breaking the caller's shell.
#[must_use]
pub fn get_user_completions(profiles: &ProfileStore) -> Vec<String> {
    match profiles.names() {
        Ok(names) => names,
        Err(e) => {
            debug!("No user completions: {e}");
            Vec::new()
        }
    }
}

/// Print one user name per line, quoting names that contain whitespace.
///
/// # Errors
///
/// Fails only if writing to `out` fails.
pub fn write_user_completions(profiles: &ProfileStore, out: &mut impl Write) -> Result<()> {
    for name in get_user_completions(profiles) {
        if name.chars().any(char::is_whitespace) {
            writeln!(out, "\"{}\"", name.replace('"', "\\\""))?;
        } else {
            writeln!(out, "{name}")?;
        }
    }
    Ok(())
}

/// [`write_user_completions`] to stdout.
///
/// # Errors
///
/// Fails only if stdout is closed.
pub fn print_user_completions(profiles: &ProfileStore) -> Result<()> {
    write_user_completions(profiles, &mut io::stdout().lock())
}
