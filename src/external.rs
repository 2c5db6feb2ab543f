//! # External Collaborators
//!
//! Adapters that plug real programs into the session's traits. Like the rest
//! of the tooling, they shell out instead of linking media libraries:
//!
//! - [`CommandResolver`]: runs a search tool (by default `yt-dlp`) and reads
//!   its JSON description of the best match.
//! - [`CommandPlayer`]: spawns a player process (by default `mpv`) per stream;
//!   the child process is the stream handle.
//! - [`LineClassifier`] / [`LineFrameSource`]: consume the text output of an
//!   external emotion detector, one `"<emotion> [confidence]"` line per frame.
//!
//! Program arguments may contain a placeholder (`{query}` or `{url}`); when
//! none does, the value is appended as the last argument.

use crate::mood::{Classification, Classifier, RawEmotion};
use crate::playback::{Player, ResolvedStream, Resolver, StreamHandle};
use crate::query::PlaybackQuery;
use crate::sampling::FrameSource;
use anyhow::{bail, Context, Result};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// A program and its argument template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `yt-dlp` searching for the single best audio match.
    #[must_use]
    pub fn default_resolver() -> Self {
        Self::new(
            "yt-dlp",
            [
                "-f",
                "bestaudio",
                "--no-playlist",
                "--no-warnings",
                "-q",
                "--dump-single-json",
                "ytsearch1:{query}",
            ],
        )
    }

    /// Audio-only `mpv`.
    #[must_use]
    pub fn default_player() -> Self {
        Self::new("mpv", ["--no-video", "--really-quiet", "{url}"])
    }

    /// Arguments with `placeholder` replaced by `value`.
    fn render(&self, placeholder: &str, value: &str) -> Vec<String> {
        let mut args: Vec<String> = self.args.iter().map(|a| a.replace(placeholder, value)).collect();
        if !self.args.iter().any(|a| a.contains(placeholder)) {
            args.push(value.to_string());
        }
        args
    }
}

/// Resolves queries by running an external search program.
#[derive(Debug, Clone)]
pub struct CommandResolver {
    spec: CommandSpec,
}

impl CommandResolver {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Resolver for CommandResolver {
    fn resolve(&self, query: &PlaybackQuery) -> Result<ResolvedStream> {
        let program = &self.spec.program;
        debug!("Running {program} for `{query}`");

        let output = Command::new(program)
            .args(self.spec.render("{query}", &query.text))
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute {program}. Please make sure it is installed"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{program} exited with {}: {}", output.status, stderr.trim());
        }

        parse_resolver_output(&output.stdout)
            .with_context(|| format!("Unexpected output from {program}"))
    }
}

/// Reads a `yt-dlp`-style JSON document: either a single video or a search
/// result whose `entries` hold the videos.
///
/// # Errors
///
/// Fails on invalid JSON, an empty result list, or a missing `url`.
pub fn parse_resolver_output(stdout: &[u8]) -> Result<ResolvedStream> {
    let document: Value = serde_json::from_slice(stdout).context("Resolver output is not JSON")?;

    let info = match document.get("entries") {
        Some(entries) => entries
            .as_array()
            .and_then(|entries| entries.first())
            .context("Search returned no results")?,
        None => &document,
    };

    let stream_url = info
        .get("url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .context("Result has no stream url")?
        .to_string();
    let title = info
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Unknown title")
        .to_string();
    let canonical_url = info
        .get("webpage_url")
        .and_then(Value::as_str)
        .map_or_else(|| stream_url.clone(), str::to_string);

    Ok(ResolvedStream {
        stream_url,
        title,
        canonical_url,
    })
}

/// Plays streams by spawning an external player process.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    spec: CommandSpec,
    startup_grace: Duration,
}

impl CommandPlayer {
    /// `startup_grace` is how long a fresh player is watched for an early
    /// failure before the start counts as successful.
    #[must_use]
    pub fn new(spec: CommandSpec, startup_grace: Duration) -> Self {
        Self { spec, startup_grace }
    }
}

impl Player for CommandPlayer {
    fn start(&self, stream_url: &str) -> Result<Box<dyn StreamHandle>> {
        let program = &self.spec.program;

        let child = Command::new(program)
            .args(self.spec.render("{url}", stream_url))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {program}. Please make sure it is installed"))?;
        // Owned by the stream from here on, so every early return kills and reaps it.
        let mut stream = ChildStream::new(child);

        let deadline = Instant::now() + self.startup_grace;
        while Instant::now() < deadline {
            if let Some(status) = stream.child.try_wait().context("Failed to poll player process")? {
                if !status.success() {
                    bail!("{program} exited immediately with {status}");
                }
                debug!("{program} finished during startup");
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        debug!("{program} playing {stream_url} (pid {})", stream.child.id());
        Ok(Box::new(stream))
    }
}

/// A player process.
#[derive(Debug)]
pub struct ChildStream {
    child: Child,
    reaped: bool,
}

impl ChildStream {
    fn new(child: Child) -> Self {
        Self { child, reaped: false }
    }
}

impl StreamHandle for ChildStream {
    fn stop(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }

        if self.child.try_wait().context("Failed to poll player process")?.is_none() {
            // The process can exit between the poll and the kill.
            if let Err(e) = self.child.kill() {
                if e.kind() != io::ErrorKind::InvalidInput {
                    return Err(e).context("Failed to kill player process");
                }
            }
        }
        self.child.wait().context("Failed to reap player process")?;
        self.reaped = true;
        Ok(())
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Player process {} left behind: {e:#}", self.child.id());
        }
    }
}

/// Classifies detector output lines such as `"sad 0.82"`.
///
/// Blank lines, `none`, `unavailable`, `-` and malformed confidences mean the
/// detector had nothing to report. A missing confidence counts as `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineClassifier;

impl Classifier for LineClassifier {
    type Frame = String;

    fn classify(&self, frame: &String) -> Option<Classification> {
        let mut parts = frame.split_whitespace();
        let label = parts.next()?;
        if matches!(label.to_ascii_lowercase().as_str(), "none" | "unavailable" | "-") {
            return None;
        }

        let confidence = match parts.next() {
            Some(raw) => match raw.parse::<f32>() {
                Ok(c) if (0.0..=1.0).contains(&c) => c,
                _ => {
                    trace!("Ignoring detector line with bad confidence: {frame}");
                    return None;
                }
            },
            None => 1.0,
        };

        Some(Classification {
            emotion: RawEmotion::from_label(label),
            confidence,
        })
    }
}

/// Frames read line by line from a detector's output stream.
///
/// A reader thread drains the input as it arrives; each tick takes the most
/// recent line and drops older ones, so a fast detector never builds up lag.
#[derive(Debug)]
pub struct LineFrameSource {
    lines: mpsc::Receiver<String>,
    exhausted: bool,
}

impl LineFrameSource {
    /// # Errors
    ///
    /// Fails if the reader thread cannot be spawned.
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Stopped reading detector output: {e}");
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            lines: rx,
            exhausted: false,
        })
    }
}

impl FrameSource for LineFrameSource {
    type Frame = String;

    fn next_frame(&mut self) -> Option<String> {
        let mut latest = None;
        loop {
            match self.lines.try_recv() {
                Ok(line) => latest = Some(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        latest
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
