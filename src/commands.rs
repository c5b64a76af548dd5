//! Text command surface: `ames show 5`, `ames play 20`, `ames align B`, ...
//!
//! Lines come from stdin or the REST API; both end up as a [`Command`]
//! executed on the control thread.

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn enabled(self) -> bool {
        self == OnOff::On
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Align every open structure onto its predecessor
    Align {
        /// Chain to match (default: settings chain)
        chain: Option<String>,
    },
    /// Show a frame (1-based, clamped to the trajectory)
    Show {
        #[arg(allow_negative_numbers = true)]
        frame: i64,
    },
    /// Start playback, optionally at a new speed (fps)
    Play { speed: Option<u32> },
    /// Stop playback
    Stop,
    /// Toggle playback
    Toggle,
    First,
    Last,
    Next,
    Prev,
    /// Enable or disable looping
    Loop {
        #[arg(value_enum)]
        state: OnOff,
    },
    /// Frames per step
    Skip { n: usize },
    /// Load structure files or a folder
    Load {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Record the trajectory to a movie
    Record {
        path: Option<PathBuf>,
        /// Finish an interactive recording
        #[arg(long)]
        stop: bool,
    },
    /// Coloring (chain, plddt, ss, rainbow, atom)
    Color { mode: String },
    /// Print the current state
    Status,
    /// Close the trajectory
    Close,
    /// Leave the control loop
    Quit,
}

#[derive(Parser, Debug)]
#[command(name = "ames", no_binary_name = true, disable_version_flag = true)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    Empty,
    UnterminatedQuote,
    /// Rejected by the argument parser (message is clap's rendering)
    Invalid(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "Empty command"),
            CommandError::UnterminatedQuote => write!(f, "Unterminated quote"),
            CommandError::Invalid(msg) => write!(f, "{}", msg.trim_end()),
        }
    }
}

impl std::error::Error for CommandError {}

/// Split on whitespace; double or single quotes group words.
fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse one command line. A leading `ames` is optional.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut tokens = tokenize(line)?;
    if tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("ames")) {
        tokens.remove(0);
    }
    if tokens.is_empty() {
        return Err(CommandError::Empty);
    }

    CommandLine::try_parse_from(tokens)
        .map(|cl| cl.command)
        .map_err(|e| CommandError::Invalid(e.to_string()))
}
