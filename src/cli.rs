//! Command-line interface for speechloop
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Real-time speech loop for live calls
#[derive(Parser, Debug)]
#[command(
    name = "speechloop",
    version,
    about = "Recognize, translate and re-synthesize call audio"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a WAV file through a session and write the spoken response
    Run {
        /// Input WAV file (any rate or channel count, converted to 16kHz mono)
        #[arg(long, short = 'i', value_name = "FILE")]
        input: PathBuf,

        /// Output WAV file for the outbound media buffers
        #[arg(long, short = 'o', value_name = "FILE")]
        output: PathBuf,

        /// Whisper model file, overrides recognition.model_path
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Pace input at call speed, one frame per frame duration
        #[arg(long)]
        realtime: bool,

        /// Recognizer stop timeout, overrides session.stop_timeout_ms. Examples: 5s, 1500ms
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        stop_timeout: Option<Duration>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

/// Parse a duration string.
///
/// Bare numbers are milliseconds; anything else goes through `humantime`
/// (`5s`, `1500ms`, `1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Default tracing filter for a `-v` count, used when `RUST_LOG` is unset.
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "speechloop=info",
        1 => "speechloop=debug",
        _ => "speechloop=trace",
    }
}
