//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// loopback-router - capture what an output device plays
///
/// Captures an output endpoint in loopback mode, shows its level and
/// forwards a stereo downmix to a second output device
#[derive(Parser, Debug)]
#[command(name = "loopback-router")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Verbose output (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Configuration file (default: search next to the executable, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List active output devices
    List {
        /// Show device IDs (useful for --forward)
        #[arg(long)]
        show_ids: bool,
    },

    /// Capture and forward until Ctrl+C
    Run {
        /// Channels to capture (6 = 5.1, 8 = 7.1)
        #[arg(long)]
        channels: Option<u16>,

        /// Capture the first output device whose name contains this text
        #[arg(long, value_name = "NAME")]
        capture: Option<String>,

        /// Forward to this device ID
        #[arg(long, value_name = "ID", conflicts_with = "cable")]
        forward: Option<String>,

        /// Forward to the installed virtual audio cable
        #[arg(long)]
        cable: bool,

        /// Forward gain multiplier
        #[arg(long)]
        volume: Option<f32>,

        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// Print the ID of the installed virtual audio cable
    FindCable,

    /// Print a sample configuration file
    SampleConfig,
}

impl Args {
    /// Get the log level based on verbose/quiet flags
    ///
    /// Returns `None` when no flag was given, leaving the choice to the
    /// configuration file.
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else {
            match self.verbose {
                0 => None,
                1 => Some(tracing::Level::DEBUG),
                _ => Some(tracing::Level::TRACE),
            }
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        // Default to run with settings from the config file
        Command::Run {
            channels: None,
            capture: None,
            forward: None,
            cable: false,
            volume: None,
            duration: None,
        }
    }
}
