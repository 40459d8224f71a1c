//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Keep a local mirror of published MARC bibliographic exports.
///
/// By default the harvester watches the export listing and downloads every
/// category whose remote file is newer than the local copy.
#[derive(Parser, Debug)]
#[command(name = "marc-harvester")]
#[command(author, version, about)]
#[command(group(ArgGroup::new("mode").args(["manual", "force"])))]
pub struct Args {
    /// Run a single sweep and exit
    #[arg(long)]
    pub manual: bool,

    /// Watch the export listing and sweep on every change (default)
    #[arg(long, conflicts_with = "manual")]
    pub monitor: bool,

    /// Sweep immediately, then keep monitoring
    #[arg(long)]
    pub force: bool,

    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Shorthand for -v
    #[arg(long)]
    pub debug: bool,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,
}

/// Run mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One sweep, then exit.
    Manual,
    /// Sweep on every detected change.
    Monitor,
    /// One background sweep, then monitor.
    Force,
}

impl Args {
    /// Resolves the run mode from the flags.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        if self.manual {
            RunMode::Manual
        } else if self.force {
            RunMode::Force
        } else {
            RunMode::Monitor
        }
    }

    /// Log level implied by the verbosity flags, if any.
    #[must_use]
    pub fn cli_log_level(&self) -> Option<&'static str> {
        if self.verbose >= 2 {
            Some("trace")
        } else if self.verbose == 1 || self.debug {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }
}
