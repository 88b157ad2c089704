// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `tickdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tickdag",
    version,
    about = "Compile and run a system schedule described by a TOML plan.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub plan: PathBuf,

    /// Parse, validate and compile; print the order without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Ticks to run on every channel in deterministic mode.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub ticks: u64,

    /// Drive channels from interval timers until Ctrl-C instead of stepping
    /// them `--ticks` times.
    #[arg(long, conflicts_with = "dry_run")]
    pub realtime: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TICKDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
