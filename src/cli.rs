// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `scriptrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptrun",
    version,
    about = "Run catalog scripts, stream their output and chain their structured results.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$SCRIPTRUN_CONFIG`, else `Scriptrun.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one or more scripts in order.
    ///
    /// Scripts run sequentially in the same process, so a script that
    /// accepts a reference receives the structured result of the last
    /// earlier script that produced one.
    Run(RunArgs),

    /// List the scripts in the catalog.
    List,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Script names, run left to right.
    #[arg(required = true, value_name = "NAME")]
    pub names: Vec<String>,

    /// Argument string passed to every script (split with shell rules).
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub args: Option<String>,

    /// Working directory for the scripts.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Print events as `event:`/`data:` frames instead of plain text.
    #[arg(long)]
    pub sse: bool,

    /// Print the launch plan of each script without running anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the cached structured result (JSON) after the last script.
    #[arg(long)]
    pub show_result: bool,
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
