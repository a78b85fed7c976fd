// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `hivesched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hivesched",
    version,
    about = "Run events through a graph of algorithms with a concurrent forward scheduler.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Hive.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Hive.toml")]
    pub config: String,

    /// Number of events to process.
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub events: u64,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HIVESCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't run any event.
    #[arg(long)]
    pub dry_run: bool,

    /// Simulate one event before starting (overrides the config).
    #[arg(long)]
    pub simulate: bool,

    /// Record a timeline and write it to this CSV file (overrides the
    /// config).
    #[arg(long, value_name = "PATH")]
    pub timeline: Option<String>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["hivesched"]);
        assert_eq!(args.config, "Hive.toml");
        assert_eq!(args.events, 100);
        assert!(!args.dry_run);
        assert!(args.timeline.is_none());
    }

    #[test]
    fn overrides() {
        let args = CliArgs::parse_from([
            "hivesched",
            "--config",
            "conf/Hive.toml",
            "--events",
            "5",
            "--log-level",
            "debug",
            "--simulate",
            "--timeline",
            "t.csv",
        ]);
        assert_eq!(args.config, "conf/Hive.toml");
        assert_eq!(args.events, 5);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.simulate);
        assert_eq!(args.timeline.as_deref(), Some("t.csv"));
    }
}
