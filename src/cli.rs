// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devloop`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devloop",
    version,
    about = "Rebuild and restart a Java project whenever its files change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the project layout file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Devloop.toml")]
    pub config: String,

    /// Empty the output directories before the first build.
    ///
    /// Also enabled by `[loop].clean` in the config.
    #[arg(long)]
    pub clean: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVLOOP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Stop after this many build cycles.
    #[arg(long, value_name = "N")]
    pub max_cycles: Option<u64>,

    /// Parse and validate the config, print the resolved project, and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_flags() {
        let args = CliArgs::try_parse_from(["devloop"]).unwrap();
        assert_eq!(args.config, "Devloop.toml");
        assert!(!args.clean && !args.dry_run);
        assert_eq!(args.max_cycles, None);

        let args = CliArgs::try_parse_from([
            "devloop",
            "--config",
            "app/Devloop.toml",
            "--clean",
            "--log-level",
            "debug",
            "--max-cycles",
            "3",
        ])
        .unwrap();
        assert_eq!(args.config, "app/Devloop.toml");
        assert!(args.clean);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.max_cycles, Some(3));
    }
}
