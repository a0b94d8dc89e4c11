//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::sim::Disruption;

/// TabMaster - master-tab election simulator
#[derive(Parser)]
#[command(
    name = "tm",
    about = "Simulate master-tab election between browser tabs sharing one storage",
    version,
    after_help = "Logs are written to: ~/.local/share/tabmaster/logs/tabmaster.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Open tabs in a simulated browser and report who is master
    Simulate {
        /// Number of tabs to open, one claim window apart
        #[arg(short, long, default_value = "3")]
        tabs: usize,

        /// Close the master normally once all tabs are open
        #[arg(long, conflicts_with = "crash_master")]
        close_master: bool,

        /// Kill the master without a close message, then open a fresh tab
        #[arg(long)]
        crash_master: bool,

        /// Seed for the backoff generator (overrides election.seed)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,
}

impl Command {
    /// Disruption selected by the simulate flags
    pub fn disruption(close_master: bool, crash_master: bool) -> Option<Disruption> {
        if close_master {
            Some(Disruption::CloseMaster)
        } else if crash_master {
            Some(Disruption::CrashMaster)
        } else {
            None
        }
    }
}

/// Output format for simulation reports
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabmaster")
        .join("logs")
        .join("tabmaster.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_simulate_defaults() {
        let cli = Cli::parse_from(["tm", "simulate"]);
        if let Command::Simulate {
            tabs,
            close_master,
            crash_master,
            seed,
            format,
        } = cli.command
        {
            assert_eq!(tabs, 3);
            assert!(!close_master);
            assert!(!crash_master);
            assert!(seed.is_none());
            assert!(matches!(format, OutputFormat::Text));
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_cli_parse_simulate_flags() {
        let cli = Cli::parse_from(["tm", "simulate", "--tabs", "5", "--close-master", "--seed", "9", "-f", "json"]);
        if let Command::Simulate {
            tabs,
            close_master,
            seed,
            format,
            ..
        } = cli.command
        {
            assert_eq!(tabs, 5);
            assert!(close_master);
            assert_eq!(seed, Some(9));
            assert!(matches!(format, OutputFormat::Json));
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_cli_rejects_both_disruptions() {
        let result = Cli::try_parse_from(["tm", "simulate", "--close-master", "--crash-master"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::parse_from(["tm", "-c", "/path/to/config.yml", "config"]);
        assert!(matches!(cli.command, Command::Config));
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
    }

    #[test]
    fn test_disruption_from_flags() {
        assert_eq!(Command::disruption(true, false), Some(Disruption::CloseMaster));
        assert_eq!(Command::disruption(false, true), Some(Disruption::CrashMaster));
        assert_eq!(Command::disruption(false, false), None);
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path_ends_with_file_name() {
        assert!(get_log_path().ends_with("tabmaster/logs/tabmaster.log"));
    }
}
