//! TabMaster - master-tab election simulator
//!
//! CLI entry point for running election scenarios in a simulated browser.

use std::fs;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use tabmaster::cli::{Cli, Command, OutputFormat, get_log_path};
use tabmaster::config::Config;
use tabmaster::sim::{Scenario, SimulationReport, TabSnapshot, run_scenario};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to the log file so stdout carries only the report
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!(
        "TabMaster loaded config: claim-delay-ms={}, backoff-slots={}",
        config.election.claim_delay_ms, config.election.backoff_slots
    );

    match cli.command {
        Command::Simulate {
            tabs,
            close_master,
            crash_master,
            seed,
            format,
        } => {
            let disruption = Command::disruption(close_master, crash_master);
            cmd_simulate(config, tabs, disruption, seed, format).await
        }
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_simulate(
    mut config: Config,
    tabs: usize,
    disruption: Option<tabmaster::sim::Disruption>,
    seed: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    if seed.is_some() {
        config.election.seed = seed;
    }

    let report = run_scenario(config, Scenario { tabs, disruption })
        .await
        .context("Simulation failed")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_tabs(tabs: &[TabSnapshot]) {
    if tabs.is_empty() {
        println!("  (no tabs open)");
        return;
    }
    for tab in tabs {
        println!(
            "  {}  {:<8}  epoch={}  peers={}",
            tab.id.short(),
            tab.role.to_string(),
            tab.epoch,
            tab.peers
        );
    }
}

fn print_report(report: &SimulationReport) {
    println!("Opened {} tab(s):", report.opened.len());
    print_tabs(&report.opened);

    if let (Some(disruption), Some(removed)) = (report.disruption, report.removed.as_ref()) {
        let verb = match disruption {
            tabmaster::sim::Disruption::CloseMaster => "Closed",
            tabmaster::sim::Disruption::CrashMaster => "Crashed",
        };
        println!();
        println!("{} master {}, after re-election:", verb, removed.short());
        print_tabs(&report.settled);
    }

    println!();
    println!("Masters: {}", report.masters);
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
    print!("{}", yaml);
    Ok(())
}
