//! Stop watcher CLI
//!
//! Next departures from Île-de-France stops, from the terminal.

#![allow(clippy::print_stdout)]

mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use integration_idfm::{
    LineInfo, Mode, PRIM_SIGNUP_URL, ScheduleReport, StopWatcher, StopWatcherConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Overrides;

/// Stop watcher CLI
#[derive(Parser)]
#[command(name = "stopwatcher-cli")]
#[command(author, version, about = "Realtime departures for Île-de-France Mobilités stops", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: ./stopwatcher.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// PRIM API key
    #[arg(long, env = "IDFM_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the next departures from a stop
    ///
    /// Example: stopwatcher-cli departures Chatelet --mode metro --line 1
    Departures {
        /// Stop name or free-text query
        query: String,

        /// Transport mode (bus, metro, tram, rer, transilien, ter)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Line name (e.g. "1", "A")
        #[arg(short, long)]
        line: Option<String>,

        /// Match the stop name exactly
        #[arg(long)]
        exact: bool,

        /// Print departure times instead of relative minutes
        #[arg(long)]
        as_date: bool,

        /// Locale for relative times (e.g. fr, en)
        #[arg(long)]
        locale: Option<String>,

        /// Municipality to search in
        #[arg(long)]
        municipality: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the metadata of a line
    Line {
        /// Line identifier (e.g. C01371)
        line_id: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check that the catalog and realtime services are reachable
    Health,

    /// Print the effective configuration (API key omitted)
    ShowConfig,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// One-line description of a line
fn describe_line(line: &LineInfo) -> String {
    let mode = line.mode.map_or("unknown mode", |m| m.label());
    format!(
        "{} ({mode}) - color #{} on #{}",
        line.name, line.color, line.text_color
    )
}

fn print_report(report: &ScheduleReport) {
    if report.schedules.is_empty() {
        println!("No matching stop found.");
    }

    for schedule in &report.schedules {
        println!("{schedule}");
        println!();
    }

    if report.is_degraded() {
        println!("⚠️  Some data could not be fetched:");
        for issue in &report.issues {
            println!("   {issue}");
        }
    }
}

fn build_watcher(config: StopWatcherConfig) -> anyhow::Result<StopWatcher> {
    StopWatcher::new(config).map_err(|e| {
        anyhow::anyhow!("{e}\nSet IDFM_API_KEY or pass --api-key (keys: {PRIM_SIGNUP_URL})")
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = log_filter_from_verbosity(cli.verbose);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Departures {
            query,
            mode,
            line,
            exact,
            as_date,
            locale,
            municipality,
            json,
        } => {
            let config = Overrides {
                api_key: cli.api_key,
                locale,
                municipality,
                exact,
                as_date,
            }
            .apply(config);
            let watcher = build_watcher(config)?;

            let report = watcher
                .get_stop_schedules_report(&query, mode, line.as_deref())
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&report.schedules)?);
            } else {
                print_report(&report);
            }
        },

        Commands::Line { line_id, json } => {
            let config = Overrides {
                api_key: cli.api_key,
                ..Overrides::default()
            }
            .apply(config);
            let watcher = build_watcher(config)?;

            match watcher.resolve_line_info(&line_id).await {
                Ok(line) if json => println!("{}", serde_json::to_string_pretty(&line)?),
                Ok(line) => println!("🚇 {}", describe_line(&line)),
                Err(e) => {
                    println!("❌ {e}");
                    std::process::exit(1);
                },
            }
        },

        Commands::Health => {
            let config = Overrides {
                api_key: cli.api_key,
                ..Overrides::default()
            }
            .apply(config);
            let watcher = build_watcher(config)?;

            if watcher.is_healthy().await {
                println!("✅ Healthy");
            } else {
                println!("❌ Unhealthy");
                std::process::exit(1);
            }
        },

        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        },
    }

    Ok(())
}
