mod config;
mod fetch;
mod transforms;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use calmirror_core::ics::IcalParser;
use calmirror_core::{Orchestrator, RunOptions};
use calmirror_provider_google::GoogleCalendarClient;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LegacyEnv, Settings};
use crate::fetch::HttpFeedFetcher;

#[derive(Parser)]
#[command(name = "calmirror")]
#[command(about = "Mirror ICS calendar subscriptions into Google Calendar")]
struct Cli {
    /// Path to config.toml (default: ~/.config/calmirror/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update destination events so they match their feeds
    Sync {
        /// Show what would change without writing to any calendar
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate the configuration and list destinations
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loaded before logging so RUST_LOG can come from .env
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(e) = unreadable_dotenv(dotenv) {
        warn!(error = %e, "Ignoring unreadable .env file");
    }

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref(), &LegacyEnv::from_process())?;

    match cli.command.unwrap_or(Commands::Sync { dry_run: false }) {
        Commands::Sync { dry_run } => cmd_sync(&settings, dry_run).await,
        Commands::Check => cmd_check(&settings),
    }
}

/// A missing .env is fine, any other load error is worth reporting.
fn unreadable_dotenv<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match result {
        Err(e) if !e.not_found() => Some(e),
        _ => None,
    }
}

async fn cmd_sync(settings: &Settings, dry_run: bool) -> Result<()> {
    let access_token = settings.google.access_token.clone().context(
        "No Google access token.\n\
        Set GOOGLE_ACCESS_TOKEN or add access_token under [google] in config.toml",
    )?;

    let client = GoogleCalendarClient::with_base_url(&settings.google.api_base_url, access_token)?;
    let overrides = transforms::build_registry(&settings.destinations);

    let orchestrator = Orchestrator::new(
        Arc::new(HttpFeedFetcher::new()),
        Arc::new(IcalParser),
        Arc::new(client),
        Arc::new(overrides),
    )
    .with_options(RunOptions { dry_run });

    let report = orchestrator.run(&settings.destinations()).await;

    for destination in &report.destinations {
        match &destination.outcome {
            Ok(stats) => println!("📅 {}: {}", destination.destination_id, stats),
            Err(e) => println!("📅 {}: failed: {}", destination.destination_id, e),
        }
    }

    let totals = report.totals();
    println!(
        "\nTotal: {} created, {} updated, {} unchanged{}",
        totals.created,
        totals.updated,
        totals.unchanged,
        if dry_run { " (dry run)" } else { "" }
    );

    if report.has_failures() {
        anyhow::bail!(
            "{} of {} destinations failed",
            report.failures().count(),
            report.destinations.len()
        );
    }

    Ok(())
}

fn cmd_check(settings: &Settings) -> Result<()> {
    println!("Configuration OK: {} destination(s)", settings.destinations.len());

    for destination in &settings.destinations {
        println!("\n📅 {}", destination.calendar_id);
        println!("  feed: {}", destination.feed_url);
        for step in &destination.transforms {
            println!("  transform: {:?}", step);
        }
    }

    if settings.google.access_token.is_none() {
        println!("\nWarning: no Google access token configured, sync will fail");
    }

    Ok(())
}
