//! marquee CLI
//!
//! Watches a theater's published screening schedule and sends a webhook
//! notification when a new screening appears or a booking status changes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;

use marquee::{
    error::{AppError, Result},
    models::{Config, EventKind, ScheduleEvent, Screening, ScreeningStatus},
    notify::{Notifier, WebhookNotifier},
    pipeline::ScheduleMonitor,
    services::{HttpScheduleScraper, ScheduleSource},
    storage::SqliteStore,
};

/// marquee - Theater Screening Schedule Monitor
#[derive(Parser, Debug)]
#[command(
    name = "marquee",
    version,
    about = "Theater screening schedule monitor"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "marquee.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check immediately, then keep checking on the configured interval
    Start,

    /// Run a single schedule check and exit
    Check,

    /// Scraper diagnostic: fetch the schedule and print it, no notifications
    Scrape,

    /// Notifier diagnostic: send a synthetic new-screening notification
    Notify,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("marquee starting...");

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Start => {
            config.validate()?;
            let mut monitor = build_monitor(&config).await?;
            monitor.initialize()?;
            log::info!(
                "Check interval: {} minutes. Press Ctrl+C to stop.",
                config.monitor.check_interval_minutes
            );
            run_periodic(monitor, config.monitor.check_interval_minutes).await?;
        }

        Command::Check => {
            config.validate()?;
            let mut monitor = build_monitor(&config).await?;
            monitor.initialize()?;

            let result = monitor.check_schedule().await;
            if let Err(error) = monitor.close().await {
                log::warn!("Failed to close monitor cleanly: {error}");
            }

            let summary = result?;
            log::info!(
                "Check complete: {} screenings, {} added, {} status changed, {} sent, {} skipped",
                summary.fetched,
                summary.added,
                summary.status_changed,
                summary.sent,
                summary.skipped
            );
        }

        // Diagnostic only; runs without a configured webhook
        Command::Scrape => {
            run_scrape_diagnostic(&config).await?;
        }

        Command::Notify => {
            config.validate()?;
            run_notify_diagnostic(&config).await?;
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Wire the scraper, stores and notifier into a monitor.
async fn build_monitor(config: &Config) -> Result<ScheduleMonitor> {
    let source = HttpScheduleScraper::new(Arc::new(config.scraper.clone()))?;
    let store = SqliteStore::open(&config.monitor.database_path).await?;
    let notifier = WebhookNotifier::new(&config.notifier)?;

    Ok(ScheduleMonitor::new(
        Box::new(source),
        Box::new(store),
        Box::new(notifier),
        &config.monitor,
    ))
}

/// Run cycles on a fixed interval until Ctrl+C.
///
/// Cycles run inline between ticks, so they never overlap; a cycle that
/// outlives its interval skips the missed ticks instead of queueing them.
async fn run_periodic(mut monitor: ScheduleMonitor, interval_minutes: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes * 60));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down monitor...");
                break;
            }
        }

        if let Err(error) = monitor.check_schedule().await {
            if error.is_fatal() {
                let _ = monitor.close().await;
                return Err(error);
            }
            log::error!("Scheduled check failed: {error}");
        }
    }

    monitor.close().await
}

/// Fetch the schedule once and print it grouped by date.
async fn run_scrape_diagnostic(config: &Config) -> Result<()> {
    let scraper = HttpScheduleScraper::new(Arc::new(config.scraper.clone()))?;
    let screenings = scraper
        .fetch_schedule(&config.monitor.target_movie, config.monitor.target_date)
        .await?;

    log::info!("Found {} screenings", screenings.len());

    let mut by_date: BTreeMap<NaiveDate, Vec<&Screening>> = BTreeMap::new();
    for screening in &screenings {
        by_date.entry(screening.date).or_default().push(screening);
    }

    for (date, day_screenings) in by_date {
        println!("{date}");
        for screening in day_screenings {
            println!(
                "  {} - {} ({})",
                screening.time.format("%H:%M"),
                screening.screen_type.as_deref().unwrap_or("-"),
                screening.status
            );
            if let Some(url) = &screening.booking_url {
                println!("    booking: {url}");
            }
        }
    }

    Ok(())
}

/// Send a synthetic new-screening notification to verify the channel.
async fn run_notify_diagnostic(config: &Config) -> Result<()> {
    let notifier = WebhookNotifier::new(&config.notifier)?;

    let theater = config
        .scraper
        .theaters
        .first()
        .ok_or_else(|| AppError::config("No theater pages defined"))?;

    let offset = config.scraper.utc_offset()?;
    let date = config
        .monitor
        .target_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let starts_at = date
        .and_hms_opt(19, 30, 0)
        .and_then(|dt| dt.and_local_timezone(offset).single())
        .ok_or_else(|| AppError::validation("Failed to build sample timestamp"))?;

    let event = ScheduleEvent {
        kind: EventKind::NewScreening,
        screening: Screening {
            movie_title: config.monitor.target_movie.clone(),
            theater: theater.name.clone(),
            date,
            time: starts_at.time(),
            starts_at,
            booking_url: Some(theater.url.clone()),
            status: ScreeningStatus::Available,
            screen_type: Some("IMAX".to_string()),
        },
        previous_status: None,
        detected_at: Utc::now(),
    };

    notifier.send(&event).await?;
    log::info!("Test notification sent");

    Ok(())
}
