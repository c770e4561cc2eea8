//! Tour-Mirror main entry point
//!
//! This is the command-line interface for the Tour-Mirror offline tour mirror.

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tour_mirror::config::{load_config, Config};
use tour_mirror::mirror::{run_mirror, MirrorOptions};
use tour_mirror::output::print_statistics;
use tour_mirror::storage::ResumableLog;
use tracing_subscriber::EnvFilter;

/// Tour-Mirror: a resumable offline mirror for panoramic tours
///
/// Tour-Mirror downloads a tour's base files, manifest and image tiles,
/// then crawls the tour for every other resource it references. Files
/// already on disk are skipped, so an interrupted run resumes where it
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "tour-mirror")]
#[command(version = "1.0.0")]
#[command(about = "A resumable offline mirror for panoramic tours", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Download manifest tiles only, without crawling
    #[arg(long)]
    skip_crawl: bool,

    /// Validate config and show what would be mirrored without downloading
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the download log and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config).await;
    } else {
        handle_mirror(
            &config,
            MirrorOptions {
                skip_crawl: cli.skip_crawl,
            },
        )
        .await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tour_mirror=info,warn"),
            1 => EnvFilter::new("tour_mirror=debug,info"),
            2 => EnvFilter::new("tour_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config) {
    println!("=== Tour-Mirror Dry Run ===\n");

    println!("Tour:");
    println!("  Base URL: {}", config.tour.base_url);
    println!("  Manifest: {}", config.manifest_url());
    println!("  Reserved prefix: {}", config.tour.reserved_prefix);
    println!("  Base files ({}):", config.tour.base_files.len());
    for file in &config.tour.base_files {
        println!("    * {}", file);
    }

    println!("\nDownload:");
    println!("  Output: {}", config.download.output_dir.display());
    println!("  Log: {}", config.log_path().display());
    println!("  Max parallel: {}", config.download.max_parallel);
    println!("  Max retries: {}", config.download.max_retries);

    println!("\nRequests:");
    println!(
        "  Delay: {}ms + up to {}ms jitter",
        config.request.base_delay_ms, config.request.jitter_ms
    );
    println!("  Retry backoff base: {}ms", config.request.retry_backoff_base);
    println!(
        "  Block wait: {}-{}ms",
        config.request.block_wait_ms[0], config.request.block_wait_ms[1]
    );
    println!(
        "  Error wait: {}-{}ms",
        config.request.error_wait_ms[0], config.request.error_wait_ms[1]
    );
    match config.request.max_fetch_attempts {
        Some(max) => println!("  Max fetch attempts: {}", max),
        None => println!("  Max fetch attempts: unbounded"),
    }
    println!("  User agents: {}", config.request.user_agents.len());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the download log
async fn handle_stats(config: &Config) {
    let log_path = config.log_path();
    println!("Log: {}\n", log_path.display());

    let log = ResumableLog::open(log_path).await;
    print_statistics(&log.stats().await);
}

/// Handles the main mirror operation
async fn handle_mirror(
    config: &Config,
    options: MirrorOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping pending requests");
            signal_token.cancel();
        }
    });

    match run_mirror(config, options, cancel).await {
        Ok(stats) => {
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Mirror failed: {}", e);
            Err(e.into())
        }
    }
}
