//! Sumi-Gleaner main entry point
//!
//! Command-line consumer for the crawl engine: starts one run and prints
//! each streamed line to stdout while the crawl is still going.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use sumi_gleaner::config::{load_config_with_hash, validate, Config};
use sumi_gleaner::output::{format_event, print_summary, RunSummary};
use sumi_gleaner::{normalize_url, Supervisor};
use tracing_subscriber::EnvFilter;

/// Sumi-Gleaner: a streaming image crawler
///
/// Crawls a site breadth-first from the given URL, downloads every image it
/// finds and prints the served path of each one as soon as it is stored.
#[derive(Parser, Debug)]
#[command(name = "sumi-gleaner")]
#[command(version)]
#[command(about = "A streaming image crawler", long_about = None)]
struct Cli {
    /// Seed URL (absolute, http or https)
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory images are written to (one subdirectory per site)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Maximum number of pages to visit
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Follow links to other hosts too
    #[arg(long)]
    all_origins: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and seed URL and show what would be crawled
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the streamed lines
    setup_logging(cli.verbose, cli.quiet);

    let config = load_settings(&cli)?;

    if cli.dry_run {
        handle_dry_run(&config, &cli.url)?;
        return Ok(ExitCode::SUCCESS);
    }

    handle_crawl(config, &cli.url).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_gleaner=info,warn"),
            1 => EnvFilter::new("sumi_gleaner=debug,info"),
            2 => EnvFilter::new("sumi_gleaner=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Config file (or defaults), then environment, then command-line flags
fn load_settings(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;

    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = max_pages;
    }
    if let Some(output) = &cli.output {
        config.output.output_dir = output.clone();
    }
    if cli.all_origins {
        config.crawler.same_origin_only = false;
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Handles --dry-run: validates everything and prints the effective settings
fn handle_dry_run(config: &Config, url: &str) -> anyhow::Result<()> {
    let seed = normalize_url(url).with_context(|| format!("Cannot crawl {}", url))?;

    println!("=== Sumi-Gleaner Dry Run ===\n");
    println!("Seed: {}", seed);

    println!("\nCrawler Configuration:");
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Same origin only: {}", config.crawler.same_origin_only);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Timeouts: page {}s, image {}s",
        config.crawler.page_timeout_secs, config.crawler.image_timeout_secs
    );
    println!("  Max image size: {} bytes", config.crawler.max_image_bytes);
    println!("  Skip icons: {}", config.crawler.skip_icons);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.output_dir.display());
    println!("  Serve path: {}", config.output.serve_path);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Runs one crawl, printing a line per stored image
///
/// Ctrl-C cancels the run; its stream still ends with the terminal line.
async fn handle_crawl(config: Config, url: &str) -> anyhow::Result<ExitCode> {
    let max_pages = config.crawler.max_pages;
    let output_dir = config.output.output_dir.clone();
    let serve_path = config.output.serve_path.clone();

    let supervisor = Arc::new(Supervisor::new(config)?);
    let mut handle = supervisor
        .start_crawl(url, max_pages, output_dir)
        .await
        .with_context(|| format!("Cannot crawl {}", url))?;

    let mut summary = RunSummary::new();
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                summary.record(&event);
                println!("{}", format_event(&event, &serve_path));
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                tracing::info!("Interrupted; cancelling run {}", handle.id());
                interrupted = true;
                // The stream must keep draining while the run winds down
                let supervisor = Arc::clone(&supervisor);
                tokio::spawn(async move { supervisor.cancel_active().await });
            }
        }
    }

    let run = handle.wait_finished().await;
    print_summary(&summary, &run);

    if summary.is_failure() {
        tracing::error!("Crawl failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
