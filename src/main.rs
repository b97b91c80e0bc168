use anyhow::Result;
use clap::Parser;
use research_harvester::browser::BrowserDriver;
use research_harvester::config::{find_config_file, load_config, save_config, Config, LogFormat};
use research_harvester::utils::{setup_shutdown_handler, Shutdown};
use research_harvester::Harvester;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Harvester - Collect papers, authors and citation counts from a scholarly catalog
#[derive(Parser, Debug)]
#[command(name = "research-harvester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "Collect papers, authors and citation counts from a scholarly catalog", long_about = None)]
struct Cli {
    /// Search query (default: "computer architecture")
    query: Option<String>,

    /// Number of papers to collect (default: 50)
    #[arg(allow_hyphen_values = true)]
    limit: Option<String>,

    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the exported CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of search pages to visit
    #[arg(long)]
    max_pages: Option<u32>,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long)]
    env: bool,
}

fn print_env_vars() {
    println!("Research Harvester - Environment Variables");
    println!();
    println!("Logging:");
    println!("  RUST_LOG                                   Log filter (overrides -v/-q and [logging].level)");
    println!();
    println!("Configuration overrides (any key, sections joined with '__'):");
    println!("  RESEARCH_HARVESTER_CRAWL__BASE_URL          Catalog root URL");
    println!("  RESEARCH_HARVESTER_CRAWL__MAX_PAGES         Search page ceiling (default: 20)");
    println!("  RESEARCH_HARVESTER_SESSION__READY_TIMEOUT_MS  Wait for the primary ready signal (default: 10000)");
    println!("  RESEARCH_HARVESTER_RETRY__MAX_ATTEMPTS      Attempts per page or author (default: 3)");
    println!("  RESEARCH_HARVESTER_BROWSER__HEADLESS        Run the browser headless (default: true)");
    println!("  RESEARCH_HARVESTER_BROWSER__EXECUTABLE      Chrome/Chromium binary path");
    println!("  RESEARCH_HARVESTER_OUTPUT__DIRECTORY        Directory for the CSV files (default: .)");
    println!("  RESEARCH_HARVESTER_LOGGING__FORMAT          pretty or json (default: pretty)");
    std::process::exit(0);
}

/// Parse the positional limit, falling back to `default` on bad input
fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => limit,
        _ => {
            tracing::warn!("Invalid limit '{}'; using default of {}", raw, default);
            default
        }
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("research_harvester={}", level)),
    );

    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[cfg(feature = "chromium")]
fn build_driver(config: &Config) -> Result<Box<dyn BrowserDriver>> {
    Ok(Box::new(research_harvester::browser::ChromiumDriver::new(
        config.browser.clone(),
    )))
}

#[cfg(not(feature = "chromium"))]
fn build_driver(_config: &Config) -> Result<Box<dyn BrowserDriver>> {
    anyhow::bail!("this build has no browser driver; rebuild with the `chromium` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
    }

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    let mut config = load_config(config_path.as_deref())?;

    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        config.crawl.max_pages = max_pages;
    }
    if cli.headful {
        config.browser.headless = false;
    }

    init_tracing(&cli, &config);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    if let Some(path) = &cli.write_config {
        save_config(&config, path)?;
        tracing::info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let query = cli
        .query
        .clone()
        .unwrap_or_else(|| config.crawl.default_query.clone());
    let limit = parse_limit(cli.limit.as_deref(), config.crawl.default_limit);

    let shutdown = Shutdown::new();
    setup_shutdown_handler(shutdown.clone());

    let driver = build_driver(&config)?;
    let mut harvester = Harvester::new(config, driver, shutdown)?;

    let report = harvester.run(&query, limit).await;
    report.log();
    if report.cancelled() {
        tracing::warn!("Run was cancelled; exporting partial results");
    }

    let (paths, summary) = harvester.export().map_err(|e| {
        tracing::error!("Error saving data: {}", e);
        e
    })?;

    summary.log();
    tracing::info!("Data saved to:");
    tracing::info!("  - {}", paths.papers.display());
    tracing::info!("  - {}", paths.authors.display());
    tracing::info!("  - {}", paths.paper_authors.display());

    Ok(())
}
