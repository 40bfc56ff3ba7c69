use anyhow::{bail, Context, Result};
use arxiv_harvest::config::{find_config_file, HarvestConfig};
use arxiv_harvest::crawler::{
    plan, CrawlError, CrawlSession, EventSink, ParsePolicy, TracingEvents,
};
use arxiv_harvest::harvest::{load_categories, Harvest, HarvestLayout};
use arxiv_harvest::output::MemorySink;
use arxiv_harvest::ui::{print_summary, ProgressEvents};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default location of the categories list
const DEFAULT_CATEGORIES_FILE: &str = "data/crtc_info.csv";

/// Exit status of an interrupted run
const EXIT_CANCELLED: u8 = 130;

/// arxiv-harvest - Harvest arXiv e-print metadata per category into CSV datasets
#[derive(Parser, Debug)]
#[command(name = "arxiv-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Harvest arXiv e-print metadata per category into CSV datasets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl categories into dated CSV folders
    Crawl {
        /// `;`-separated file with a CRTC column
        #[arg(long, conflicts_with = "category")]
        categories: Option<PathBuf>,

        /// Crawl these categories instead of a categories file
        #[arg(long, num_args = 1..)]
        category: Vec<String>,

        /// Output root directory
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Skip the keyword-filtered sessions
        #[arg(long)]
        no_filtered: bool,

        /// Sessions in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// What to do with unparseable entries (abort, skip)
        #[arg(long)]
        parse_policy: Option<ParsePolicy>,
    },

    /// Show how many results a category has and how it would be crawled
    Probe {
        /// Category code, e.g. cs.CR
        category: String,

        /// Apply the keyword filter
        #[arg(long)]
        filtered: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Process exit status of a finished command
fn exit_status(cancelled: bool, failed: bool) -> u8 {
    if cancelled {
        EXIT_CANCELLED
    } else if failed {
        1
    } else {
        0
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let show_progress = matches!(cli.command, Commands::Crawl { .. })
        && !cli.quiet
        && cli.verbose == 0
        && cli.log_format == LogFormat::Text
        && std::io::stderr().is_terminal();

    // Progress bars replace the per-page info lines
    let log_level = match cli.verbose {
        0 if show_progress => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };
    let json = cli.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("arxiv_harvest={}", env_filter)),
        ))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    if let Commands::InitConfig { path, force } = &cli.command {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        HarvestConfig::default().save(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let mut config = HarvestConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current request");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Crawl {
            categories,
            category,
            output,
            no_filtered,
            concurrency,
            parse_policy,
        } => {
            if let Some(output) = output {
                config.output.directory = output;
            }
            if let Some(concurrency) = concurrency {
                config.crawl.concurrency = concurrency;
            }
            if let Some(policy) = parse_policy {
                config.crawl.parse_policy = policy;
            }
            config.validate()?;

            let categories = if category.is_empty() {
                let path = categories.unwrap_or_else(|| PathBuf::from(DEFAULT_CATEGORIES_FILE));
                load_categories(&path)?
            } else {
                category
            };

            let filter = if no_filtered {
                None
            } else {
                config.keyword_filter()
            };
            let layout = HarvestLayout::dated(
                &config.output.directory,
                &filter.clone().unwrap_or_default(),
                chrono::Local::now().date_naive(),
            );

            let events: Arc<dyn EventSink> = if show_progress {
                Arc::new(ProgressEvents::new(Arc::new(TracingEvents)))
            } else {
                Arc::new(TracingEvents)
            };
            let client = config
                .query_client()?
                .with_cancellation(cancel.clone())
                .with_events(events.clone());

            let harvest = Harvest::new(client, layout, filter)
                .with_driver_config(config.driver_config())
                .with_concurrency(config.crawl.concurrency)
                .with_events(events);

            let summary = harvest.run(&categories).await?;
            if !cli.quiet {
                print_summary(&summary);
            }

            Ok(ExitCode::from(exit_status(
                summary.cancelled,
                summary.failed() > 0,
            )))
        }

        Commands::Probe {
            category,
            filtered,
            json,
        } => {
            let filter = if filtered {
                config.keyword_filter()
            } else {
                None
            };
            let client = config.query_client()?.with_cancellation(cancel.clone());
            let session = CrawlSession::new(category, filter, client, Arc::new(MemorySink::new()));

            let total = match session.probe().await {
                Ok(total) => total,
                Err(CrawlError::Cancelled) => return Ok(ExitCode::from(exit_status(true, false))),
                Err(e) => return Err(e.into()),
            };
            let strategy = plan(total);

            if json {
                let output = serde_json::json!({
                    "query": session.search_query(),
                    "total": total,
                    "strategy": strategy.as_ref().ok(),
                    "error": strategy.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("query: {}", session.search_query());
                println!("total: {}", total);
                match &strategy {
                    Ok(strategy) => {
                        for pass in strategy.passes() {
                            println!("pass:  {} {}", pass.sort_order, pass.target);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }

            Ok(if strategy.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::InitConfig { .. } => Ok(ExitCode::SUCCESS),
    }
}
