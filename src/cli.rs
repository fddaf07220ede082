//! CLI interface for trading-memory

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::EngineConfig;
use crate::journal::{JournalEngine, MaintenanceOptions};

#[derive(Parser)]
#[command(name = "trading-memory")]
#[command(about = "Trading journal, principle distillation, and scoring memory", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to the platform config dir)
    #[arg(long, env = "TRADING_MEMORY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Override the configured market (e.g. KR, US)
    #[arg(long)]
    market: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run lifecycle maintenance (prune, cap, archive)
    Maintain {
        /// Report what would change without mutating anything
        #[arg(long)]
        dry_run: bool,
        /// Prune principles and intuitions below this confidence
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Keep at most this many active principles
        #[arg(long)]
        max_principles: Option<usize>,
        /// Delete fully compressed entries older than this many days
        #[arg(long)]
        archive_days: Option<i64>,
    },
    /// Render the memory context block for an instrument
    Context {
        /// Ticker symbol
        ticker: String,
        /// Sector name for sector-wide matching
        #[arg(short, long)]
        sector: Option<String>,
    },
    /// Show the score adjustment for an instrument
    Score {
        /// Ticker symbol
        ticker: String,
        /// Sector name for sector-wide matching
        #[arg(short, long)]
        sector: Option<String>,
    },
    /// Show database statistics
    Stats,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trading-memory")
        .join("config.toml")
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = if path.exists() {
        EngineConfig::load(&path)?
    } else {
        EngineConfig::default()
    };
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    if let Some(market) = &cli.market {
        config.market = market.clone();
    }
    Ok(config)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let engine = JournalEngine::open(config).await?;

    match cli.command {
        Commands::Maintain {
            dry_run,
            min_confidence,
            max_principles,
            archive_days,
        } => {
            let defaults = engine.config().maintenance_options(dry_run);
            let opts = MaintenanceOptions {
                min_confidence: min_confidence.unwrap_or(defaults.min_confidence),
                max_principles: max_principles.unwrap_or(defaults.max_principles),
                archive_tier3_days: archive_days.unwrap_or(defaults.archive_tier3_days),
                dry_run,
            };
            let report = engine.run_maintenance(&opts).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Context { ticker, sector } => {
            let context = engine.context_for(&ticker, sector.as_deref()).await;
            if context.is_empty() {
                println!("(no memory for {})", ticker);
            } else {
                println!("{}", context);
            }
        }
        Commands::Score { ticker, sector } => {
            let (adjustment, reasons) = engine.score_adjustment(&ticker, sector.as_deref()).await;
            println!("{}: {:+}", ticker, adjustment);
            for reason in reasons {
                println!("  - {}", reason);
            }
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("Journal entries:    {}", stats.total_entries);
            println!(
                "  by tier:          detailed {} / summary {} / archived {}",
                stats.entries_by_tier[0], stats.entries_by_tier[1], stats.entries_by_tier[2]
            );
            println!("Active principles:  {}", stats.active_principles);
            println!("Active intuitions:  {}", stats.active_intuitions);
            println!("Closed trades:      {}", stats.closed_trades);
        }
    }

    Ok(())
}
