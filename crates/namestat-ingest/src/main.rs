//! Namestat Ingest - baby-name archive import and ranking tool

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use namestat_common::logging::{init_logging, LogConfig, LogLevel};
use namestat_ingest::{IngestConfig, NamesService, PgNameStore, YearRange};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "namestat-ingest")]
#[command(author, version, about = "Baby-name archive import and ranking tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Archive URL or local path (defaults to the configured archive)
    #[arg(short, long)]
    source: Option<String>,

    /// First year to import
    #[arg(long)]
    min_year: Option<i32>,

    /// Last year to import
    #[arg(long)]
    max_year: Option<i32>,

    /// Re-import even if this archive was already imported
    #[arg(short, long)]
    force: bool,
}

impl ImportArgs {
    fn window(&self) -> YearRange {
        YearRange::new(self.min_year, self.max_year)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import the national archive (yobYYYY.txt entries)
    ImportNational(ImportArgs),

    /// Import the state archive (XX.TXT entries)
    ImportState(ImportArgs),

    /// Import the state archive in consecutive year windows
    BackfillState {
        /// Archive URL or local path (defaults to the configured archive)
        #[arg(short, long)]
        source: Option<String>,

        #[arg(long)]
        from: i32,

        #[arg(long)]
        to: i32,

        /// Years per chunk
        #[arg(long, default_value_t = 10)]
        chunk_years: u32,

        #[arg(short, long)]
        force: bool,
    },

    /// Compute national rankings for one year or a range of years
    Rank {
        #[arg(long, conflicts_with_all = ["from", "to"])]
        year: Option<i32>,

        #[arg(long, requires = "to")]
        from: Option<i32>,

        #[arg(long, requires = "from")]
        to: Option<i32>,
    },

    /// Compute rankings within one state for one year
    RankState {
        #[arg(long)]
        year: i32,

        /// Two-letter state code
        #[arg(long)]
        state: String,
    },

    /// List import runs, newest first
    History,

    /// Check whether newer national data is likely published
    Status,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag defaults
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("namestat-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env()?;
    let store = PgNameStore::connect(&config.database).await?;
    store.migrate().await?;
    let service = NamesService::new(Arc::new(store), config)?;

    match cli.command {
        Command::ImportNational(args) => {
            info!("Importing national archive");
            let summary = service
                .import_national(args.source.as_deref(), args.window(), args.force)
                .await?;
            print_json(&summary)?;
        },
        Command::ImportState(args) => {
            info!("Importing state archive");
            let summary = service
                .import_state(args.source.as_deref(), args.window(), args.force)
                .await?;
            print_json(&summary)?;
        },
        Command::BackfillState {
            source,
            from,
            to,
            chunk_years,
            force,
        } => {
            if from > to {
                bail!("--from ({}) must not be after --to ({})", from, to);
            }
            let chunks = YearRange::chunks(from, to, chunk_years);
            let report = service
                .backfill_state(source.as_deref(), &chunks, force)
                .await?;
            print_json(&report)?;
            if report.failed() > 0 {
                bail!("{} of {} chunks failed", report.failed(), report.chunks.len());
            }
        },
        Command::Rank { year, from, to } => match (year, from, to) {
            (Some(year), _, _) => {
                let cohorts = service.rank_year(year).await?;
                print_json(&cohorts)?;
            },
            (None, Some(from), Some(to)) => {
                let years = service.rank_years(from, to).await?;
                print_json(&serde_json::json!({ "years_processed": years }))?;
            },
            _ => bail!("Pass either --year or both --from and --to"),
        },
        Command::RankState { year, state } => {
            let summary = service.rank_state(year, &state).await?;
            print_json(&summary)?;
        },
        Command::History => {
            print_json(&service.import_history().await?)?;
        },
        Command::Status => {
            print_json(&service.update_status().await?)?;
        },
    }

    info!("Done");
    Ok(())
}
