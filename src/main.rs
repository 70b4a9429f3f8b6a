use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use stockbars_lib::commands;
use stockbars_lib::models::config::AppConfig;
use stockbars_lib::models::history::{HistoryQuery, DEFAULT_LIMIT};
use stockbars_lib::server;

#[derive(Parser, Debug)]
#[command(name = "stockbars", version, about = "Daily price-bar ingestion and history")]
struct Cli {
    /// Overrides STOCKBARS_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the series and archive the raw payload.
    Fetch,
    /// Merge one payload into the destination table.
    Ingest {
        /// Re-ingest an archived payload instead of fetching.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print stored closes, newest first.
    History(RangeArgs),
    /// Write stored closes to CSV and/or a standalone HTML chart.
    Export {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Serve the history page and JSON API.
    Serve,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Inclusive lower bound, YYYY-MM-DD.
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Inclusive upper bound, YYYY-MM-DD.
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,
}

impl From<RangeArgs> for HistoryQuery {
    fn from(args: RangeArgs) -> Self {
        HistoryQuery {
            start_date: args.start,
            end_date: args.end,
            limit: args.limit,
        }
    }
}

fn load_config(db: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    if let Some(path) = db {
        std::env::set_var("STOCKBARS_DB_PATH", path);
    }
    AppConfig::from_env().context("loading configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockbars_lib::init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.db)?;

    let outcome = run(cli.command, &config).await;
    if let Err(err) = &outcome {
        error!("{:#}", err);
    }
    outcome
}

async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Command::Fetch => {
            let path = commands::fetch(config).await?;
            println!("{}", path.display());
        }
        Command::Ingest { file } => {
            let report = commands::ingest(config, file.as_deref())
                .await
                .inspect_err(|e| {
                    if e.is_retryable() {
                        info!("Run failed before commit; the same payload can be re-run");
                    }
                })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::History(range) => {
            let points = commands::history(config, &range.into())?;
            for p in &points {
                println!("{}\t{:.2}", p.date, p.close);
            }
        }
        Command::Export { range, csv, html } => {
            if csv.is_none() && html.is_none() {
                anyhow::bail!("export needs --csv and/or --html");
            }
            let query: HistoryQuery = range.into();
            if let Some(path) = csv {
                commands::export_csv(config, &query, &path)?;
            }
            if let Some(path) = html {
                commands::export_html(config, &query, &path)?;
            }
        }
        Command::Serve => server::serve(config).await?,
    }
    Ok(())
}
