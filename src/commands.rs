use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::data::{feed, storage};
use crate::errors::AppError;
use crate::models::config::AppConfig;
use crate::models::history::{ClosePoint, HistoryQuery, IngestReport};
use crate::pipeline::{self, mapper};
use crate::utils::export;

// ── Feed Commands ──

/// Download the configured series and archive the raw response.
pub async fn fetch(config: &AppConfig) -> Result<PathBuf, AppError> {
    let body = feed::fetch_chart(&config.feed, &config.defaults.symbol).await?;
    feed::archive_payload(&config.archive_dir, &config.defaults.symbol, &body, Local::now())
}

/// Ingest one payload into the destination table.
///
/// With `file` set the archived payload is re-ingested; otherwise the feed
/// is fetched and archived first.
pub async fn ingest(config: &AppConfig, file: Option<&Path>) -> Result<IngestReport, AppError> {
    // 1. Obtain the raw body
    let body = match file {
        Some(path) => {
            info!("Re-ingesting {}", path.display());
            feed::read_archived(path)?
        }
        None => {
            let body = feed::fetch_chart(&config.feed, &config.defaults.symbol).await?;
            feed::archive_payload(&config.archive_dir, &config.defaults.symbol, &body, Local::now())?;
            body
        }
    };

    // 2. Decode before touching the database
    let payload = mapper::parse_payload(&body)?;

    // 3. Map, reconcile, merge, verify
    let mut conn = storage::open_database(&config.db_path)?;
    let report = pipeline::run_ingest(&mut conn, &config.table, &payload, &config.defaults)?;

    info!(
        "Ingested {} ({} mapped, {} written, {} stored)",
        report.symbol, report.mapped, report.written, report.total_rows
    );
    Ok(report)
}

// ── Read Commands ──

/// Stored closes for `query`, newest first.
pub fn history(config: &AppConfig, query: &HistoryQuery) -> Result<Vec<ClosePoint>, AppError> {
    query.validate()?;
    let conn = storage::open_read_only(&config.db_path)?;
    storage::query_history(&conn, &config.table, query)
}

pub fn export_csv(config: &AppConfig, query: &HistoryQuery, path: &Path) -> Result<usize, AppError> {
    let points = history(config, query)?;
    export::write_history_csv(&points, path)?;
    info!("Exported {} closes to {}", points.len(), path.display());
    Ok(points.len())
}

pub fn export_html(config: &AppConfig, query: &HistoryQuery, path: &Path) -> Result<usize, AppError> {
    let points = history(config, query)?;
    export::write_history_html(&config.defaults.symbol, &points, query, path)?;
    info!("Exported chart of {} closes to {}", points.len(), path.display());
    Ok(points.len())
}
