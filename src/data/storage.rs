use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::errors::AppError;
use crate::models::history::{ClosePoint, HistoryQuery};
use crate::pipeline::reconcile::DestinationSchema;

/// Reference DDL for the destination table. Never applied by the pipeline.
pub const REFERENCE_SCHEMA: &str = include_str!("../../schema/daily_bars.sql");

/// Open an existing database for read/write. The file is not created.
pub fn open_database(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::ConnectionLost(format!("{}: {}", path.display(), e)))?;
    info!("Database ready at {}", path.display());
    Ok(conn)
}

/// Open an existing database read-only, for the read service.
pub fn open_read_only(path: &Path) -> Result<Connection, AppError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::ConnectionLost(format!("{}: {}", path.display(), e)))
}

/// Snapshot the destination's column set.
pub fn inspect_schema(conn: &Connection, table: &str) -> Result<DestinationSchema, AppError> {
    let exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();

    if !exists {
        return Ok(DestinationSchema::Missing {
            table: table.to_string(),
        });
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    info!("Table {} columns: {}", table, columns.join(", "));
    Ok(DestinationSchema::present(table, columns))
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, AppError> {
    let n = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })?;
    Ok(n)
}

/// The `limit` most recent days, newest first, including days with no close.
pub fn recent_closes(
    conn: &Connection,
    table: &str,
    limit: u32,
) -> Result<Vec<(String, Option<f64>)>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT date, close FROM \"{}\" ORDER BY date DESC LIMIT ?1",
        table
    ))?;
    let rows = stmt
        .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stored closes in `[start_date, end_date]`, newest first, at most
/// `limit` rows. Days without a close are skipped.
pub fn query_history(
    conn: &Connection,
    table: &str,
    query: &HistoryQuery,
) -> Result<Vec<ClosePoint>, AppError> {
    query.validate()?;

    let mut sql = format!(
        "SELECT DISTINCT date, close FROM \"{}\" WHERE close IS NOT NULL",
        table
    );
    let mut bound: Vec<Value> = Vec::new();

    if let Some(start) = query.start_date {
        sql.push_str(" AND date >= ?");
        bound.push(Value::Text(start.format("%Y-%m-%d").to_string()));
    }
    if let Some(end) = query.end_date {
        sql.push_str(" AND date <= ?");
        bound.push(Value::Text(end.format("%Y-%m-%d").to_string()));
    }
    sql.push_str(" ORDER BY date DESC LIMIT ?");
    bound.push(Value::Integer(i64::from(query.limit)));

    let mut stmt = conn.prepare(&sql)?;
    let points = stmt
        .query_map(params_from_iter(bound), |row| {
            Ok(ClosePoint {
                date: row.get(0)?,
                close: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(points)
}
