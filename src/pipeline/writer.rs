use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::record::{Column, DayRecord};

use super::reconcile::WritePlan;

/// Bound-parameter ceiling per statement (SQLite's historical
/// `SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_BOUND_PARAMS: usize = 999;

/// Merge `records` into `table` in one transaction.
///
/// Each chunk is a multi-row `INSERT ... ON CONFLICT(key) DO UPDATE` that
/// refreshes only open/high/low/close/volume. Returns rows inserted or
/// updated. On any error the transaction is dropped, which rolls back every
/// chunk already executed.
pub fn write(
    conn: &mut Connection,
    table: &str,
    records: &[DayRecord],
    plan: &WritePlan,
) -> Result<usize, AppError> {
    if records.is_empty() {
        info!("No records to write into {}", table);
        return Ok(0);
    }
    if plan.columns.is_empty() {
        return Err(AppError::Internal("write plan has no columns".to_string()));
    }

    let rows_per_statement = (MAX_BOUND_PARAMS / plan.columns.len()).max(1);
    let tx = conn.transaction().map_err(AppError::from_write)?;

    let mut affected = 0;
    for chunk in records.chunks(rows_per_statement) {
        let sql = upsert_sql(table, plan, chunk.len());
        let values = chunk
            .iter()
            .flat_map(|r| plan.columns.iter().map(move |c| r.value(*c)));
        affected += tx
            .execute(&sql, params_from_iter(values))
            .map_err(AppError::from_write)?;
        debug!("Merged chunk of {} rows into {}", chunk.len(), table);
    }

    tx.commit().map_err(|e| match AppError::from_write(e) {
        AppError::Database(msg) => AppError::ConnectionLost(msg),
        other => other,
    })?;

    info!("Committed {} row(s) into {}", affected, table);
    Ok(affected)
}

/// `INSERT INTO "t" (cols) VALUES (?, ..), .. ON CONFLICT(key) DO UPDATE SET ..`
pub fn upsert_sql(table: &str, plan: &WritePlan, rows: usize) -> String {
    let columns = join_quoted(plan.columns.iter().copied());
    let row = format!("({})", vec!["?"; plan.columns.len()].join(", "));
    let values = vec![row; rows].join(", ");
    let key = join_quoted(plan.conflict_key.iter().copied());
    let updates = plan
        .update_columns()
        .map(|c| format!("\"{0}\" = excluded.\"{0}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {} ON CONFLICT({}) DO UPDATE SET {}",
        table, columns, values, key, updates
    )
}

fn join_quoted(columns: impl Iterator<Item = Column>) -> String {
    columns
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
