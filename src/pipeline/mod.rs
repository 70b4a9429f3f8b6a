pub mod mapper;
pub mod reconcile;
pub mod writer;

use rusqlite::Connection;
use tracing::info;

use crate::data::storage;
use crate::errors::AppError;
use crate::models::config::SeriesDefaults;
use crate::models::history::IngestReport;
use crate::models::payload::RawSeriesPayload;

/// Rows reported back after a run.
const VERIFY_RECENT: u32 = 5;

/// One ingest run: map, snapshot and reconcile the schema, merge, verify.
///
/// Nothing is written unless mapping and reconciliation both succeed.
/// A failed run leaves the table untouched and may be re-run with the same
/// payload.
pub fn run_ingest(
    conn: &mut Connection,
    table: &str,
    payload: &RawSeriesPayload,
    defaults: &SeriesDefaults,
) -> Result<IngestReport, AppError> {
    let records = mapper::map_payload(payload, defaults)?;
    info!("Transformed {} rows", records.len());

    let schema = storage::inspect_schema(conn, table)?;
    let plan = reconcile::reconcile(&schema)?;

    let written = writer::write(conn, table, &records, &plan)?;

    let total_rows = storage::count_rows(conn, table)?;
    let recent = storage::recent_closes(conn, table, VERIFY_RECENT)?;
    info!("Total rows: {}", total_rows);
    info!("Recent data: {:?}", recent);

    let symbol = records
        .first()
        .map_or_else(|| defaults.symbol.clone(), |r| r.symbol.clone());

    Ok(IngestReport {
        symbol,
        mapped: records.len(),
        written,
        total_rows,
        recent,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::storage::REFERENCE_SCHEMA;

    fn payload(closes: serde_json::Value) -> RawSeriesPayload {
        serde_json::from_value(json!({
            "chart": { "result": [{
                "meta": { "symbol": "AAPL", "currency": "USD", "previousClose": 149.0 },
                "timestamp": [1700000000, 1700086400],
                "indicators": { "quote": [{ "close": closes, "volume": [1000, 0] }] }
            }]}
        }))
        .unwrap()
    }

    #[test]
    fn test_run_twice_same_state() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(REFERENCE_SCHEMA).unwrap();
        let p = payload(json!([150.0]));

        let first = run_ingest(&mut conn, "apple_stock", &p, &SeriesDefaults::default()).unwrap();
        assert_eq!(first.mapped, 2);
        assert_eq!(first.written, 2);
        assert_eq!(first.total_rows, 2);

        let second = run_ingest(&mut conn, "apple_stock", &p, &SeriesDefaults::default()).unwrap();
        assert_eq!(second.total_rows, 2);
        assert_eq!(second.recent, first.recent);
        assert_eq!(
            first.recent,
            vec![
                ("2023-11-15".to_string(), None),
                ("2023-11-14".to_string(), Some(150.0)),
            ]
        );
    }

    #[test]
    fn test_revised_payload_fills_missing_close() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(REFERENCE_SCHEMA).unwrap();
        run_ingest(&mut conn, "apple_stock", &payload(json!([150.0])), &SeriesDefaults::default())
            .unwrap();
        let report = run_ingest(
            &mut conn,
            "apple_stock",
            &payload(json!([150.0, 152.25])),
            &SeriesDefaults::default(),
        )
        .unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.recent[0], ("2023-11-15".to_string(), Some(152.25)));
    }

    #[test]
    fn test_missing_table_fails_before_write() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = run_ingest(
            &mut conn,
            "apple_stock",
            &payload(json!([150.0])),
            &SeriesDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::DestinationTableMissing(_)));
    }

    #[test]
    fn test_missing_mandatory_column_writes_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE apple_stock (timestamp INTEGER, date TEXT, open REAL, high REAL,
                low REAL, close REAL, symbol TEXT, UNIQUE (symbol, date));",
        )
        .unwrap();
        let err = run_ingest(
            &mut conn,
            "apple_stock",
            &payload(json!([150.0])),
            &SeriesDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::DestinationSchemaMissing { .. }));
        assert_eq!(storage::count_rows(&conn, "apple_stock").unwrap(), 0);
    }

    #[test]
    fn test_table_without_previous_close_still_ingests() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE apple_stock (timestamp INTEGER, date TEXT, open REAL, high REAL,
                low REAL, close REAL, volume INTEGER, symbol TEXT, currency TEXT,
                UNIQUE (symbol, date));",
        )
        .unwrap();
        let report = run_ingest(
            &mut conn,
            "apple_stock",
            &payload(json!([150.0])),
            &SeriesDefaults::default(),
        )
        .unwrap();
        assert_eq!(report.written, 2);
    }
}
