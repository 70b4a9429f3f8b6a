use chrono::DateTime;
use tracing::debug;

use crate::errors::AppError;
use crate::models::config::SeriesDefaults;
use crate::models::payload::{ChartResult, QuoteSeries, RawSeriesPayload};
use crate::models::record::DayRecord;

/// Parse a raw feed response body.
///
/// Shape errors (wrong JSON types, truncated body) are reported as
/// `MalformedPayload`, same as missing keys.
pub fn parse_payload(body: &str) -> Result<RawSeriesPayload, AppError> {
    serde_json::from_str(body).map_err(|e| AppError::MalformedPayload(e.to_string()))
}

/// Flatten a chart payload into one record per timestamp, in feed order.
///
/// Dates are calendar days in UTC. Each OHLCV field is looked up on its own:
/// a short `volume` sequence never affects whether `close` is populated.
pub fn map_payload(
    payload: &RawSeriesPayload,
    defaults: &SeriesDefaults,
) -> Result<Vec<DayRecord>, AppError> {
    let result = first_result(payload)?;
    let meta = result
        .meta
        .as_ref()
        .ok_or_else(|| AppError::MalformedPayload("chart.result[0].meta is missing".to_string()))?;
    let timestamps = result.timestamp.as_ref().ok_or_else(|| {
        AppError::MalformedPayload("chart.result[0].timestamp is missing".to_string())
    })?;

    let empty = QuoteSeries::default();
    let quote = result
        .indicators
        .as_ref()
        .and_then(|ind| ind.quote.first())
        .unwrap_or(&empty);

    // Batch-level fallbacks, resolved once.
    let symbol = meta
        .symbol
        .clone()
        .unwrap_or_else(|| defaults.symbol.clone());
    let currency = meta
        .currency
        .clone()
        .unwrap_or_else(|| defaults.currency.clone());
    let previous_close = meta.previous_close;

    debug!(
        "Mapping {} bars for {} ({} on {})",
        timestamps.len(),
        symbol,
        meta.instrument_type.as_deref().unwrap_or("unknown type"),
        meta.exchange_name.as_deref().unwrap_or("unknown exchange"),
    );

    timestamps
        .iter()
        .enumerate()
        .map(|(i, &ts)| {
            let date = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| {
                    AppError::MalformedPayload(format!("timestamp {} at index {} is out of range", ts, i))
                })?
                .date_naive();

            Ok(DayRecord {
                timestamp: ts,
                date,
                open: at(&quote.open, i),
                high: at(&quote.high, i),
                low: at(&quote.low, i),
                close: at(&quote.close, i),
                volume: volume_at(&quote.volume, i),
                symbol: symbol.clone(),
                currency: currency.clone(),
                previous_close,
            })
        })
        .collect()
}

fn first_result(payload: &RawSeriesPayload) -> Result<&ChartResult, AppError> {
    let chart = payload
        .chart
        .as_ref()
        .ok_or_else(|| AppError::MalformedPayload("'chart' is missing".to_string()))?;

    match chart.result.as_ref().and_then(|r| r.first()) {
        Some(result) => Ok(result),
        None => {
            let reason = chart
                .error
                .as_ref()
                .map(|e| {
                    format!(
                        "feed error {}: {}",
                        e.code.as_deref().unwrap_or("unknown"),
                        e.description.as_deref().unwrap_or("no description")
                    )
                })
                .unwrap_or_else(|| "chart.result[0] is missing".to_string());
            Err(AppError::MalformedPayload(reason))
        }
    }
}

/// Value at `i`, or `None` when the series is too short or holds `null`.
fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten()
}

/// Integer part of the volume at `i`; missing, null, zero or negative is 0.
fn volume_at(series: &[Option<f64>], i: usize) -> u64 {
    match at(series, i) {
        Some(v) if v.is_finite() && v >= 1.0 => v.trunc() as u64,
        _ => 0,
    }
}
