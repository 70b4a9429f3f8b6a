use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::AppError;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

/// Read-side range query. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// HTML date inputs submit `start_date=` when left empty.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl HistoryQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AppError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::InvalidQuery(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    /// Human-readable summary shown under the chart.
    pub fn describe(&self, shown: usize) -> String {
        let start = self
            .start_date
            .map_or_else(|| "earliest".to_string(), |d| d.to_string());
        let end = self
            .end_date
            .map_or_else(|| "latest".to_string(), |d| d.to_string());
        format!("Date range: {} to {} (showing {} records)", start, end, shown)
    }
}

/// A stored day's closing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Outcome of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub symbol: String,
    pub mapped: usize,
    pub written: usize,
    pub total_rows: i64,
    /// Most recent stored `(date, close)` pairs, newest first.
    pub recent: Vec<(String, Option<f64>)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        let mut q = HistoryQuery::default();
        assert!(q.validate().is_ok());
        q.limit = 0;
        assert!(matches!(q.validate(), Err(AppError::InvalidQuery(_))));
        q.limit = 1001;
        assert!(q.validate().is_err());
        q.limit = 1000;
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let q = HistoryQuery {
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            limit: 10,
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_blank_dates_deserialize_as_none() {
        let q: HistoryQuery =
            serde_json::from_str(r#"{"start_date": "", "end_date": "2024-01-31"}"#).unwrap();
        assert_eq!(q.start_date, None);
        assert_eq!(q.end_date, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(q.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_describe() {
        let q = HistoryQuery::default();
        assert_eq!(
            q.describe(3),
            "Date range: earliest to latest (showing 3 records)"
        );
    }
}
