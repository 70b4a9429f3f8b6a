use chrono::NaiveDate;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// One normalized trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    /// Zero means "no trading reported", never "missing".
    pub volume: u64,
    pub symbol: String,
    pub currency: String,
    /// Carried from the feed metadata; the same on every record of a batch.
    pub previous_close: Option<f64>,
}

impl DayRecord {
    /// SQL value bound for `column`.
    pub fn value(&self, column: Column) -> Value {
        match column {
            Column::Timestamp => Value::Integer(self.timestamp),
            Column::Date => Value::Text(self.date.format("%Y-%m-%d").to_string()),
            Column::Open => real(self.open),
            Column::High => real(self.high),
            Column::Low => real(self.low),
            Column::Close => real(self.close),
            Column::Volume => Value::Integer(i64::try_from(self.volume).unwrap_or(i64::MAX)),
            Column::Symbol => Value::Text(self.symbol.clone()),
            Column::Currency => Value::Text(self.currency.clone()),
            Column::PreviousClose => real(self.previous_close),
        }
    }
}

fn real(v: Option<f64>) -> Value {
    v.map_or(Value::Null, Value::Real)
}

/// Columns the merge writer knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Timestamp,
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
    Symbol,
    Currency,
    PreviousClose,
}

impl Column {
    /// Always written; the destination must have all of them.
    pub const MANDATORY: [Column; 7] = [
        Column::Timestamp,
        Column::Date,
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];

    /// Written only when the destination has them, in this order.
    pub const OPTIONAL: [Column; 3] = [Column::Symbol, Column::Currency, Column::PreviousClose];

    /// Overwritten when an incoming row collides with a stored one.
    pub const MUTABLE: [Column; 5] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Timestamp => "timestamp",
            Column::Date => "date",
            Column::Open => "open",
            Column::High => "high",
            Column::Low => "low",
            Column::Close => "close",
            Column::Volume => "volume",
            Column::Symbol => "symbol",
            Column::Currency => "currency",
            Column::PreviousClose => "previous_close",
        }
    }

    pub fn is_mutable(&self) -> bool {
        Column::MUTABLE.contains(self)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Column::Timestamp),
            "date" => Ok(Column::Date),
            "open" => Ok(Column::Open),
            "high" => Ok(Column::High),
            "low" => Ok(Column::Low),
            "close" => Ok(Column::Close),
            "volume" => Ok(Column::Volume),
            "symbol" => Ok(Column::Symbol),
            "currency" => Ok(Column::Currency),
            "previous_close" => Ok(Column::PreviousClose),
            _ => Err(format!("Unknown column: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DayRecord {
        DayRecord {
            timestamp: 1_700_000_000,
            date: NaiveDate::from_ymd_opt(2023, 11, 14).unwrap(),
            open: Some(149.5),
            high: None,
            low: Some(148.0),
            close: Some(150.0),
            volume: 1000,
            symbol: "AAPL".to_string(),
            currency: "USD".to_string(),
            previous_close: None,
        }
    }

    #[test]
    fn test_values_by_column() {
        let r = sample();
        assert_eq!(r.value(Column::Timestamp), Value::Integer(1_700_000_000));
        assert_eq!(r.value(Column::Date), Value::Text("2023-11-14".to_string()));
        assert_eq!(r.value(Column::High), Value::Null);
        assert_eq!(r.value(Column::Close), Value::Real(150.0));
        assert_eq!(r.value(Column::Volume), Value::Integer(1000));
        assert_eq!(r.value(Column::PreviousClose), Value::Null);
    }

    #[test]
    fn test_column_names_round_trip_case_insensitively() {
        for col in Column::MANDATORY.iter().chain(Column::OPTIONAL.iter()) {
            assert_eq!(col.as_str().to_uppercase().parse::<Column>(), Ok(*col));
        }
        assert!("adj_close".parse::<Column>().is_err());
    }

    #[test]
    fn test_identity_columns_are_not_mutable() {
        assert!(!Column::Timestamp.is_mutable());
        assert!(!Column::Date.is_mutable());
        assert!(!Column::Symbol.is_mutable());
        assert!(Column::Close.is_mutable());
    }
}
