use serde::{Deserialize, Serialize};

/// Raw chart feed response: `{"chart": {"result": [...], "error": ...}}`.
///
/// Every level is optional so that a structurally incomplete payload still
/// deserializes and the mapper can report exactly which part is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSeriesPayload {
    #[serde(default)]
    pub chart: Option<Chart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

/// Error object the feed returns in place of `result`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub meta: Option<SeriesMeta>,
    /// Epoch seconds, one per bar.
    #[serde(default)]
    pub timestamp: Option<Vec<i64>>,
    #[serde(default)]
    pub indicators: Option<Indicators>,
}

/// Instrument metadata. Only `symbol`, `currency` and `previous_close`
/// reach the stored rows; the rest is logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub chart_previous_close: Option<f64>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub exchange_name: Option<String>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub exchange_timezone_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteSeries>,
}

/// Five parallel OHLCV sequences. Any of them may be shorter than the
/// timestamp sequence, and any element may be `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteSeries {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}
