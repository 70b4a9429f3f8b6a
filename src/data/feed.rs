use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::config::FeedConfig;

/// The chart endpoint rejects requests without a browser-like agent.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest slice of an error body echoed into the error message.
const BODY_PREVIEW: usize = 200;

/// Download the raw chart response for `symbol`.
///
/// The body is returned only if the status is 2xx, it is non-blank and it
/// parses as JSON. Shape checks are left to the mapper.
pub async fn fetch_chart(feed: &FeedConfig, symbol: &str) -> Result<String, AppError> {
    let url = format!("{}/{}", feed.base_url.trim_end_matches('/'), symbol);
    info!(
        "Fetching {} (interval={}, range={})",
        url, feed.interval, feed.range
    );

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let resp = client
        .get(&url)
        .query(&[
            ("interval", feed.interval.as_str()),
            ("range", feed.range.as_str()),
        ])
        .send()
        .await?;

    let status = resp.status();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string();
    info!("Feed responded with HTTP {} ({})", status, content_type);

    let body = resp.text().await?;

    if !status.is_success() {
        warn!("Feed request for {} failed with HTTP {}", symbol, status);
        return Err(AppError::FeedStatus {
            status: status.as_u16(),
            message: body.chars().take(BODY_PREVIEW).collect(),
        });
    }

    if body.trim().is_empty() {
        return Err(AppError::MalformedPayload("empty response from feed".to_string()));
    }

    serde_json::from_str::<serde_json::Value>(&body).map_err(|e| {
        AppError::MalformedPayload(format!("feed response is not JSON: {}", e))
    })?;

    Ok(body)
}

/// Write the raw response to `dir/{symbol}_stock_YYYYMMDD_HHMM.json`.
///
/// Each run gets its own file so earlier payloads stay available for
/// re-ingest. Returns the path written.
pub fn archive_payload(
    dir: &Path,
    symbol: &str,
    body: &str,
    at: DateTime<Local>,
) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::FileWrite(format!("{}: {}", dir.display(), e)))?;

    let value: serde_json::Value = serde_json::from_str(body)?;
    let pretty = serde_json::to_string_pretty(&value)?;

    let filename = format!(
        "{}_stock_{}.json",
        symbol.to_lowercase(),
        at.format("%Y%m%d_%H%M")
    );
    let path = dir.join(filename);
    std::fs::write(&path, pretty)
        .map_err(|e| AppError::FileWrite(format!("{}: {}", path.display(), e)))?;

    info!("Saved raw payload to {}", path.display());
    Ok(path)
}

/// Read a previously archived payload.
pub fn read_archived(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path)
        .map_err(|e| AppError::FileRead(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/chart_aapl_1mo.json");

    fn feed_for(server: &MockServer) -> FeedConfig {
        FeedConfig {
            base_url: format!("{}/v8/finance/chart/", server.uri()),
            interval: "1d".to_string(),
            range: "1mo".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_params_and_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .and(query_param("interval", "1d"))
            .and(query_param("range", "1mo"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetch_chart(&feed_for(&server), "AAPL").await.unwrap();
        assert_eq!(body, FIXTURE);
    }

    #[tokio::test]
    async fn test_rate_limited_is_retryable_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let err = fetch_chart(&feed_for(&server), "AAPL").await.unwrap_err();
        match &err {
            AppError::FeedStatus { status, message } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "Too Many Requests");
            }
            other => panic!("expected FeedStatus, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_blank_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&server)
            .await;

        let err = fetch_chart(&feed_for(&server), "AAPL").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_html_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>consent</html>"))
            .mount(&server)
            .await;

        let err = fetch_chart(&feed_for(&server), "AAPL").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn test_archive_names_file_by_minute() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2026, 2, 18, 15, 28, 41).unwrap();
        let written = archive_payload(dir.path(), "AAPL", FIXTURE, at).unwrap();

        assert_eq!(
            written.file_name().unwrap().to_str().unwrap(),
            "aapl_stock_20260218_1528.json"
        );
        let round: serde_json::Value =
            serde_json::from_str(&read_archived(&written).unwrap()).unwrap();
        let original: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(round, original);
    }

    #[test]
    fn test_read_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_archived(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, AppError::FileRead(_)));
    }
}
