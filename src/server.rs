use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::data::storage;
use crate::errors::{AppError, ErrorResponse};
use crate::models::config::AppConfig;
use crate::models::history::{ClosePoint, HistoryQuery};
use crate::utils::export;

/// Shared state for the read service. Holds a read-only connection.
pub struct ReadState {
    pub db: Mutex<Connection>,
    pub table: String,
    pub symbol: String,
}

pub fn router(state: Arc<ReadState>) -> Router {
    Router::new()
        .route("/", get(history_page))
        .route("/api/history", get(history_json))
        .route("/health", get(health))
        .layer(cors())
        .with_state(state)
}

/// Browser dev origins only, GET only.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

/// Serve the read API until Ctrl+C.
pub async fn serve(config: &AppConfig) -> Result<(), AppError> {
    let conn = storage::open_read_only(&config.db_path)?;
    let state = Arc::new(ReadState {
        db: Mutex::new(conn),
        table: config.table.clone(),
        symbol: config.defaults.symbol.clone(),
    });

    let addr: SocketAddr = config
        .bind
        .parse()
        .map_err(|e| AppError::InvalidConfig(format!("bind address '{}': {}", config.bind, e)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Internal(format!("cannot bind {}: {}", addr, e)))?;

    info!("Serving {} history on http://{}", config.defaults.symbol, addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Ctrl+C handler unavailable; stopping immediately");
    }
    info!("Shutdown signal received");
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn history_page(
    State(state): State<Arc<ReadState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Html<String>, AppError> {
    let query = parse_query(query)?;
    let points = load(&state, &query).await?;
    Ok(Html(export::render_history_page(&state.symbol, &points, &query)))
}

async fn history_json(
    State(state): State<Arc<ReadState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<ClosePoint>>, AppError> {
    let query = parse_query(query)?;
    Ok(Json(load(&state, &query).await?))
}

fn parse_query(query: Result<Query<HistoryQuery>, QueryRejection>) -> Result<HistoryQuery, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidQuery(e.body_text()))?;
    query.validate()?;
    Ok(query)
}

async fn load(state: &ReadState, query: &HistoryQuery) -> Result<Vec<ClosePoint>, AppError> {
    let db = state.db.lock().await;
    storage::query_history(&db, &state.table, query)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            AppError::ConnectionLost(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Read request failed: {}", self);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::data::storage::REFERENCE_SCHEMA;

    fn app(with_table: bool) -> Router {
        let conn = Connection::open_in_memory().unwrap();
        if with_table {
            conn.execute_batch(REFERENCE_SCHEMA).unwrap();
            conn.execute_batch(
                "INSERT INTO apple_stock (timestamp, date, close, volume) VALUES
                    (1, '2024-01-02', 185.64, 10),
                    (2, '2024-01-03', 184.25, 10),
                    (3, '2024-01-04', 181.91, 10);",
            )
            .unwrap();
        }
        router(Arc::new(ReadState {
            db: Mutex::new(conn),
            table: "apple_stock".to_string(),
            symbol: "AAPL".to_string(),
        }))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_json_history_descending() {
        let (status, body) = get(app(true), "/api/history?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let points: Vec<ClosePoint> = serde_json::from_str(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date.to_string(), "2024-01-04");
        assert_eq!(points[1].date.to_string(), "2024-01-03");
    }

    #[tokio::test]
    async fn test_page_accepts_blank_form_fields() {
        let (status, body) = get(app(true), "/?start_date=&end_date=&limit=50").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<svg"));
        assert!(body.contains("showing 3 records"));
    }

    #[tokio::test]
    async fn test_bad_limit_is_400() {
        let (status, body) = get(app(true), "/api/history?limit=5000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("INVALID_QUERY"));
    }

    #[tokio::test]
    async fn test_bad_date_is_400() {
        let (status, body) = get(app(true), "/api/history?start_date=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("INVALID_QUERY"));
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error_not_an_empty_chart() {
        let (status, body) = get(app(false), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("DATABASE"));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app(false), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ok"));
    }
}
