use rusqlite::ErrorCode;
use serde::Serialize;

/// All application errors, categorized by domain.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Feed payload ──
    #[error("Malformed feed payload: {0}")]
    MalformedPayload(String),

    #[error("Feed request failed: {0}")]
    FeedRequest(String),

    #[error("Feed returned HTTP {status}: {message}")]
    FeedStatus { status: u16, message: String },

    // ── Destination schema ──
    #[error("Destination table '{0}' does not exist")]
    DestinationTableMissing(String),

    #[error("Destination table '{table}' is missing required column(s): {}", missing.join(", "))]
    DestinationSchemaMissing { table: String, missing: Vec<String> },

    // ── Merge write ──
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Database error: {0}")]
    Database(String),

    // ── Read path ──
    #[error("Invalid history query: {0}")]
    InvalidQuery(String),

    // ── Files ──
    #[error("Failed to read file: {0}")]
    FileRead(String),

    #[error("Failed to write file: {0}")]
    FileWrite(String),

    // ── Configuration ──
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Serialization ──
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── General ──
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may re-run the same payload after this error.
    ///
    /// The merge is idempotent, so anything that failed before commit
    /// for transport reasons is safe to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ConnectionLost(_) | AppError::FeedRequest(_) => true,
            AppError::FeedStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Classify a rusqlite error raised while merging a batch.
    ///
    /// Constraint failures and an upsert target with no matching unique
    /// index are conflicts the merge policy cannot resolve. Busy, locked
    /// and I/O failures mean the transaction could not be committed.
    pub fn from_write(err: rusqlite::Error) -> Self {
        if is_missing_conflict_target(&err) {
            return AppError::WriteConflict(err.to_string());
        }
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => AppError::WriteConflict(err.to_string()),
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull,
            ) => AppError::ConnectionLost(err.to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

/// SQLite rejects `ON CONFLICT(cols)` at prepare time when no unique index
/// covers `cols`.
fn is_missing_conflict_target(err: &rusqlite::Error) -> bool {
    err.to_string()
        .contains("ON CONFLICT clause does not match any PRIMARY KEY or UNIQUE constraint")
}

/// Serializable error response for HTTP clients.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            AppError::FeedRequest(_) => "FEED_REQUEST",
            AppError::FeedStatus { .. } => "FEED_STATUS",
            AppError::DestinationTableMissing(_) => "DESTINATION_TABLE_MISSING",
            AppError::DestinationSchemaMissing { .. } => "DESTINATION_SCHEMA_MISSING",
            AppError::WriteConflict(_) => "WRITE_CONFLICT",
            AppError::ConnectionLost(_) => "CONNECTION_LOST",
            AppError::Database(_) => "DATABASE",
            AppError::InvalidQuery(_) => "INVALID_QUERY",
            AppError::FileRead(_) => "FILE_READ",
            AppError::FileWrite(_) => "FILE_WRITE",
            AppError::InvalidConfig(_) => "INVALID_CONFIG",
            AppError::Serialization(_) => "SERIALIZATION",
            AppError::Internal(_) => "INTERNAL",
        };
        ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let response = ErrorResponse::from(self);
        response.serialize(serializer)
    }
}

// ── Conversions from external errors ──

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileRead(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::FeedRequest(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::FileWrite(err.to_string())
    }
}
