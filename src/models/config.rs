use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const DEFAULT_TABLE: &str = "apple_stock";
pub const DEFAULT_SYMBOL: &str = "AAPL";
pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_FEED_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_RANGE: &str = "1mo";
pub const DEFAULT_INTERVAL: &str = "1d";
pub const DEFAULT_ARCHIVE_DIR: &str = "./data";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Fallbacks the row mapper applies when the feed's `meta` omits a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDefaults {
    pub symbol: String,
    /// Three-letter ISO currency code.
    pub currency: String,
}

impl Default for SeriesDefaults {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Chart feed request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    /// Bar size, e.g. `1d`.
    pub interval: String,
    /// Lookback window, e.g. `1mo`, `1y`.
    pub range: String,
}

/// Process configuration, built once at startup and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub table: String,
    pub defaults: SeriesDefaults,
    pub feed: FeedConfig,
    pub archive_dir: PathBuf,
    pub bind: String,
}

impl AppConfig {
    /// Load `.env` (if any), read `STOCKBARS_*` variables and validate.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("STOCKBARS_DB_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::InvalidConfig("STOCKBARS_DB_PATH is not set".to_string()))?;

        let config = AppConfig {
            db_path: PathBuf::from(db_path),
            table: env_str("STOCKBARS_TABLE", DEFAULT_TABLE),
            defaults: SeriesDefaults {
                symbol: env_str("STOCKBARS_SYMBOL", DEFAULT_SYMBOL),
                currency: env_str("STOCKBARS_CURRENCY", DEFAULT_CURRENCY),
            },
            feed: FeedConfig {
                base_url: env_str("STOCKBARS_FEED_URL", DEFAULT_FEED_URL),
                interval: env_str("STOCKBARS_INTERVAL", DEFAULT_INTERVAL),
                range: env_str("STOCKBARS_RANGE", DEFAULT_RANGE),
            },
            archive_dir: PathBuf::from(env_str("STOCKBARS_ARCHIVE_DIR", DEFAULT_ARCHIVE_DIR)),
            bind: env_str("STOCKBARS_BIND", DEFAULT_BIND),
        };
        config.validate()?;
        Ok(config)
    }

    /// Config pointing at `db_path` with every other field at its default.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        AppConfig {
            db_path: db_path.into(),
            table: DEFAULT_TABLE.to_string(),
            defaults: SeriesDefaults::default(),
            feed: FeedConfig {
                base_url: DEFAULT_FEED_URL.to_string(),
                interval: DEFAULT_INTERVAL.to_string(),
                range: DEFAULT_RANGE.to_string(),
            },
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            bind: DEFAULT_BIND.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::InvalidConfig("database path is empty".to_string()));
        }
        // The table name is interpolated into SQL, so only plain identifiers pass.
        if !is_identifier(&self.table) {
            return Err(AppError::InvalidConfig(format!(
                "table name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.table
            )));
        }
        if self.defaults.symbol.trim().is_empty() {
            return Err(AppError::InvalidConfig("symbol is empty".to_string()));
        }
        let currency = &self.defaults.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(AppError::InvalidConfig(format!(
                "currency '{}' must be a three-letter uppercase code",
                currency
            )));
        }
        if self.feed.interval.is_empty() || self.feed.range.is_empty() {
            return Err(AppError::InvalidConfig(
                "feed interval and range must be set".to_string(),
            ));
        }
        self.bind.parse::<SocketAddr>().map_err(|e| {
            AppError::InvalidConfig(format!("bind address '{}': {}", self.bind, e))
        })?;
        Ok(())
    }
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::with_db_path("stock.db");
        assert!(config.validate().is_ok());
        assert_eq!(config.table, "apple_stock");
        assert_eq!(config.defaults.symbol, "AAPL");
    }

    #[test]
    fn test_rejects_injected_table_name() {
        let mut config = AppConfig::with_db_path("stock.db");
        config.table = "apple_stock; DROP TABLE x".to_string();
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_currency() {
        let mut config = AppConfig::with_db_path("stock.db");
        config.defaults.currency = "usd".to_string();
        assert!(config.validate().is_err());
        config.defaults.currency = "USDT".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_bind() {
        let mut config = AppConfig::with_db_path("stock.db");
        config.bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier() {
        assert!(is_identifier("apple_stock"));
        assert!(is_identifier("_bars2"));
        assert!(!is_identifier("2bars"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("bars-daily"));
    }
}
