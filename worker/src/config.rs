//! Worker configuration.

use std::time::Duration;

use gera_rates::{bitfinex_client, cbr_client, fetchers};

/// Central bank fetcher configuration.
#[derive(Debug, Clone)]
pub struct CbrConfig {
    /// Base URL of the daily rates service.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Abort the run when the publication date differs from the requested one.
    pub strict_dates: bool,
}

impl Default for CbrConfig {
    fn default() -> Self {
        Self {
            base_url: cbr_client::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            strict_dates: false,
        }
    }
}

/// Bitfinex fetcher configuration.
#[derive(Debug, Clone)]
pub struct BitfinexConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Tickers to load when tradable.
    pub tickers: Vec<String>,
    /// How long the cached tradable set stays fresh.
    pub tickers_refresh: Duration,
}

impl Default for BitfinexConfig {
    fn default() -> Self {
        Self {
            base_url: bitfinex_client::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            tickers: fetchers::DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            tickers_refresh: Duration::from_secs(fetchers::SUPPORTED_TICKERS_UPDATE_PERIOD_SECS as u64),
        }
    }
}

/// Main worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cbr: CbrConfig,
    pub bitfinex: BitfinexConfig,
    /// Also run the standalone averaged-rate fetcher after the bank fetch.
    pub cbr_avg_legacy: bool,
    /// Log level.
    pub log_level: String,
    /// Emit logs as JSON.
    pub log_json: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cbr: CbrConfig::default(),
            bitfinex: BitfinexConfig::default(),
            cbr_avg_legacy: false,
            log_level: "info".to_string(),
            log_json: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("GERA_CBR_URL") {
            config.cbr.base_url = url;
        }

        if let Some(strict) = lookup("GERA_CBR_STRICT_DATES").as_deref().and_then(parse_flag) {
            config.cbr.strict_dates = strict;
        }

        if let Some(secs) = lookup("GERA_CBR_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.cbr.timeout = Duration::from_secs(secs);
        }

        if let Some(url) = lookup("GERA_BITFINEX_URL") {
            config.bitfinex.base_url = url;
        }

        if let Some(tickers) = lookup("GERA_BITFINEX_TICKERS") {
            config.bitfinex.tickers = tickers
                .split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }

        if let Some(secs) = lookup("GERA_TICKERS_REFRESH_SECS").and_then(|s| s.parse().ok()) {
            config.bitfinex.tickers_refresh = Duration::from_secs(secs);
        }

        if let Some(legacy) = lookup("GERA_CBR_AVG_LEGACY").as_deref().and_then(parse_flag) {
            config.cbr_avg_legacy = legacy;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(json) = lookup("GERA_LOG_JSON").as_deref().and_then(parse_flag) {
            config.log_json = json;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cbr.base_url.is_empty() {
            return Err("Central bank URL cannot be empty".to_string());
        }

        if self.bitfinex.base_url.is_empty() {
            return Err("Bitfinex URL cannot be empty".to_string());
        }

        if self.cbr.timeout.is_zero() || self.bitfinex.timeout.is_zero() {
            return Err("Request timeout cannot be 0".to_string());
        }

        if self.bitfinex.tickers_refresh.is_zero() {
            return Err("Ticker refresh period cannot be 0".to_string());
        }

        if let Some(ticker) = self.bitfinex.tickers.iter().find(|t| t.len() != 6) {
            return Err(format!("Ticker {ticker:?} must have 6 characters"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bitfinex.tickers.len(), 6);
        assert!(!config.cbr.strict_dates);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GERA_CBR_STRICT_DATES", "true"),
            ("GERA_CBR_TIMEOUT_SECS", "3"),
            ("GERA_BITFINEX_TICKERS", "BTCUSD, ethusd,"),
            ("GERA_CBR_AVG_LEGACY", "1"),
            ("GERA_LOG_JSON", "off"),
            ("GERA_TICKERS_REFRESH_SECS", "not a number"),
        ]
        .into_iter()
        .collect();
        let config = WorkerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.cbr.strict_dates);
        assert_eq!(config.cbr.timeout, Duration::from_secs(3));
        assert_eq!(config.bitfinex.tickers, vec!["btcusd", "ethusd"]);
        assert_eq!(config.bitfinex.tickers_refresh, Duration::from_secs(86400));
        assert!(config.cbr_avg_legacy);
        assert!(!config.log_json);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = WorkerConfig::default();
        config.bitfinex.tickers = vec!["btc".into()];
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.cbr.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
