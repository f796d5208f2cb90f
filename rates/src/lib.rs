//! Gera Rates
//!
//! External rate ingestion and currency rate resolution.
//!
//! - Fetchers for central bank daily rates, their average and Bitfinex tickers
//! - Rate source registry with per-source priority and enabled flag
//! - Versioned currency rate mode generations
//! - Direct and cross rate resolution, materialized per run
//!
//! # Example
//!
//! ```rust,ignore
//! use gera_rates::{CurrencyRatesRepository, CurrencyRatesWorker};
//!
//! CurrencyRatesWorker::new(db.clone()).perform().await?;
//! let rate = CurrencyRatesRepository::new(db).find_currency_rate_by_pair(&pair)?;
//! ```

pub mod bitfinex_client;
pub mod cbr_client;
pub mod client;
pub mod error;
pub mod fetchers;
pub mod modes;
pub mod registry;
pub mod repository;
pub mod resolver;

pub use bitfinex_client::BitfinexClient;
pub use cbr_client::CbrClient;
pub use client::{DailyQuote, DailyRates, DailyRatesClient, Ticker, TickerClient};
pub use error::{RatesError, RatesResult};
pub use fetchers::{BitfinexRatesFetcher, CbrAvgRatesFetcher, CbrRatesFetcher, FetchReport, RatesFetcher};
pub use modes::CurrencyRateModes;
pub use registry::{default_sources, RateSourceRegistry, BITFINEX, CBR, CBR_AVG};
pub use repository::{CurrencyRateBuilder, CurrencyRatesReport, CurrencyRatesRepository, CurrencyRatesWorker};
pub use resolver::{resolve, Resolution};

#[cfg(any(test, feature = "test-utils"))]
pub use client::{MockDailyRatesClient, MockDay, MockTickerClient};
