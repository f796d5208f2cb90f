//! Upstream quote clients.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::RatesResult;

/// One currency entry of a daily bank publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuote {
    pub char_code: String,
    /// Units of the currency the value is quoted for.
    pub nominal: Decimal,
    pub value: Decimal,
}

/// A daily bank publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRates {
    /// Effective date stated by the publication.
    pub date: NaiveDate,
    /// Quotes keyed by the bank's internal valute id.
    pub quotes: BTreeMap<String, DailyQuote>,
}

impl DailyRates {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            quotes: BTreeMap::new(),
        }
    }

    pub fn with_quote(mut self, valute_id: &str, char_code: &str, nominal: Decimal, value: Decimal) -> Self {
        self.quotes.insert(
            valute_id.to_string(),
            DailyQuote {
                char_code: char_code.to_string(),
                nominal,
                value,
            },
        );
        self
    }

    pub fn quote(&self, valute_id: &str) -> Option<&DailyQuote> {
        self.quotes.get(valute_id)
    }
}

/// Source of daily bank rates.
#[async_trait]
pub trait DailyRatesClient: Send + Sync {
    /// Fetch the publication requested for `date`.
    async fn fetch_daily(&self, date: NaiveDate) -> RatesResult<DailyRates>;
}

/// Exchange ticker quote. All fields arrive as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ticker {
    pub mid: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last_price: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub volume: Decimal,
    pub timestamp: Decimal,
}

/// Source of exchange tickers.
#[async_trait]
pub trait TickerClient: Send + Sync {
    /// Tradable symbols, lowercase (`btcusd`).
    async fn fetch_symbols(&self) -> RatesResult<Vec<String>>;

    async fn fetch_ticker(&self, symbol: &str) -> RatesResult<Ticker>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockDailyRatesClient, MockDay, MockTickerClient};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dashmap::{DashMap, DashSet};

    use super::*;
    use crate::error::RatesError;

    /// Scripted answer for one requested day.
    #[derive(Debug, Clone)]
    pub enum MockDay {
        Rates(DailyRates),
        RedirectLoop,
        Unavailable,
    }

    /// Daily rates client answering from memory.
    #[derive(Default)]
    pub struct MockDailyRatesClient {
        days: DashMap<NaiveDate, MockDay>,
        calls: AtomicUsize,
    }

    impl MockDailyRatesClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_day(&self, date: NaiveDate, day: MockDay) {
            self.days.insert(date, day);
        }

        pub fn set_rates(&self, date: NaiveDate, rates: DailyRates) {
            self.set_day(date, MockDay::Rates(rates));
        }

        /// Number of fetches served so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DailyRatesClient for MockDailyRatesClient {
        async fn fetch_daily(&self, date: NaiveDate) -> RatesResult<DailyRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let day = self.days.get(&date).map(|day| day.clone());
            match day {
                Some(MockDay::Rates(rates)) => Ok(rates),
                Some(MockDay::RedirectLoop) => Err(RatesError::RedirectLoop(date.to_string())),
                Some(MockDay::Unavailable) | None => {
                    Err(RatesError::Upstream(format!("no publication for {}", date)))
                }
            }
        }
    }

    /// Ticker client answering from memory.
    #[derive(Default)]
    pub struct MockTickerClient {
        symbols: DashSet<String>,
        tickers: DashMap<String, Ticker>,
        symbol_calls: AtomicUsize,
        ticker_calls: AtomicUsize,
    }

    impl MockTickerClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_symbol(&self, symbol: &str) {
            self.symbols.insert(symbol.to_string());
        }

        /// Make `symbol` tradable and quote it with the given low/high.
        pub fn set_ticker(&self, symbol: &str, low: Decimal, high: Decimal) {
            self.add_symbol(symbol);
            let mid = (low + high) / Decimal::TWO;
            self.tickers.insert(
                symbol.to_string(),
                Ticker {
                    mid,
                    bid: mid,
                    ask: mid,
                    last_price: mid,
                    low,
                    high,
                    volume: Decimal::ONE,
                    timestamp: Decimal::ZERO,
                },
            );
        }

        pub fn symbol_calls(&self) -> usize {
            self.symbol_calls.load(Ordering::SeqCst)
        }

        pub fn ticker_calls(&self) -> usize {
            self.ticker_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TickerClient for MockTickerClient {
        async fn fetch_symbols(&self) -> RatesResult<Vec<String>> {
            self.symbol_calls.fetch_add(1, Ordering::SeqCst);
            let mut symbols: Vec<String> = self.symbols.iter().map(|s| s.key().clone()).collect();
            symbols.sort();
            Ok(symbols)
        }

        async fn fetch_ticker(&self, symbol: &str) -> RatesResult<Ticker> {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            self.tickers
                .get(symbol)
                .map(|ticker| ticker.clone())
                .ok_or_else(|| RatesError::Upstream(format!("ticker {} unavailable", symbol)))
        }
    }
}
