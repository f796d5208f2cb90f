//! Bitfinex ticker quotes.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use gera_common::{is_older_than, now, Currency, CurrencyPair};
use gera_store::{Database, ExternalRate, ExternalRateSnapshot, LockScope};

use super::{publish_snapshot, FetchReport, RatesFetcher};
use crate::client::{Ticker, TickerClient};
use crate::error::{RatesError, RatesResult};
use crate::registry::{RateSourceRegistry, BITFINEX};

/// Tickers loaded when configuration names none.
pub const DEFAULT_TICKERS: [&str; 6] = ["btcusd", "ethusd", "ltcusd", "xmrusd", "dshusd", "zecusd"];

/// How long the cached tradable ticker set stays fresh.
pub const SUPPORTED_TICKERS_UPDATE_PERIOD_SECS: i64 = 24 * 60 * 60;

/// Map a Bitfinex currency code to a currency.
fn decode_currency(code: &str) -> RatesResult<Currency> {
    let code = code.to_ascii_uppercase();
    let normalized = match code.as_str() {
        "UST" => "USDT",
        "DSH" => "DASH",
        "IOT" => "IOTA",
        "QTM" => "QTUM",
        other => other,
    };
    Currency::parse(normalized).map_err(|_| RatesError::UnknownCurrency(code.clone()))
}

/// Split a six character ticker (`btcusd`) into its pair.
pub fn decode_ticker(ticker: &str) -> RatesResult<CurrencyPair> {
    if ticker.len() != 6 || !ticker.is_ascii() {
        return Err(RatesError::UnknownCurrency(ticker.to_string()));
    }
    Ok(CurrencyPair::new(
        decode_currency(&ticker[..3])?,
        decode_currency(&ticker[3..])?,
    ))
}

pub struct BitfinexRatesFetcher {
    db: Arc<Database>,
    registry: Arc<RateSourceRegistry>,
    client: Arc<dyn TickerClient>,
    tickers_to_load: Vec<String>,
    refresh_period: Duration,
}

impl BitfinexRatesFetcher {
    pub fn new(db: Arc<Database>, registry: Arc<RateSourceRegistry>, client: Arc<dyn TickerClient>) -> Self {
        Self {
            db,
            registry,
            client,
            tickers_to_load: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            refresh_period: Duration::seconds(SUPPORTED_TICKERS_UPDATE_PERIOD_SECS),
        }
    }

    pub fn with_tickers(mut self, tickers: Vec<String>) -> Self {
        self.tickers_to_load = tickers.into_iter().map(|t| t.to_ascii_lowercase()).collect();
        self
    }

    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    /// Refresh the cached tradable tickers when stale or forced.
    ///
    /// Runs in its own transaction so the quote publication lock is never
    /// held during the symbols request. Returns whether a refresh happened.
    #[instrument(skip(self))]
    pub async fn update_supported_tickers(&self, force: bool) -> RatesResult<bool> {
        let source = self.registry.source(&self.db, BITFINEX)?;
        let fresh = source
            .supported_tickers_updated_at
            .map(|at| !is_older_than(at, self.refresh_period, now()))
            .unwrap_or(false);
        if fresh && !force {
            debug!("Supported tickers are fresh");
            return Ok(false);
        }

        let symbols = self.client.fetch_symbols().await?;
        let supported: BTreeSet<String> = symbols.into_iter().map(|s| s.to_ascii_lowercase()).collect();

        let mut tx = self.db.begin(&[LockScope::RateSource(source.id)]).await;
        let mut source = tx
            .view(|view| view.rate_source(source.id).cloned())
            .ok_or_else(|| RatesError::UnknownSource(BITFINEX.to_string()))?;
        info!(count = supported.len(), "Update supported tickers");
        source.supported_tickers = supported;
        source.supported_tickers_updated_at = Some(now());
        tx.update(source)?;
        tx.commit()?;
        Ok(true)
    }

    fn tickers_to_load(&self, supported: &BTreeSet<String>) -> Vec<String> {
        self.tickers_to_load
            .iter()
            .filter(|ticker| supported.contains(ticker.as_str()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RatesFetcher for BitfinexRatesFetcher {
    fn name(&self) -> &str {
        BITFINEX
    }

    #[instrument(skip(self), fields(source = BITFINEX))]
    async fn perform(&self) -> RatesResult<FetchReport> {
        let source_id = self.registry.id(BITFINEX)?;
        let mut report = FetchReport::new(BITFINEX);

        let source = self.registry.source(&self.db, BITFINEX)?;
        if !source.is_enabled {
            return Err(RatesError::SourceDisabled(BITFINEX.to_string()));
        }

        if let Err(err) = self.update_supported_tickers(false).await {
            if !err.is_recoverable() {
                return Err(err);
            }
            warn!(error = %err, "Keeping cached supported tickers");
        }

        let supported = self.registry.source(&self.db, BITFINEX)?.supported_tickers;
        let tickers = self.tickers_to_load(&supported);
        info!(tickers = %tickers.join(","), "Load rates");

        let mut quotes: Vec<(CurrencyPair, Ticker)> = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            let pair = decode_ticker(ticker)?;
            match self.client.fetch_ticker(ticker).await {
                Ok(quote) => quotes.push((pair, quote)),
                Err(err) => {
                    warn!(ticker = %ticker, error = %err, "Failed to load ticker");
                    report.skipped += 1;
                }
            }
        }

        let mut tx = self.db.begin(&[LockScope::RateSource(source_id)]).await;
        let snapshot = ExternalRateSnapshot::new(source_id, now());
        tx.insert(snapshot.clone())?;

        for (pair, quote) in quotes {
            let buy_price = quote.low;
            let sell_price = quote.high;
            if buy_price <= Decimal::ZERO || sell_price <= Decimal::ZERO {
                warn!(pair = %pair, low = %buy_price, high = %sell_price, "Non positive quote");
                report.skipped += 1;
                continue;
            }
            debug!(pair = %pair, low = %buy_price, high = %sell_price, "Save rate");
            tx.insert(ExternalRate::new(&snapshot, pair.clone(), buy_price).with_prices(buy_price, sell_price))?;
            tx.insert(
                ExternalRate::new(&snapshot, pair.inverse(), Decimal::ONE / sell_price)
                    .with_prices(buy_price, sell_price),
            )?;
            report.written += 2;
        }

        if report.written == 0 {
            warn!("No ticker could be published, actual snapshot kept");
            tx.rollback();
            return Ok(report);
        }

        publish_snapshot(&mut tx, source_id, snapshot.id)?;
        tx.commit()?;

        info!(snapshot_id = %snapshot.id, written = report.written, "Snapshot published");
        report.snapshot_id = Some(snapshot.id);
        Ok(report)
    }
}
