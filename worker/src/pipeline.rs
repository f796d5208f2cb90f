//! Pipeline orchestration.
//!
//! A run fetches every source, publishes currency rates and then direction
//! rates. Each stage commits on its own, so a failing fetcher leaves its
//! previous snapshot in effect and the later stages still run.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use gera_rates::{
    BitfinexClient, BitfinexRatesFetcher, CbrAvgRatesFetcher, CbrClient, CbrRatesFetcher, CurrencyRatesReport,
    CurrencyRatesWorker, FetchReport, RateSourceRegistry, RatesFetcher,
};
use gera_store::Database;

use crate::config::WorkerConfig;
use crate::direction_rates::{DirectionRatesReport, DirectionRatesWorker};
use crate::error::{WorkerError, WorkerResult};
use crate::fault::FaultTracker;
use crate::metrics::{PipelineMetrics, SharedMetrics};

/// A fetcher run that ended in an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub source: String,
    pub error_code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub fetches: Vec<FetchReport>,
    pub fetch_failures: Vec<FetchFailure>,
    pub currency_rates: Option<CurrencyRatesReport>,
    pub directions: Option<DirectionRatesReport>,
}

pub struct Pipeline {
    fetchers: Vec<Arc<dyn RatesFetcher>>,
    currency_rates: CurrencyRatesWorker,
    directions: DirectionRatesWorker,
    metrics: SharedMetrics,
}

impl Pipeline {
    /// A pipeline without fetchers.
    pub fn new(db: Arc<Database>, faults: Arc<dyn FaultTracker>) -> Self {
        Self {
            fetchers: Vec::new(),
            currency_rates: CurrencyRatesWorker::new(db.clone()),
            directions: DirectionRatesWorker::new(db, faults),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the production fetchers from configuration.
    pub fn from_config(
        db: Arc<Database>,
        registry: Arc<RateSourceRegistry>,
        config: &WorkerConfig,
        faults: Arc<dyn FaultTracker>,
    ) -> WorkerResult<Self> {
        let cbr_client = CbrClient::new(config.cbr.base_url.clone(), config.cbr.timeout)?;
        let bitfinex_client = BitfinexClient::new(config.bitfinex.base_url.clone(), config.bitfinex.timeout)?;
        let refresh_period = chrono::Duration::from_std(config.bitfinex.tickers_refresh)
            .map_err(|e| WorkerError::Config(format!("ticker refresh period: {e}")))?;

        let cbr = CbrRatesFetcher::new(db.clone(), registry.clone(), Arc::new(cbr_client))
            .with_strict_dates(config.cbr.strict_dates);
        let bitfinex = BitfinexRatesFetcher::new(db.clone(), registry.clone(), Arc::new(bitfinex_client))
            .with_tickers(config.bitfinex.tickers.clone())
            .with_refresh_period(refresh_period);

        let mut pipeline = Self::new(db.clone(), faults).with_fetcher(Arc::new(cbr));
        if config.cbr_avg_legacy {
            pipeline = pipeline.with_fetcher(Arc::new(CbrAvgRatesFetcher::new(db, registry)));
        }
        Ok(pipeline.with_fetcher(Arc::new(bitfinex)))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn RatesFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Run every fetcher once, in order.
    #[instrument(skip(self))]
    pub async fn fetch(&self, report: &mut PipelineReport) {
        for fetcher in &self.fetchers {
            self.metrics.fetch_started();
            match fetcher.perform().await {
                Ok(fetched) => {
                    self.metrics
                        .fetch_finished(fetched.published(), fetched.written, fetched.skipped);
                    report.fetches.push(fetched);
                }
                Err(err) => {
                    if err.is_recoverable() {
                        warn!(source = fetcher.name(), error = %err, "Fetch skipped");
                    } else {
                        error!(source = fetcher.name(), error = %err, code = err.error_code(), "Fetch failed");
                    }
                    self.metrics.fetch_failed();
                    report.fetch_failures.push(FetchFailure {
                        source: fetcher.name().to_string(),
                        error_code: err.error_code(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    pub async fn publish_currency_rates(&self) -> WorkerResult<CurrencyRatesReport> {
        let report = self.currency_rates.perform().await?;
        self.metrics.currency_rates_published(report.written, report.skipped);
        Ok(report)
    }

    pub async fn publish_directions(&self) -> WorkerResult<DirectionRatesReport> {
        self.metrics.direction_started();
        match self.directions.perform().await {
            Ok(report) => {
                self.metrics
                    .direction_finished(report.written, report.skipped, report.faults);
                Ok(report)
            }
            Err(err) => {
                self.metrics.direction_failed();
                Err(err)
            }
        }
    }

    /// Fetch, then publish currency and direction rates.
    #[instrument(skip(self))]
    pub async fn run(&self) -> WorkerResult<PipelineReport> {
        let mut report = PipelineReport::default();
        self.fetch(&mut report).await;
        report.currency_rates = Some(self.publish_currency_rates().await?);
        report.directions = Some(self.publish_directions().await?);
        info!(
            fetched = report.fetches.len(),
            failed = report.fetch_failures.len(),
            "Pipeline run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::RecordingFaultTracker;
    use crate::repository::{DirectionRatesRepository, LatestRates};
    use crate::seed::Seed;
    use chrono::{Duration, Utc};
    use gera_common::{Currency, CurrencyPair};
    use gera_rates::{CurrencyRatesRepository, DailyRates, MockDailyRatesClient, MockTickerClient};
    use rust_decimal_macros::dec;

    const SEED: &str = r#"{
        "payment_systems": [
            {"name": "Sber", "currency": "RUB"},
            {"name": "PayPal", "currency": "USD"},
            {"name": "Bitcoin", "currency": "BTC"}
        ],
        "mode_snapshot": {
            "title": "v1",
            "modes": [
                {"pair": "USD/RUB", "source": "cbr"},
                {"pair": "RUB/USD", "source": "cbr"},
                {"pair": "BTC/RUB", "legs": [
                    {"pair": "BTC/USD", "source": "bitfinex"},
                    {"pair": "USD/RUB", "source": "cbr"}
                ]}
            ]
        }
    }"#;

    /// USD at 90 for every day around today.
    fn bank() -> Arc<MockDailyRatesClient> {
        let client = Arc::new(MockDailyRatesClient::new());
        let today = Utc::now().date_naive();
        for offset in -7..=7 {
            let day = today + Duration::days(offset);
            client.set_rates(day, DailyRates::new(day).with_quote("R01235", "USD", dec!(1), dec!(90)));
        }
        client
    }

    async fn pipeline(bank: Arc<MockDailyRatesClient>) -> (Arc<Database>, Pipeline) {
        let db = Arc::new(Database::new());
        Seed::parse(SEED).unwrap().apply(&db).await.unwrap();
        let registry = Arc::new(RateSourceRegistry::load(&db));

        let exchange = Arc::new(MockTickerClient::new());
        exchange.set_ticker("btcusd", dec!(60000), dec!(61000));

        let pipeline = Pipeline::new(db.clone(), Arc::new(RecordingFaultTracker::new()))
            .with_fetcher(Arc::new(CbrRatesFetcher::new(db.clone(), registry.clone(), bank)))
            .with_fetcher(Arc::new(
                BitfinexRatesFetcher::new(db.clone(), registry, exchange).with_tickers(vec!["btcusd".into()]),
            ));
        (db, pipeline)
    }

    #[tokio::test]
    async fn test_full_run() {
        let (db, pipeline) = pipeline(bank()).await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.fetches.len(), 2);
        assert!(report.fetch_failures.is_empty());
        assert_eq!(report.currency_rates.as_ref().unwrap().written, 3);

        // RUB/BTC, USD/BTC and BTC/USD have no mode.
        let directions = report.directions.unwrap();
        assert_eq!(directions.written, 3);
        assert_eq!(directions.skipped, 3);

        let btc_rub = CurrencyPair::new(Currency::btc(), Currency::rub());
        let rate = CurrencyRatesRepository::new(db.clone())
            .find_currency_rate_by_pair(&btc_rub)
            .unwrap();
        assert_eq!(rate.rate_value, dec!(5400000));

        match DirectionRatesRepository::new(db).latest_rates() {
            LatestRates::Published { rates, .. } => assert_eq!(rates.len(), 3),
            LatestRates::NoData => panic!("expected published rates"),
        }

        let metrics = pipeline.metrics().snapshot();
        assert_eq!(metrics.fetch_runs, 2);
        assert_eq!(metrics.fetch_published, 2);
        assert_eq!(metrics.direction_runs, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_stop_the_run() {
        let (_db, pipeline) = pipeline(Arc::new(MockDailyRatesClient::new())).await;
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.fetch_failures.len(), 1);
        assert_eq!(report.fetch_failures[0].source, "cbr");
        assert_eq!(report.fetch_failures[0].error_code, "UPSTREAM_FAILED");

        // Without bank rates only BTC/USD is quoted, and no mode uses it alone.
        let directions = report.directions.unwrap();
        assert_eq!(directions.written, 0);
        assert_eq!(directions.skipped, 6);
        assert!(directions.snapshot_id.is_some());
        assert_eq!(pipeline.metrics().snapshot().fetch_failures, 1);
    }
}
