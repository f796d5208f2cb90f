//! Central bank daily rates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use gera_common::{next_business_day, now, previous_business_day, Currency, CurrencyPair};
use gera_store::{CbrDailyRate, Database, ExternalRate, ExternalRateSnapshot, LockScope, Transaction};

use super::{publish_snapshot, FetchReport, RatesFetcher};
use crate::client::DailyRatesClient;
use crate::error::{RatesError, RatesResult};
use crate::registry::{RateSourceRegistry, CBR, CBR_AVG};

/// Imported currencies and their valute ids in the publication.
pub const CBR_CURRENCIES: [(&str, &str); 4] = [
    ("USD", "R01235"),
    ("KZT", "R01335"),
    ("EUR", "R01239"),
    ("UAH", "R01720"),
];

/// Days requested on each run, sorted and deduplicated.
pub fn fetch_window(today: NaiveDate) -> Vec<NaiveDate> {
    let mut days = vec![
        previous_business_day(today),
        today - Duration::days(2),
        today - Duration::days(1),
        today,
        today + Duration::days(1),
        next_business_day(today),
    ];
    days.sort();
    days.dedup();
    days
}

/// Imports raw daily samples and publishes both the `cbr` and the
/// `cbr_avg` snapshots from the two most recent samples of each pair.
pub struct CbrRatesFetcher {
    db: Arc<Database>,
    registry: Arc<RateSourceRegistry>,
    client: Arc<dyn DailyRatesClient>,
    strict_dates: bool,
}

impl CbrRatesFetcher {
    pub fn new(db: Arc<Database>, registry: Arc<RateSourceRegistry>, client: Arc<dyn DailyRatesClient>) -> Self {
        Self {
            db,
            registry,
            client,
            strict_dates: false,
        }
    }

    /// Abort the run when the publication date differs from the requested one.
    pub fn with_strict_dates(mut self, strict_dates: bool) -> Self {
        self.strict_dates = strict_dates;
        self
    }

    fn currencies() -> RatesResult<Vec<(CurrencyPair, &'static str)>> {
        CBR_CURRENCIES
            .iter()
            .map(|(code, valute_id)| -> RatesResult<(CurrencyPair, &'static str)> {
                let pair = CurrencyPair::new(Currency::parse(code)?, Currency::rub());
                Ok((pair, *valute_id))
            })
            .collect()
    }

    /// Run the import as of `today`.
    #[instrument(skip(self), fields(source = CBR))]
    pub async fn perform_on(&self, today: NaiveDate) -> RatesResult<FetchReport> {
        let cbr_id = self.registry.id(CBR)?;
        let avg_id = self.registry.id(CBR_AVG)?;
        let currencies = Self::currencies()?;
        let mut report = FetchReport::new(CBR);

        let mut tx = self
            .db
            .begin(&[LockScope::RateSource(cbr_id), LockScope::RateSource(avg_id)])
            .await;
        let source = tx
            .view(|view| view.rate_source(cbr_id).cloned())
            .ok_or_else(|| RatesError::UnknownSource(CBR.to_string()))?;
        if !source.is_enabled {
            return Err(RatesError::SourceDisabled(CBR.to_string()));
        }

        info!(today = %today, "Start import");
        for date in fetch_window(today) {
            match self.ingest_day(&mut tx, &currencies, date).await {
                Ok(ingested) => report.ingested += ingested,
                Err(err @ RatesError::WrongDate { .. }) if !self.strict_dates => {
                    warn!(date = %date, error = %err, "Skipping date");
                    report.skipped += 1;
                }
                Err(err @ RatesError::RedirectLoop(_)) => {
                    warn!(date = %date, error = %err, "Skipping date");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        if report.ingested == 0 && source.actual_snapshot_id.is_some() {
            info!("No new samples, actual snapshot kept");
            tx.rollback();
            return Ok(report);
        }

        let actual_for = now();
        let snapshot = ExternalRateSnapshot::new(cbr_id, actual_for);
        let avg_snapshot = ExternalRateSnapshot::new(avg_id, actual_for);
        tx.insert(snapshot.clone())?;
        tx.insert(avg_snapshot.clone())?;

        for (pair, _) in &currencies {
            let samples: Vec<Decimal> = tx.view(|view| {
                view.cbr_daily_rates_for(pair)
                    .into_iter()
                    .take(2)
                    .map(|sample| sample.rate)
                    .collect()
            });
            if samples.len() < 2 {
                error!(pair = %pair, samples = samples.len(), "Not enough samples to publish pair");
                report.skipped += 1;
                continue;
            }
            let (min, max) = if samples[0] <= samples[1] {
                (samples[0], samples[1])
            } else {
                (samples[1], samples[0])
            };
            let avg = (min + max) / Decimal::TWO;

            tx.insert(ExternalRate::new(&snapshot, pair.clone(), min))?;
            tx.insert(ExternalRate::new(&snapshot, pair.inverse(), Decimal::ONE / max))?;
            tx.insert(ExternalRate::new(&avg_snapshot, pair.clone(), avg))?;
            tx.insert(ExternalRate::new(&avg_snapshot, pair.inverse(), Decimal::ONE / avg))?;
            report.written += 4;
        }

        if report.written == 0 {
            warn!("No pair could be published, actual snapshot kept");
            tx.rollback();
            return Ok(report);
        }

        publish_snapshot(&mut tx, cbr_id, snapshot.id)?;
        publish_snapshot(&mut tx, avg_id, avg_snapshot.id)?;
        tx.commit()?;

        info!(
            snapshot_id = %snapshot.id,
            avg_snapshot_id = %avg_snapshot.id,
            ingested = report.ingested,
            written = report.written,
            "Snapshot published"
        );
        report.snapshot_id = Some(snapshot.id);
        Ok(report)
    }

    async fn ingest_day(
        &self,
        tx: &mut Transaction<'_>,
        currencies: &[(CurrencyPair, &'static str)],
        date: NaiveDate,
    ) -> RatesResult<usize> {
        let missing: Vec<(CurrencyPair, &'static str)> = tx.view(|view| {
            currencies
                .iter()
                .filter(|(pair, _)| !view.has_cbr_daily_rate(pair, date))
                .cloned()
                .collect()
        });
        if missing.is_empty() {
            debug!(date = %date, "Date already imported");
            return Ok(0);
        }

        let rates = self.client.fetch_daily(date).await?;
        if rates.date != date {
            return Err(RatesError::WrongDate {
                requested: date,
                returned: rates.date,
            });
        }

        let mut ingested = 0;
        for (pair, valute_id) in missing {
            let Some(quote) = rates.quote(valute_id) else {
                warn!(date = %date, currency = %pair.from, valute_id, "Currency missing from publication");
                continue;
            };
            match tx.insert(CbrDailyRate::new(date, pair.clone(), quote.value, quote.nominal)) {
                Ok(_) => ingested += 1,
                Err(err) if err.is_row_invalid() => {
                    warn!(date = %date, pair = %pair, error = %err, "Rejected daily sample");
                }
                Err(err) => return Err(err.into()),
            }
        }
        debug!(date = %date, ingested, "Date imported");
        Ok(ingested)
    }
}

#[async_trait]
impl RatesFetcher for CbrRatesFetcher {
    fn name(&self) -> &str {
        CBR
    }

    async fn perform(&self) -> RatesResult<FetchReport> {
        self.perform_on(Utc::now().date_naive()).await
    }
}
