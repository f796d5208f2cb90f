//! Averaged central bank rates derived from the published `cbr` snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info, instrument};

use gera_common::now;
use gera_store::{Database, ExternalRate, ExternalRateSnapshot, LockScope};

use super::{publish_snapshot, FetchReport, RatesFetcher};
use crate::error::{RatesError, RatesResult};
use crate::registry::{RateSourceRegistry, CBR, CBR_AVG};

/// For every pair of the actual `cbr` snapshot writes
/// `(rate(pair) + 1 / rate(pair.inverse())) / 2` under `cbr_avg`.
pub struct CbrAvgRatesFetcher {
    db: Arc<Database>,
    registry: Arc<RateSourceRegistry>,
}

impl CbrAvgRatesFetcher {
    pub fn new(db: Arc<Database>, registry: Arc<RateSourceRegistry>) -> Self {
        Self { db, registry }
    }
}

#[async_trait]
impl RatesFetcher for CbrAvgRatesFetcher {
    fn name(&self) -> &str {
        CBR_AVG
    }

    #[instrument(skip(self), fields(source = CBR_AVG))]
    async fn perform(&self) -> RatesResult<FetchReport> {
        let cbr_id = self.registry.id(CBR)?;
        let avg_id = self.registry.id(CBR_AVG)?;
        let mut report = FetchReport::new(CBR_AVG);

        let mut tx = self
            .db
            .begin(&[LockScope::RateSource(cbr_id), LockScope::RateSource(avg_id)])
            .await;

        let cbr = tx
            .view(|view| view.rate_source(cbr_id).cloned())
            .ok_or_else(|| RatesError::UnknownSource(CBR.to_string()))?;
        if !cbr.is_enabled {
            return Err(RatesError::SourceDisabled(CBR.to_string()));
        }
        let Some(cbr_snapshot_id) = cbr.actual_snapshot_id else {
            info!("No published cbr snapshot to average");
            return Ok(report);
        };

        let quotes: Vec<ExternalRate> = tx.view(|view| {
            view.external_rates_in(cbr_snapshot_id)
                .into_iter()
                .cloned()
                .collect()
        });

        let snapshot = ExternalRateSnapshot::new(avg_id, now());
        tx.insert(snapshot.clone())?;

        for quote in quotes {
            let inverse = tx.view(|view| {
                view.external_rate(cbr_snapshot_id, &quote.currency_pair.inverse())
                    .map(|rate| rate.rate_value)
            });
            let Some(inverse) = inverse else {
                error!(pair = %quote.currency_pair, "No cbr sourced inverse pair");
                report.skipped += 1;
                continue;
            };

            let buy = quote.rate_value;
            let sell = Decimal::ONE / inverse;
            let value = (buy + sell) / Decimal::TWO;
            tx.insert(ExternalRate::new(&snapshot, quote.currency_pair.clone(), value).with_prices(buy, sell))?;
            report.written += 1;
        }

        if report.written == 0 {
            tx.rollback();
            return Ok(report);
        }

        publish_snapshot(&mut tx, avg_id, snapshot.id)?;
        tx.commit()?;

        info!(snapshot_id = %snapshot.id, written = report.written, "Snapshot published");
        report.snapshot_id = Some(snapshot.id);
        Ok(report)
    }
}
