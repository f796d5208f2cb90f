//! Materialized currency rates.
//!
//! Resolutions are written as `CurrencyRate` rows under one
//! `CurrencyRateSnapshot` per run so every lookup in the run sees the same
//! value for a pair.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use gera_common::{CurrencyPair, CurrencyRateId, CurrencyRateSnapshotId};
use gera_store::{CurrencyRate, CurrencyRateSnapshot, Database, LockScope, Transaction};

use crate::error::{RatesError, RatesResult};
use crate::resolver::resolve;

/// Resolves pairs inside a transaction, writing each pair once per run.
///
/// The snapshot row is created on the first successful resolution.
#[derive(Debug, Default)]
pub struct CurrencyRateBuilder {
    snapshot_id: Option<CurrencyRateSnapshotId>,
    resolved: BTreeMap<CurrencyPair, CurrencyRateId>,
}

impl CurrencyRateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_id(&self) -> Option<CurrencyRateSnapshotId> {
        self.snapshot_id
    }

    /// Number of rates written so far.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    fn snapshot(&mut self, tx: &mut Transaction<'_>) -> RatesResult<CurrencyRateSnapshotId> {
        if let Some(id) = self.snapshot_id {
            return Ok(id);
        }
        let mode_snapshot_id = tx.view(|view| view.active_mode_snapshot().map(|s| s.id));
        let id = tx.insert(CurrencyRateSnapshot::new(mode_snapshot_id))?;
        self.snapshot_id = Some(id);
        Ok(id)
    }

    pub fn find_currency_rate_by_pair(
        &mut self,
        tx: &mut Transaction<'_>,
        pair: &CurrencyPair,
    ) -> RatesResult<CurrencyRate> {
        debug_assert!(tx.holds(LockScope::CurrencyRates));

        if let Some(id) = self.resolved.get(pair) {
            if let Some(rate) = tx.view(|view| view.currency_rate(*id).cloned()) {
                return Ok(rate);
            }
        }

        let resolution = tx.view(|view| resolve(&view, pair))?;
        let snapshot_id = self.snapshot(tx)?;
        let rate = resolution.into_currency_rate(snapshot_id);
        debug!(pair = %pair, value = %rate.rate_value, mode = ?rate.mode, "Resolved currency rate");
        tx.insert(rate.clone())?;
        self.resolved.insert(pair.clone(), rate.id);
        Ok(rate)
    }

    /// Make the run's snapshot the actual one. Returns it, if one was written.
    ///
    /// Only the publication of the whole active generation calls this. Other
    /// runs keep their snapshot private to the rows that reference it.
    pub fn publish(self, tx: &mut Transaction<'_>) -> RatesResult<Option<CurrencyRateSnapshotId>> {
        match self.snapshot_id {
            Some(id) => {
                tx.set_actual_currency_rate_snapshot(id)?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}

/// Outcome of one currency rate publication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrencyRatesReport {
    pub snapshot_id: Option<CurrencyRateSnapshotId>,
    pub written: usize,
    pub skipped: usize,
}

/// Publishes every mode of the active generation as one snapshot.
pub struct CurrencyRatesWorker {
    db: Arc<Database>,
}

impl CurrencyRatesWorker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn perform(&self) -> RatesResult<CurrencyRatesReport> {
        let mut report = CurrencyRatesReport::default();
        let mut tx = self.db.begin(&[LockScope::CurrencyRates]).await;

        let pairs: Vec<CurrencyPair> = tx.view(|view| match view.active_mode_snapshot() {
            Some(active) => view
                .modes_in(active.id)
                .into_iter()
                .map(|mode| mode.currency_pair.clone())
                .collect(),
            None => Vec::new(),
        });
        if pairs.is_empty() {
            warn!("No active currency rate modes to publish");
            return Ok(report);
        }

        let mut builder = CurrencyRateBuilder::new();
        for pair in &pairs {
            match builder.find_currency_rate_by_pair(&mut tx, pair) {
                Ok(_) => report.written += 1,
                Err(err) if err.is_recoverable() => {
                    warn!(pair = %pair, error = %err, code = err.error_code(), "Currency rate skipped");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        if builder.is_empty() {
            warn!(skipped = report.skipped, "No currency rate resolved, actual snapshot kept");
            tx.rollback();
            return Ok(report);
        }

        report.snapshot_id = builder.publish(&mut tx)?;
        tx.commit()?;
        info!(written = report.written, skipped = report.skipped, "Currency rates published");
        Ok(report)
    }
}

/// Read access to the actual currency rate snapshot.
pub struct CurrencyRatesRepository {
    db: Arc<Database>,
}

impl CurrencyRatesRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn actual_snapshot(&self) -> Option<CurrencyRateSnapshot> {
        self.db.read(|view| {
            view.actual_currency_rate_snapshot_id()
                .and_then(|id| view.currency_rate_snapshot(id).cloned())
        })
    }

    pub fn find_currency_rate_by_pair(&self, pair: &CurrencyPair) -> RatesResult<CurrencyRate> {
        self.db
            .read(|view| {
                let snapshot_id = view.actual_currency_rate_snapshot_id()?;
                view.currency_rate_in(snapshot_id, pair).cloned()
            })
            .ok_or_else(|| RatesError::UnknownPair(pair.clone()))
    }

    /// Every rate of the actual snapshot, ordered by pair.
    pub fn rates(&self) -> Vec<CurrencyRate> {
        self.db.read(|view| match view.actual_currency_rate_snapshot_id() {
            Some(id) => view.currency_rates_in(id).into_iter().cloned().collect(),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::CurrencyRateModes;
    use crate::registry::{default_sources, RateSourceRegistry, CBR};
    use gera_common::{now, Currency};
    use gera_store::{ExternalRate, ExternalRateSnapshot, RateMode, ResolvedMode};
    use rust_decimal_macros::dec;

    fn usd_rub() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::rub())
    }

    fn eur_rub() -> CurrencyPair {
        CurrencyPair::new(Currency::eur(), Currency::rub())
    }

    /// cbr quotes USD/RUB at 90; the active generation also asks for EUR/RUB.
    async fn setup() -> Arc<Database> {
        let db = Arc::new(Database::new());
        let registry = RateSourceRegistry::provision(&db, default_sources()).await.unwrap();
        let cbr_id = registry.id(CBR).unwrap();

        let mut tx = db.begin(&[LockScope::RateSource(cbr_id)]).await;
        let snapshot = ExternalRateSnapshot::new(cbr_id, now());
        tx.insert(snapshot.clone()).unwrap();
        tx.insert(ExternalRate::new(&snapshot, usd_rub(), dec!(90))).unwrap();
        crate::fetchers::publish_snapshot(&mut tx, cbr_id, snapshot.id).unwrap();
        tx.commit().unwrap();

        let modes = CurrencyRateModes::new(db.clone());
        let draft = modes.create_draft("v1", None).await.unwrap();
        for pair in [usd_rub(), eur_rub()] {
            modes
                .add_mode(draft, pair, RateMode::Direct { rate_source_id: Some(cbr_id) })
                .await
                .unwrap();
        }
        modes.activate(draft).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_builder_writes_each_pair_once() {
        let db = setup().await;
        let mut tx = db.begin(&[LockScope::CurrencyRates]).await;
        let mut builder = CurrencyRateBuilder::new();

        let first = builder.find_currency_rate_by_pair(&mut tx, &usd_rub()).unwrap();
        let second = builder.find_currency_rate_by_pair(&mut tx, &usd_rub()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.mode, ResolvedMode::Direct);
        // One snapshot plus one rate.
        assert_eq!(tx.writes(), 2);

        let unknown = builder.find_currency_rate_by_pair(&mut tx, &eur_rub());
        assert!(matches!(unknown, Err(RatesError::UnknownPair(_))));
        assert_eq!(tx.writes(), 2);
    }

    #[tokio::test]
    async fn test_worker_publishes_fail_soft() {
        let db = setup().await;
        let repository = CurrencyRatesRepository::new(db.clone());
        assert!(repository.actual_snapshot().is_none());

        let report = CurrencyRatesWorker::new(db.clone()).perform().await.unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);

        let snapshot = repository.actual_snapshot().unwrap();
        assert_eq!(Some(snapshot.id), report.snapshot_id);
        assert!(snapshot.mode_snapshot_id.is_some());
        assert_eq!(repository.find_currency_rate_by_pair(&usd_rub()).unwrap().rate_value, dec!(90));
        assert!(matches!(
            repository.find_currency_rate_by_pair(&eur_rub()),
            Err(RatesError::UnknownPair(_))
        ));
        assert_eq!(repository.rates().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_without_modes_writes_nothing() {
        let db = Arc::new(Database::new());
        let report = CurrencyRatesWorker::new(db.clone()).perform().await.unwrap();
        assert_eq!(report, CurrencyRatesReport::default());
        assert_eq!(db.row_count(), 0);
    }
}
