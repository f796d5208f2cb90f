//! Direction rate publication.
//!
//! One run prices every enabled exchange rate between live payment systems
//! and publishes the rows as a single `DirectionRateSnapshot`. Rows that
//! cannot be priced are skipped; the snapshot still goes out.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use gera_common::{CurrencyRateSnapshotId, DirectionRateId, DirectionRateSnapshotId};
use gera_rates::CurrencyRateBuilder;
use gera_store::{Database, DirectionRate, DirectionRateSnapshot, ExchangeRate, LockScope, Transaction, View};

use crate::error::{WorkerError, WorkerResult};
use crate::fault::{Fault, FaultTracker};

/// Outcome of one direction rate run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectionRatesReport {
    /// Published snapshot; none when no exchange rate was eligible.
    pub snapshot_id: Option<DirectionRateSnapshotId>,
    /// Currency rates resolved for this run. The actual currency rate
    /// snapshot is left untouched.
    pub currency_rate_snapshot_id: Option<CurrencyRateSnapshotId>,
    pub written: usize,
    pub skipped: usize,
    pub faults: usize,
}

pub struct DirectionRatesWorker {
    db: Arc<Database>,
    faults: Arc<dyn FaultTracker>,
}

/// Enabled exchange rates whose payment systems accept the direction.
///
/// A missing payment system keeps the exchange rate eligible so the run
/// reports it.
fn eligible_exchange_rates(view: &View<'_>) -> Vec<ExchangeRate> {
    view.rows::<ExchangeRate>()
        .filter(|exchange_rate| exchange_rate.is_enabled)
        .filter(|exchange_rate| {
            let income = view
                .payment_system(exchange_rate.income_payment_system_id)
                .map_or(true, |ps| ps.is_alive() && ps.income_enabled);
            let outcome = view
                .payment_system(exchange_rate.outcome_payment_system_id)
                .map_or(true, |ps| ps.is_alive() && ps.outcome_enabled);
            income && outcome
        })
        .cloned()
        .collect()
}

impl DirectionRatesWorker {
    pub fn new(db: Arc<Database>, faults: Arc<dyn FaultTracker>) -> Self {
        Self { db, faults }
    }

    fn create(
        tx: &mut Transaction<'_>,
        builder: &mut CurrencyRateBuilder,
        snapshot_id: DirectionRateSnapshotId,
        exchange_rate: &ExchangeRate,
    ) -> WorkerResult<DirectionRateId> {
        let (income, outcome) = tx
            .view(|view| {
                Some((
                    view.payment_system(exchange_rate.income_payment_system_id)?.clone(),
                    view.payment_system(exchange_rate.outcome_payment_system_id)?.clone(),
                ))
            })
            .ok_or(WorkerError::UnknownExchangeRate(exchange_rate.id))?;
        // An unknown commission policy is a configuration error and aborts the run.
        income.fee_policy()?;
        outcome.fee_policy()?;

        let currency_rate = builder.find_currency_rate_by_pair(tx, &exchange_rate.currency_pair)?;
        let rate = DirectionRate::new(snapshot_id, exchange_rate, &currency_rate);
        debug!(
            exchange_rate_id = %exchange_rate.id,
            base = %rate.base_rate_value,
            percent = %rate.rate_percent,
            value = %rate.rate_value,
            "Direction rate"
        );
        Ok(tx.insert(rate)?)
    }

    #[instrument(skip(self))]
    pub async fn perform(&self) -> WorkerResult<DirectionRatesReport> {
        info!("start");
        let mut report = DirectionRatesReport::default();
        let mut tx = self
            .db
            .begin(&[LockScope::CurrencyRates, LockScope::DirectionRates])
            .await;

        let exchange_rates = tx.view(|view| eligible_exchange_rates(&view));
        if exchange_rates.is_empty() {
            warn!("No enabled exchange rates, actual snapshot kept");
            return Ok(report);
        }

        let snapshot = DirectionRateSnapshot::new();
        tx.insert(snapshot.clone())?;
        let mut builder = CurrencyRateBuilder::new();

        for exchange_rate in &exchange_rates {
            match Self::create(&mut tx, &mut builder, snapshot.id, exchange_rate) {
                Ok(_) => report.written += 1,
                Err(err) if err.is_fault() => {
                    error!(exchange_rate_id = %exchange_rate.id, error = %err, "Direction rate skipped");
                    self.faults.notify(Fault {
                        error_code: err.error_code(),
                        message: err.to_string(),
                        exchange_rate_id: exchange_rate.id,
                    });
                    report.skipped += 1;
                    report.faults += 1;
                }
                Err(err) if err.is_recoverable() => {
                    error!(exchange_rate_id = %exchange_rate.id, error = %err, "Direction rate skipped");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        report.currency_rate_snapshot_id = builder.snapshot_id();
        tx.set_actual_direction_rate_snapshot(snapshot.id)?;
        tx.commit()?;
        report.snapshot_id = Some(snapshot.id);

        info!(
            snapshot_id = %snapshot.id,
            written = report.written,
            skipped = report.skipped,
            "finish"
        );
        Ok(report)
    }
}
