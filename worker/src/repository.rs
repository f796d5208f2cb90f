//! Read access to published direction rates.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use gera_common::{DirectionRateId, ExchangeRateId};
use gera_store::{Database, DirectionRate, DirectionRateSnapshot, LockScope, View};

use crate::error::{WorkerError, WorkerResult};

/// The latest published rates, or the absence of any.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LatestRates {
    NoData,
    Published {
        snapshot: DirectionRateSnapshot,
        rates: Vec<DirectionRate>,
    },
}

pub struct DirectionRatesRepository {
    db: Arc<Database>,
}

fn latest_snapshot(view: &View<'_>) -> WorkerResult<DirectionRateSnapshot> {
    view.actual_direction_rate_snapshot_id()
        .and_then(|id| view.direction_rate_snapshot(id).cloned())
        .ok_or(WorkerError::NoActualSnapshot)
}

/// The row of the actual snapshot, else the most recently created row.
fn latest_for(view: &View<'_>, exchange_rate_id: ExchangeRateId) -> Option<DirectionRate> {
    let rows = view.direction_rates_for(exchange_rate_id);
    let actual = view.actual_direction_rate_snapshot_id();
    rows.iter()
        .find(|rate| Some(rate.snapshot_id) == actual)
        .or_else(|| rows.iter().max_by_key(|rate| rate.created_at))
        .map(|rate| (*rate).clone())
}

impl DirectionRatesRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn latest_snapshot(&self) -> WorkerResult<DirectionRateSnapshot> {
        self.db.read(|view| latest_snapshot(&view))
    }

    pub fn find_by_exchange_rate_id(&self, exchange_rate_id: ExchangeRateId) -> WorkerResult<DirectionRate> {
        self.db
            .read(|view| latest_for(&view, exchange_rate_id))
            .ok_or(WorkerError::NoDirectionRate(exchange_rate_id))
    }

    pub fn show(&self, id: DirectionRateId) -> WorkerResult<DirectionRate> {
        self.db
            .read(|view| view.direction_rate(id).cloned())
            .ok_or(WorkerError::DirectionRateNotFound(id))
    }

    pub fn latest_rates(&self) -> LatestRates {
        self.db.read(|view| match latest_snapshot(&view) {
            Ok(snapshot) => LatestRates::Published {
                rates: view.direction_rates_in(snapshot.id).into_iter().cloned().collect(),
                snapshot,
            },
            Err(_) => LatestRates::NoData,
        })
    }

    /// The current row for the same exchange rate as `id`.
    pub fn canonical_for(&self, id: DirectionRateId) -> WorkerResult<DirectionRate> {
        let rate = self.show(id)?;
        self.find_by_exchange_rate_id(rate.exchange_rate_id)
    }

    /// Flag a rate as quoted to a customer.
    pub async fn mark_used(&self, id: DirectionRateId) -> WorkerResult<()> {
        let mut tx = self.db.begin(&[LockScope::DirectionRates]).await;
        let mut rate = tx
            .view(|view| view.direction_rate(id).cloned())
            .ok_or(WorkerError::DirectionRateNotFound(id))?;
        if rate.is_used {
            return Ok(());
        }
        rate.is_used = true;
        tx.update(rate)?;
        tx.commit()?;
        info!(direction_rate_id = %id, "Direction rate used");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction_rates::DirectionRatesWorker;
    use crate::fault::LogFaultTracker;
    use crate::testing::Fixture;
    use gera_common::Currency;

    async fn published() -> (Fixture, DirectionRatesRepository, DirectionRatesWorker) {
        let fixture = Fixture::new().await;
        fixture.add_payment_system("Sber", Currency::rub()).await;
        fixture.add_payment_system("PayPal", Currency::usd()).await;
        let repository = DirectionRatesRepository::new(fixture.db.clone());
        let worker = DirectionRatesWorker::new(fixture.db.clone(), Arc::new(LogFaultTracker));
        (fixture, repository, worker)
    }

    #[tokio::test]
    async fn test_latest_snapshot_follows_runs() {
        let (fixture, repository, worker) = published().await;
        assert!(matches!(repository.latest_snapshot(), Err(WorkerError::NoActualSnapshot)));
        assert!(matches!(repository.latest_rates(), LatestRates::NoData));

        let first = worker.perform().await.unwrap().snapshot_id.unwrap();
        assert_eq!(repository.latest_snapshot().unwrap().id, first);

        // A run abandoned before commit changes nothing.
        {
            let mut tx = fixture
                .db
                .begin(&[LockScope::CurrencyRates, LockScope::DirectionRates])
                .await;
            let abandoned = DirectionRateSnapshot::new();
            tx.insert(abandoned.clone()).unwrap();
            tx.set_actual_direction_rate_snapshot(abandoned.id).unwrap();
        }
        assert_eq!(repository.latest_snapshot().unwrap().id, first);

        let second = worker.perform().await.unwrap().snapshot_id.unwrap();
        assert_eq!(repository.latest_snapshot().unwrap().id, second);
        match repository.latest_rates() {
            LatestRates::Published { snapshot, rates } => {
                assert_eq!(snapshot.id, second);
                assert_eq!(rates.len(), 2);
            }
            LatestRates::NoData => panic!("expected published rates"),
        }
    }

    #[tokio::test]
    async fn test_canonical_row_is_the_latest() {
        let (_fixture, repository, worker) = published().await;
        let first = worker.perform().await.unwrap().snapshot_id.unwrap();
        let LatestRates::Published { rates, .. } = repository.latest_rates() else {
            panic!("expected published rates");
        };
        let old = rates[0].clone();
        assert_eq!(old.snapshot_id, first);

        let second = worker.perform().await.unwrap().snapshot_id.unwrap();
        let canonical = repository.canonical_for(old.id).unwrap();
        assert_eq!(canonical.snapshot_id, second);
        assert_eq!(canonical.exchange_rate_id, old.exchange_rate_id);
        assert_eq!(
            repository.find_by_exchange_rate_id(old.exchange_rate_id).unwrap().id,
            canonical.id
        );
        assert_eq!(repository.show(old.id).unwrap().snapshot_id, first);
    }

    #[tokio::test]
    async fn test_mark_used() {
        let (_fixture, repository, worker) = published().await;
        worker.perform().await.unwrap();
        let LatestRates::Published { rates, .. } = repository.latest_rates() else {
            panic!("expected published rates");
        };

        repository.mark_used(rates[0].id).await.unwrap();
        assert!(repository.show(rates[0].id).unwrap().is_used);
        assert!(!repository.show(rates[1].id).unwrap().is_used);

        assert!(matches!(
            repository.mark_used(DirectionRateId::new()).await,
            Err(WorkerError::DirectionRateNotFound(_))
        ));
    }
}
