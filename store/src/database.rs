//! The shared store handle.

use parking_lot::RwLock;
use tracing::debug;

use crate::lock::{DomainLocks, LockScope};
use crate::tables::Tables;
use crate::transaction::Transaction;
use crate::view::View;

/// In-process transactional store.
///
/// Readers see committed state only and never wait on domain locks.
/// Writers acquire their domain locks in a fixed order through `begin`.
#[derive(Default)]
pub struct Database {
    tables: RwLock<Tables>,
    locks: DomainLocks,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction holding `scopes` exclusively.
    pub async fn begin(&self, scopes: &[LockScope]) -> Transaction<'_> {
        let guards = self.locks.acquire(scopes).await;
        let mut held = scopes.to_vec();
        held.sort();
        held.dedup();
        debug!(scopes = ?held, "Transaction started");
        Transaction::new(&self.tables, held, guards)
    }

    /// Read committed state.
    pub fn read<T>(&self, f: impl FnOnce(View<'_>) -> T) -> T {
        let tables = self.tables.read();
        f(View::committed(&tables))
    }

    pub fn is_locked(&self, scope: LockScope) -> bool {
        self.locks.is_locked(scope)
    }

    /// Total committed rows, used to assert runs that must not write.
    pub fn row_count(&self) -> usize {
        self.tables.read().row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction_rate::DirectionRateSnapshot;
    use crate::error::StoreError;
    use crate::external_rate::{CbrDailyRate, ExternalRate, ExternalRateSnapshot};
    use crate::payment_system::PaymentSystem;
    use crate::rate_source::{RateSource, SourceKind};
    use gera_common::{now, Currency, CurrencyPair};
    use rust_decimal_macros::dec;

    fn usd_rub() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::rub())
    }

    async fn seeded_source(db: &Database) -> RateSource {
        let source = RateSource::new("cbr", "Central bank", SourceKind::Cbr);
        let mut tx = db.begin(&[LockScope::Configuration]).await;
        tx.insert(source.clone()).unwrap();
        tx.commit().unwrap();
        source
    }

    #[tokio::test]
    async fn test_commit_makes_rows_visible() {
        let db = Database::new();
        let source = seeded_source(&db).await;

        let mut tx = db.begin(&[LockScope::RateSource(source.id)]).await;
        let snapshot = ExternalRateSnapshot::new(source.id, now());
        tx.insert(snapshot.clone()).unwrap();
        tx.insert(ExternalRate::new(&snapshot, usd_rub(), dec!(90))).unwrap();

        assert!(tx.view(|v| v.external_rate(snapshot.id, &usd_rub()).is_some()));
        assert!(db.read(|v| v.external_rate(snapshot.id, &usd_rub()).is_none()));

        let summary = tx.commit().unwrap();
        assert_eq!(summary.writes, 2);
        assert!(db.read(|v| v.external_rate(snapshot.id, &usd_rub()).is_some()));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let db = Database::new();
        let source = seeded_source(&db).await;
        let before = db.row_count();

        {
            let mut tx = db.begin(&[LockScope::RateSource(source.id)]).await;
            tx.insert(ExternalRateSnapshot::new(source.id, now())).unwrap();
        }

        assert_eq!(db.row_count(), before);
        assert!(!db.is_locked(LockScope::RateSource(source.id)));
    }

    #[tokio::test]
    async fn test_unique_snapshot_pair() {
        let db = Database::new();
        let source = seeded_source(&db).await;
        let mut tx = db.begin(&[LockScope::RateSource(source.id)]).await;
        let snapshot = ExternalRateSnapshot::new(source.id, now());
        tx.insert(snapshot.clone()).unwrap();
        tx.insert(ExternalRate::new(&snapshot, usd_rub(), dec!(90))).unwrap();

        let err = tx
            .insert(ExternalRate::new(&snapshot, usd_rub(), dec!(91)))
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        // The rejected row is not staged.
        assert_eq!(tx.writes(), 2);
    }

    #[tokio::test]
    async fn test_daily_samples_by_pair_and_date() {
        let db = Database::new();
        let day = |d: u32| chrono::NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

        let mut tx = db.begin(&[LockScope::Configuration]).await;
        tx.insert(CbrDailyRate::new(day(4), usd_rub(), dec!(89), dec!(1))).unwrap();
        tx.insert(CbrDailyRate::new(day(5), usd_rub(), dec!(90), dec!(1))).unwrap();
        tx.commit().unwrap();

        {
            let mut tx = db.begin(&[LockScope::Configuration]).await;
            tx.insert(CbrDailyRate::new(day(6), usd_rub(), dec!(92), dec!(1))).unwrap();
            let dates: Vec<_> = tx.view(|v| v.cbr_daily_rates_for(&usd_rub()).iter().map(|r| r.date).collect());
            assert_eq!(dates, vec![day(6), day(5), day(4)]);
            assert!(tx.view(|v| v.has_cbr_daily_rate(&usd_rub(), day(5))));

            let err = tx
                .insert(CbrDailyRate::new(day(4), usd_rub(), dec!(88), dec!(1)))
                .unwrap_err();
            assert!(matches!(err, StoreError::UniqueViolation { .. }));
        }

        assert!(!db.read(|v| v.has_cbr_daily_rate(&usd_rub(), day(6))));
        assert_eq!(db.read(|v| v.cbr_daily_rates_for(&usd_rub()).len()), 2);
        assert!(db.read(|v| v.cbr_daily_rates_for(&usd_rub().inverse()).is_empty()));

        // Racing writers of the same sample: the second commit is rejected.
        let mut first = db.begin(&[LockScope::Configuration]).await;
        first.insert(CbrDailyRate::new(day(7), usd_rub(), dec!(91), dec!(1))).unwrap();
        let mut second = db.begin(&[LockScope::DirectionRates]).await;
        second.insert(CbrDailyRate::new(day(7), usd_rub(), dec!(93), dec!(1))).unwrap();
        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StoreError::UniqueViolation { .. })));
        assert_eq!(db.read(|v| v.cbr_daily_rates_for(&usd_rub())[0].rate), dec!(91));
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_rejected() {
        let db = Database::new();
        let source = seeded_source(&db).await;
        let mut tx = db.begin(&[LockScope::RateSource(source.id)]).await;
        let snapshot = ExternalRateSnapshot::new(source.id, now());
        tx.insert(snapshot.clone()).unwrap();

        let err = tx
            .insert(ExternalRate::new(&snapshot, usd_rub(), dec!(0)))
            .unwrap_err();
        assert!(err.is_row_invalid());
    }

    #[tokio::test]
    async fn test_immutable_rows_cannot_be_updated() {
        let db = Database::new();
        let mut tx = db.begin(&[LockScope::DirectionRates]).await;
        let snapshot = DirectionRateSnapshot::new();
        tx.insert(snapshot.clone()).unwrap();
        assert_eq!(
            tx.update(snapshot).unwrap_err(),
            StoreError::Immutable {
                table: "direction_rate_snapshots"
            }
        );
    }

    #[tokio::test]
    async fn test_pointer_requires_known_snapshot() {
        let db = Database::new();
        let mut tx = db.begin(&[LockScope::DirectionRates]).await;
        let err = tx
            .set_actual_direction_rate_snapshot(DirectionRateSnapshot::new().id)
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_commit_rechecks_against_latest_state() {
        let db = Database::new();

        // Two writers under different scopes race for the same unique name.
        let mut first = db.begin(&[LockScope::Configuration]).await;
        first.insert(PaymentSystem::new("Qiwi", Currency::rub())).unwrap();

        let mut second = db.begin(&[LockScope::DirectionRates]).await;
        second.insert(PaymentSystem::new("Qiwi", Currency::rub())).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(db.read(|v| v.count::<PaymentSystem>()), 1);
    }

    #[tokio::test]
    async fn test_update_is_visible_to_own_reads() {
        let db = Database::new();
        let source = seeded_source(&db).await;

        let mut tx = db.begin(&[LockScope::Configuration]).await;
        let mut disabled = source.clone();
        disabled.is_enabled = false;
        tx.update(disabled).unwrap();

        assert!(!tx.view(|v| v.rate_source(source.id).unwrap().is_enabled));
        assert!(db.read(|v| v.rate_source(source.id).unwrap().is_enabled));
        tx.commit().unwrap();
        assert!(!db.read(|v| v.rate_source(source.id).unwrap().is_enabled));
    }
}
