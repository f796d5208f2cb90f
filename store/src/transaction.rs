//! Write transactions.

use parking_lot::RwLock;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use gera_common::{CurrencyRateSnapshotId, DirectionRateSnapshotId};

use crate::currency_rate::{CurrencyRate, CurrencyRateMode, CurrencyRateModeSnapshot, CurrencyRateSnapshot};
use crate::direction_rate::{DirectionRate, DirectionRateSnapshot};
use crate::error::{StoreError, StoreResult};
use crate::external_rate::{CbrDailyRate, ExternalRate, ExternalRateSnapshot};
use crate::lock::LockScope;
use crate::payment_system::{ExchangeRate, PaymentSystem};
use crate::rate_source::RateSource;
use crate::tables::{Record, Tables};
use crate::view::View;

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// Rows inserted or updated.
    pub writes: usize,
}

/// A unit of work holding its domain locks until commit or drop.
///
/// Writes are staged and validated immediately, then re-validated against
/// the latest committed state at commit. Nothing is visible to readers
/// before commit; dropping the transaction discards everything.
pub struct Transaction<'db> {
    tables: &'db RwLock<Tables>,
    pending: Tables,
    scopes: Vec<LockScope>,
    writes: usize,
    finished: bool,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(
        tables: &'db RwLock<Tables>,
        scopes: Vec<LockScope>,
        guards: Vec<OwnedMutexGuard<()>>,
    ) -> Self {
        Self {
            tables,
            pending: Tables::default(),
            scopes,
            writes: 0,
            finished: false,
            _guards: guards,
        }
    }

    /// Scopes held by this transaction.
    pub fn scopes(&self) -> &[LockScope] {
        &self.scopes
    }

    pub fn holds(&self, scope: LockScope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Number of staged writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Read committed state overlaid with this transaction's writes.
    pub fn view<T>(&self, f: impl FnOnce(View<'_>) -> T) -> T {
        let committed = self.tables.read();
        f(View::overlay(&committed, &self.pending))
    }

    fn stage<R: Record>(&mut self, row: R) -> StoreResult<R::Id> {
        let id = row.id();
        let previous = R::rows_mut(&mut self.pending).insert(id, row);
        let checked = {
            let committed = self.tables.read();
            let view = View::overlay(&committed, &self.pending);
            match view.get::<R>(id) {
                Some(staged) => staged.check(&view),
                None => Ok(()),
            }
        };
        if let Err(err) = checked {
            let rows = R::rows_mut(&mut self.pending);
            match previous {
                Some(previous) => {
                    rows.insert(id, previous);
                }
                None => {
                    rows.remove(&id);
                }
            }
            return Err(err);
        }
        self.writes += 1;
        Ok(id)
    }

    /// Insert a new row.
    pub fn insert<R: Record>(&mut self, row: R) -> StoreResult<R::Id> {
        let exists = self.view(|view| view.get::<R>(row.id()).is_some());
        if exists {
            return Err(StoreError::DuplicateId {
                table: R::TABLE,
                id: row.id().to_string(),
            });
        }
        self.stage(row)
    }

    /// Replace an existing row of a mutable table.
    pub fn update<R: Record>(&mut self, row: R) -> StoreResult<()> {
        if !R::MUTABLE {
            return Err(StoreError::Immutable { table: R::TABLE });
        }
        let exists = self.view(|view| view.get::<R>(row.id()).is_some());
        if !exists {
            return Err(StoreError::NotFound {
                table: R::TABLE,
                id: row.id().to_string(),
            });
        }
        self.stage(row).map(|_| ())
    }

    /// Point readers at a currency rate snapshot once committed.
    pub fn set_actual_currency_rate_snapshot(&mut self, id: CurrencyRateSnapshotId) -> StoreResult<()> {
        let known = self.view(|view| view.currency_rate_snapshot(id).is_some());
        if !known {
            return Err(StoreError::ForeignKeyViolation {
                table: "repository",
                column: "actual_currency_rate_snapshot",
                id: id.to_string(),
            });
        }
        self.pending.actual_currency_rate_snapshot = Some(id);
        self.writes += 1;
        Ok(())
    }

    /// Point readers at a direction rate snapshot once committed.
    pub fn set_actual_direction_rate_snapshot(&mut self, id: DirectionRateSnapshotId) -> StoreResult<()> {
        let known = self.view(|view| view.direction_rate_snapshot(id).is_some());
        if !known {
            return Err(StoreError::ForeignKeyViolation {
                table: "repository",
                column: "actual_direction_rate_snapshot",
                id: id.to_string(),
            });
        }
        self.pending.actual_direction_rate_snapshot = Some(id);
        self.writes += 1;
        Ok(())
    }

    /// Apply every staged write, or none of them.
    pub fn commit(mut self) -> StoreResult<CommitSummary> {
        self.finished = true;
        let writes = self.writes;
        let mut pending = std::mem::take(&mut self.pending);
        if writes == 0 {
            debug!(scopes = ?self.scopes, "Empty transaction committed");
            return Ok(CommitSummary { writes });
        }

        let mut committed = self.tables.write();
        {
            let view = View::overlay(&committed, &pending);
            recheck::<RateSource>(&view, &pending)?;
            recheck::<ExternalRateSnapshot>(&view, &pending)?;
            recheck::<ExternalRate>(&view, &pending)?;
            recheck::<CbrDailyRate>(&view, &pending)?;
            recheck::<CurrencyRateModeSnapshot>(&view, &pending)?;
            recheck::<CurrencyRateMode>(&view, &pending)?;
            recheck::<CurrencyRateSnapshot>(&view, &pending)?;
            recheck::<CurrencyRate>(&view, &pending)?;
            recheck::<PaymentSystem>(&view, &pending)?;
            recheck::<ExchangeRate>(&view, &pending)?;
            recheck::<DirectionRateSnapshot>(&view, &pending)?;
            recheck::<DirectionRate>(&view, &pending)?;
        }

        merge::<RateSource>(&mut committed, &mut pending);
        merge::<ExternalRateSnapshot>(&mut committed, &mut pending);
        merge::<ExternalRate>(&mut committed, &mut pending);
        merge::<CbrDailyRate>(&mut committed, &mut pending);
        merge::<CurrencyRateModeSnapshot>(&mut committed, &mut pending);
        merge::<CurrencyRateMode>(&mut committed, &mut pending);
        merge::<CurrencyRateSnapshot>(&mut committed, &mut pending);
        merge::<CurrencyRate>(&mut committed, &mut pending);
        merge::<PaymentSystem>(&mut committed, &mut pending);
        merge::<ExchangeRate>(&mut committed, &mut pending);
        merge::<DirectionRateSnapshot>(&mut committed, &mut pending);
        merge::<DirectionRate>(&mut committed, &mut pending);
        if let Some(id) = pending.actual_currency_rate_snapshot {
            committed.actual_currency_rate_snapshot = Some(id);
        }
        if let Some(id) = pending.actual_direction_rate_snapshot {
            committed.actual_direction_rate_snapshot = Some(id);
        }

        debug!(scopes = ?self.scopes, writes, "Transaction committed");
        Ok(CommitSummary { writes })
    }

    /// Discard every staged write.
    pub fn rollback(mut self) {
        self.finished = true;
        debug!(scopes = ?self.scopes, writes = self.writes, "Transaction rolled back");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.writes > 0 {
            warn!(
                scopes = ?self.scopes,
                writes = self.writes,
                "Transaction dropped without commit, discarding writes"
            );
        }
    }
}

fn recheck<R: Record>(view: &View<'_>, pending: &Tables) -> StoreResult<()> {
    for row in R::rows(pending).values() {
        row.check(view)?;
    }
    Ok(())
}

fn merge<R: Record>(committed: &mut Tables, pending: &mut Tables) {
    let staged = std::mem::take(R::rows_mut(pending));
    for row in staged.values() {
        R::index(committed, row);
    }
    R::rows_mut(committed).extend(staged);
}
