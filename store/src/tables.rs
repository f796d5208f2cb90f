//! Table storage and the row contract.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use gera_common::{
    CbrDailyRateId, CurrencyPair, CurrencyRateId, CurrencyRateModeId, CurrencyRateModeSnapshotId,
    CurrencyRateSnapshotId, DirectionRateId, DirectionRateSnapshotId, ExchangeRateId,
    ExternalRateId, ExternalRateSnapshotId, PaymentSystemId, RateSourceId,
};

use crate::currency_rate::{CurrencyRate, CurrencyRateMode, CurrencyRateModeSnapshot, CurrencyRateSnapshot};
use crate::direction_rate::{DirectionRate, DirectionRateSnapshot};
use crate::error::{StoreError, StoreResult};
use crate::external_rate::{CbrDailyRate, ExternalRate, ExternalRateSnapshot};
use crate::payment_system::{ExchangeRate, PaymentSystem};
use crate::rate_source::RateSource;
use crate::view::View;

/// Committed row ids grouped by `G`, unique by `K` within a group.
pub(crate) type SecondaryIndex<G, K, I> = BTreeMap<G, BTreeMap<K, I>>;

/// Every table of the store plus the repository-level actual pointers.
///
/// Secondary indexes cover committed rows of the append-only tables only.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    pub(crate) rate_sources: BTreeMap<RateSourceId, RateSource>,
    pub(crate) external_rate_snapshots: BTreeMap<ExternalRateSnapshotId, ExternalRateSnapshot>,
    pub(crate) external_rates: BTreeMap<ExternalRateId, ExternalRate>,
    pub(crate) cbr_daily_rates: BTreeMap<CbrDailyRateId, CbrDailyRate>,
    pub(crate) mode_snapshots: BTreeMap<CurrencyRateModeSnapshotId, CurrencyRateModeSnapshot>,
    pub(crate) modes: BTreeMap<CurrencyRateModeId, CurrencyRateMode>,
    pub(crate) currency_rate_snapshots: BTreeMap<CurrencyRateSnapshotId, CurrencyRateSnapshot>,
    pub(crate) currency_rates: BTreeMap<CurrencyRateId, CurrencyRate>,
    pub(crate) payment_systems: BTreeMap<PaymentSystemId, PaymentSystem>,
    pub(crate) exchange_rates: BTreeMap<ExchangeRateId, ExchangeRate>,
    pub(crate) direction_rate_snapshots: BTreeMap<DirectionRateSnapshotId, DirectionRateSnapshot>,
    pub(crate) direction_rates: BTreeMap<DirectionRateId, DirectionRate>,
    pub(crate) actual_currency_rate_snapshot: Option<CurrencyRateSnapshotId>,
    pub(crate) actual_direction_rate_snapshot: Option<DirectionRateSnapshotId>,
    pub(crate) external_rates_by_snapshot: SecondaryIndex<ExternalRateSnapshotId, CurrencyPair, ExternalRateId>,
    pub(crate) cbr_daily_rates_by_pair: SecondaryIndex<CurrencyPair, NaiveDate, CbrDailyRateId>,
    pub(crate) modes_by_snapshot: SecondaryIndex<CurrencyRateModeSnapshotId, CurrencyPair, CurrencyRateModeId>,
    pub(crate) currency_rates_by_snapshot: SecondaryIndex<CurrencyRateSnapshotId, CurrencyPair, CurrencyRateId>,
}

impl Tables {
    /// Number of rows held across every table.
    pub fn row_count(&self) -> usize {
        self.rate_sources.len()
            + self.external_rate_snapshots.len()
            + self.external_rates.len()
            + self.cbr_daily_rates.len()
            + self.mode_snapshots.len()
            + self.modes.len()
            + self.currency_rate_snapshots.len()
            + self.currency_rates.len()
            + self.payment_systems.len()
            + self.exchange_rates.len()
            + self.direction_rate_snapshots.len()
            + self.direction_rates.len()
    }
}

/// A row type stored in one table.
pub trait Record: Clone + Send + Sync + 'static {
    /// Surrogate key of the table.
    type Id: Copy + Ord + fmt::Display + Send + Sync;

    /// Table name used in errors and logs.
    const TABLE: &'static str;

    /// Whether committed rows may be replaced by `Transaction::update`.
    const MUTABLE: bool = false;

    fn id(&self) -> Self::Id;

    fn rows(tables: &Tables) -> &BTreeMap<Self::Id, Self>;

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Id, Self>;

    /// Validate the row against everything visible in `view`.
    ///
    /// Called on insert, on update and again at commit time. The row itself
    /// may already be visible in `view`; uniqueness checks skip it.
    fn check(&self, _view: &View<'_>) -> StoreResult<()> {
        Ok(())
    }

    /// Record a row merged into committed state in the table's secondary
    /// indexes. Only immutable tables keep indexes.
    fn index(_tables: &mut Tables, _row: &Self) {}
}

pub(crate) fn index_row<G: Ord, K: Ord, I>(index: &mut SecondaryIndex<G, K, I>, group: G, key: K, id: I) {
    index.entry(group).or_default().insert(key, id);
}

/// Foreign key check.
pub(crate) fn require<R: Record>(
    view: &View<'_>,
    table: &'static str,
    column: &'static str,
    id: R::Id,
) -> StoreResult<()> {
    if view.get::<R>(id).is_none() {
        return Err(StoreError::ForeignKeyViolation {
            table,
            column,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Positive decimal check.
pub(crate) fn positive(table: &'static str, column: &str, value: Decimal) -> StoreResult<()> {
    if value <= Decimal::ZERO {
        return Err(StoreError::Validation {
            table,
            message: format!("{} must be positive, got {}", column, value),
        });
    }
    Ok(())
}

pub(crate) fn invalid(table: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Validation {
        table,
        message: message.into(),
    }
}

pub(crate) fn duplicate(table: &'static str, constraint: &'static str, key: impl fmt::Display) -> StoreError {
    StoreError::UniqueViolation {
        table,
        constraint,
        key: key.to_string(),
    }
}
