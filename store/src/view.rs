//! Read access over committed state, optionally overlaid with pending writes.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use gera_common::{
    CurrencyPair, CurrencyRateId, CurrencyRateModeSnapshotId, CurrencyRateSnapshotId,
    DirectionRateId, DirectionRateSnapshotId, ExchangeRateId, ExternalRateSnapshotId,
    PaymentSystemId, RateSourceId,
};

use crate::currency_rate::{
    CurrencyRate, CurrencyRateMode, CurrencyRateModeSnapshot, CurrencyRateSnapshot, ModeSnapshotStatus,
};
use crate::direction_rate::{DirectionRate, DirectionRateSnapshot};
use crate::external_rate::{CbrDailyRate, ExternalRate, ExternalRateSnapshot};
use crate::payment_system::{ExchangeRate, PaymentSystem};
use crate::rate_source::RateSource;
use crate::tables::{Record, SecondaryIndex, Tables};

/// A consistent read view.
///
/// Inside a transaction the pending writes shadow committed rows with the
/// same id, so a transaction reads its own writes.
#[derive(Clone, Copy)]
pub struct View<'a> {
    committed: &'a Tables,
    pending: Option<&'a Tables>,
}

impl<'a> View<'a> {
    pub(crate) fn committed(committed: &'a Tables) -> Self {
        Self {
            committed,
            pending: None,
        }
    }

    pub(crate) fn overlay(committed: &'a Tables, pending: &'a Tables) -> Self {
        Self {
            committed,
            pending: Some(pending),
        }
    }

    /// Look up a row by id.
    pub fn get<R: Record>(&self, id: R::Id) -> Option<&'a R> {
        if let Some(row) = self.pending.and_then(|p| R::rows(p).get(&id)) {
            return Some(row);
        }
        R::rows(self.committed).get(&id)
    }

    /// Iterate rows in no particular order.
    pub fn iter<R: Record>(&self) -> impl Iterator<Item = &'a R> + 'a {
        let pending = self.pending.map(|p| R::rows(p));
        R::rows(self.committed)
            .values()
            .filter(move |row| pending.map_or(true, |p| !p.contains_key(&row.id())))
            .chain(pending.into_iter().flat_map(|p| p.values()))
    }

    /// Rows sorted by id.
    pub fn rows<R: Record>(&self) -> impl Iterator<Item = &'a R> + 'a {
        let sorted: BTreeMap<R::Id, &'a R> = self.iter::<R>().map(|row| (row.id(), row)).collect();
        sorted.into_values()
    }

    pub fn count<R: Record>(&self) -> usize {
        self.iter::<R>().count()
    }

    fn pending_rows<R: Record>(&self) -> impl Iterator<Item = &'a R> + 'a {
        self.pending.into_iter().flat_map(|p| R::rows(p).values())
    }

    /// Lookup by unique secondary key: pending rows first, then the index.
    fn find_keyed<R, G, K>(
        &self,
        index: &'a SecondaryIndex<G, K, R::Id>,
        group: &G,
        key: &K,
        matches: impl Fn(&R) -> bool,
    ) -> Option<&'a R>
    where
        R: Record,
        G: Ord,
        K: Ord,
    {
        if let Some(row) = self.pending_rows::<R>().find(|row| matches(*row)) {
            return Some(row);
        }
        let id = index.get(group)?.get(key)?;
        R::rows(self.committed).get(id)
    }

    /// Every row of one index group, committed rows in key order first.
    fn grouped<R, G, K>(
        &self,
        index: &'a SecondaryIndex<G, K, R::Id>,
        group: &G,
        matches: impl Fn(&R) -> bool,
    ) -> Vec<&'a R>
    where
        R: Record,
        G: Ord,
        K: Ord,
    {
        let committed = R::rows(self.committed);
        let mut rows: Vec<&'a R> = index
            .get(group)
            .into_iter()
            .flat_map(|keyed| keyed.values())
            .filter_map(|id| committed.get(id))
            .collect();
        rows.extend(self.pending_rows::<R>().filter(|row| matches(*row)));
        rows
    }

    /// Whether a row other than `id` holds the secondary key.
    fn key_taken<R, G, K>(
        &self,
        index: &'a SecondaryIndex<G, K, R::Id>,
        group: &G,
        key: &K,
        id: R::Id,
        matches: impl Fn(&R) -> bool,
    ) -> bool
    where
        R: Record,
        G: Ord,
        K: Ord,
    {
        self.pending_rows::<R>().any(|row| row.id() != id && matches(row))
            || index
                .get(group)
                .and_then(|keyed| keyed.get(key))
                .is_some_and(|other| *other != id)
    }

    // Rate sources

    pub fn rate_source(&self, id: RateSourceId) -> Option<&'a RateSource> {
        self.get::<RateSource>(id)
    }

    pub fn rate_source_by_key(&self, key: &str) -> Option<&'a RateSource> {
        self.iter::<RateSource>().find(|source| source.key == key)
    }

    // External rates

    pub fn external_rate_snapshot(&self, id: ExternalRateSnapshotId) -> Option<&'a ExternalRateSnapshot> {
        self.get::<ExternalRateSnapshot>(id)
    }

    /// The quote for `pair` inside one source snapshot.
    pub fn external_rate(&self, snapshot_id: ExternalRateSnapshotId, pair: &CurrencyPair) -> Option<&'a ExternalRate> {
        self.find_keyed(&self.committed.external_rates_by_snapshot, &snapshot_id, pair, |rate: &ExternalRate| {
            rate.snapshot_id == snapshot_id && &rate.currency_pair == pair
        })
    }

    pub fn external_rates_in(&self, snapshot_id: ExternalRateSnapshotId) -> Vec<&'a ExternalRate> {
        let mut rates = self.grouped(&self.committed.external_rates_by_snapshot, &snapshot_id, |rate: &ExternalRate| {
            rate.snapshot_id == snapshot_id
        });
        rates.sort_by(|a, b| a.currency_pair.cmp(&b.currency_pair));
        rates
    }

    pub(crate) fn external_rate_taken(&self, rate: &ExternalRate) -> bool {
        self.key_taken(
            &self.committed.external_rates_by_snapshot,
            &rate.snapshot_id,
            &rate.currency_pair,
            rate.id,
            |other: &ExternalRate| other.snapshot_id == rate.snapshot_id && other.currency_pair == rate.currency_pair,
        )
    }

    /// The quote for `pair` in the source's actual snapshot.
    ///
    /// Disabled sources and sources without an actual snapshot quote nothing.
    pub fn actual_external_rate(&self, source_id: RateSourceId, pair: &CurrencyPair) -> Option<&'a ExternalRate> {
        let source = self.rate_source(source_id)?;
        if !source.is_enabled {
            return None;
        }
        self.external_rate(source.actual_snapshot_id?, pair)
    }

    // Daily bank samples

    pub fn has_cbr_daily_rate(&self, pair: &CurrencyPair, date: NaiveDate) -> bool {
        self.find_keyed(&self.committed.cbr_daily_rates_by_pair, pair, &date, |rate: &CbrDailyRate| {
            rate.date == date && &rate.currency_pair == pair
        })
        .is_some()
    }

    /// Samples for a pair, most recent date first.
    pub fn cbr_daily_rates_for(&self, pair: &CurrencyPair) -> Vec<&'a CbrDailyRate> {
        let mut rates = self.grouped(&self.committed.cbr_daily_rates_by_pair, pair, |rate: &CbrDailyRate| {
            &rate.currency_pair == pair
        });
        rates.sort_by(|a, b| b.date.cmp(&a.date));
        rates
    }

    pub(crate) fn cbr_daily_rate_taken(&self, rate: &CbrDailyRate) -> bool {
        self.key_taken(
            &self.committed.cbr_daily_rates_by_pair,
            &rate.currency_pair,
            &rate.date,
            rate.id,
            |other: &CbrDailyRate| other.date == rate.date && other.currency_pair == rate.currency_pair,
        )
    }

    // Currency rate modes

    pub fn mode_snapshot(&self, id: CurrencyRateModeSnapshotId) -> Option<&'a CurrencyRateModeSnapshot> {
        self.get::<CurrencyRateModeSnapshot>(id)
    }

    pub fn active_mode_snapshot(&self) -> Option<&'a CurrencyRateModeSnapshot> {
        self.iter::<CurrencyRateModeSnapshot>()
            .find(|snapshot| snapshot.status == ModeSnapshotStatus::Active)
    }

    pub fn mode_snapshot_by_title(&self, title: &str) -> Option<&'a CurrencyRateModeSnapshot> {
        self.iter::<CurrencyRateModeSnapshot>()
            .find(|snapshot| snapshot.title == title)
    }

    pub fn modes_in(&self, snapshot_id: CurrencyRateModeSnapshotId) -> Vec<&'a CurrencyRateMode> {
        let mut modes = self.grouped(&self.committed.modes_by_snapshot, &snapshot_id, |mode: &CurrencyRateMode| {
            mode.mode_snapshot_id == snapshot_id
        });
        modes.sort_by(|a, b| a.currency_pair.cmp(&b.currency_pair));
        modes
    }

    pub fn mode_for(&self, snapshot_id: CurrencyRateModeSnapshotId, pair: &CurrencyPair) -> Option<&'a CurrencyRateMode> {
        self.find_keyed(&self.committed.modes_by_snapshot, &snapshot_id, pair, |mode: &CurrencyRateMode| {
            mode.mode_snapshot_id == snapshot_id && &mode.currency_pair == pair
        })
    }

    pub(crate) fn mode_taken(&self, mode: &CurrencyRateMode) -> bool {
        self.key_taken(
            &self.committed.modes_by_snapshot,
            &mode.mode_snapshot_id,
            &mode.currency_pair,
            mode.id,
            |other: &CurrencyRateMode| {
                other.mode_snapshot_id == mode.mode_snapshot_id && other.currency_pair == mode.currency_pair
            },
        )
    }

    // Currency rates

    pub fn currency_rate(&self, id: CurrencyRateId) -> Option<&'a CurrencyRate> {
        self.get::<CurrencyRate>(id)
    }

    pub fn currency_rate_snapshot(&self, id: CurrencyRateSnapshotId) -> Option<&'a CurrencyRateSnapshot> {
        self.get::<CurrencyRateSnapshot>(id)
    }

    pub fn currency_rate_in(&self, snapshot_id: CurrencyRateSnapshotId, pair: &CurrencyPair) -> Option<&'a CurrencyRate> {
        self.find_keyed(&self.committed.currency_rates_by_snapshot, &snapshot_id, pair, |rate: &CurrencyRate| {
            rate.snapshot_id == snapshot_id && &rate.currency_pair == pair
        })
    }

    pub fn currency_rates_in(&self, snapshot_id: CurrencyRateSnapshotId) -> Vec<&'a CurrencyRate> {
        let mut rates = self.grouped(&self.committed.currency_rates_by_snapshot, &snapshot_id, |rate: &CurrencyRate| {
            rate.snapshot_id == snapshot_id
        });
        rates.sort_by(|a, b| a.currency_pair.cmp(&b.currency_pair));
        rates
    }

    pub(crate) fn currency_rate_taken(&self, rate: &CurrencyRate) -> bool {
        self.key_taken(
            &self.committed.currency_rates_by_snapshot,
            &rate.snapshot_id,
            &rate.currency_pair,
            rate.id,
            |other: &CurrencyRate| other.snapshot_id == rate.snapshot_id && other.currency_pair == rate.currency_pair,
        )
    }

    pub fn actual_currency_rate_snapshot_id(&self) -> Option<CurrencyRateSnapshotId> {
        self.pending
            .and_then(|p| p.actual_currency_rate_snapshot)
            .or(self.committed.actual_currency_rate_snapshot)
    }

    // Payment systems

    pub fn payment_system(&self, id: PaymentSystemId) -> Option<&'a PaymentSystem> {
        self.get::<PaymentSystem>(id)
    }

    pub fn payment_system_by_name(&self, name: &str) -> Option<&'a PaymentSystem> {
        self.iter::<PaymentSystem>().find(|ps| ps.name == name)
    }

    pub fn exchange_rate(&self, id: ExchangeRateId) -> Option<&'a ExchangeRate> {
        self.get::<ExchangeRate>(id)
    }

    pub fn exchange_rate_for(&self, income: PaymentSystemId, outcome: PaymentSystemId) -> Option<&'a ExchangeRate> {
        self.iter::<ExchangeRate>().find(|rate| {
            rate.income_payment_system_id == income && rate.outcome_payment_system_id == outcome
        })
    }

    // Direction rates

    pub fn direction_rate(&self, id: DirectionRateId) -> Option<&'a DirectionRate> {
        self.get::<DirectionRate>(id)
    }

    pub fn direction_rate_snapshot(&self, id: DirectionRateSnapshotId) -> Option<&'a DirectionRateSnapshot> {
        self.get::<DirectionRateSnapshot>(id)
    }

    pub fn direction_rates_in(&self, snapshot_id: DirectionRateSnapshotId) -> Vec<&'a DirectionRate> {
        self.rows::<DirectionRate>()
            .filter(|rate| rate.snapshot_id == snapshot_id)
            .collect()
    }

    pub fn direction_rates_for(&self, exchange_rate_id: ExchangeRateId) -> Vec<&'a DirectionRate> {
        self.rows::<DirectionRate>()
            .filter(|rate| rate.exchange_rate_id == exchange_rate_id)
            .collect()
    }

    pub fn actual_direction_rate_snapshot_id(&self) -> Option<DirectionRateSnapshotId> {
        self.pending
            .and_then(|p| p.actual_direction_rate_snapshot)
            .or(self.committed.actual_direction_rate_snapshot)
    }
}
