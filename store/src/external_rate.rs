//! Raw quotes ingested from external sources.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gera_common::{
    now, CbrDailyRateId, CurrencyPair, ExternalRateId, ExternalRateSnapshotId, RateSourceId, Timestamp,
};

use crate::error::{StoreError, StoreResult};
use crate::rate_source::RateSource;
use crate::tables::{duplicate, index_row, invalid, positive, require, Record, Tables};
use crate::view::View;

/// Batch marker for one fetch run of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRateSnapshot {
    pub id: ExternalRateSnapshotId,
    pub rate_source_id: RateSourceId,
    /// Moment the quotes describe.
    pub actual_for: Timestamp,
    pub created_at: Timestamp,
}

impl ExternalRateSnapshot {
    pub fn new(rate_source_id: RateSourceId, actual_for: Timestamp) -> Self {
        Self {
            id: ExternalRateSnapshotId::new(),
            rate_source_id,
            actual_for,
            created_at: now(),
        }
    }
}

impl Record for ExternalRateSnapshot {
    type Id = ExternalRateSnapshotId;
    const TABLE: &'static str = "external_rate_snapshots";

    fn id(&self) -> ExternalRateSnapshotId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<ExternalRateSnapshotId, Self> {
        &tables.external_rate_snapshots
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<ExternalRateSnapshotId, Self> {
        &mut tables.external_rate_snapshots
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        require::<RateSource>(view, Self::TABLE, "rate_source_id", self.rate_source_id)
    }
}

/// One normalized quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRate {
    pub id: ExternalRateId,
    pub source_id: RateSourceId,
    pub snapshot_id: ExternalRateSnapshotId,
    pub currency_pair: CurrencyPair,
    pub rate_value: Decimal,
    /// Raw upstream bid side, when the source has one.
    pub buy_price: Option<Decimal>,
    /// Raw upstream ask side, when the source has one.
    pub sell_price: Option<Decimal>,
    pub created_at: Timestamp,
}

impl ExternalRate {
    pub fn new(
        snapshot: &ExternalRateSnapshot,
        currency_pair: CurrencyPair,
        rate_value: Decimal,
    ) -> Self {
        Self {
            id: ExternalRateId::new(),
            source_id: snapshot.rate_source_id,
            snapshot_id: snapshot.id,
            currency_pair,
            rate_value,
            buy_price: None,
            sell_price: None,
            created_at: now(),
        }
    }

    /// Keep the raw prices the value was derived from.
    pub fn with_prices(mut self, buy_price: Decimal, sell_price: Decimal) -> Self {
        self.buy_price = Some(buy_price);
        self.sell_price = Some(sell_price);
        self
    }
}

impl Record for ExternalRate {
    type Id = ExternalRateId;
    const TABLE: &'static str = "external_rates";

    fn id(&self) -> ExternalRateId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<ExternalRateId, Self> {
        &tables.external_rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<ExternalRateId, Self> {
        &mut tables.external_rates
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        positive(Self::TABLE, "rate_value", self.rate_value)?;
        let snapshot = view
            .get::<ExternalRateSnapshot>(self.snapshot_id)
            .ok_or_else(|| StoreError::ForeignKeyViolation {
                table: Self::TABLE,
                column: "snapshot_id",
                id: self.snapshot_id.to_string(),
            })?;
        if snapshot.rate_source_id != self.source_id {
            return Err(invalid(Self::TABLE, "source does not own the snapshot"));
        }
        if view.external_rate_taken(self) {
            return Err(duplicate(
                Self::TABLE,
                "snapshot_id_currency_pair",
                format!("{} {}", self.snapshot_id, self.currency_pair),
            ));
        }
        Ok(())
    }

    fn index(tables: &mut Tables, row: &Self) {
        index_row(
            &mut tables.external_rates_by_snapshot,
            row.snapshot_id,
            row.currency_pair.clone(),
            row.id,
        );
    }
}

/// One raw daily sample from the central bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CbrDailyRate {
    pub id: CbrDailyRateId,
    pub date: NaiveDate,
    /// Always quoted into RUB.
    pub currency_pair: CurrencyPair,
    /// `original_rate / nominal`.
    pub rate: Decimal,
    pub original_rate: Decimal,
    pub nominal: Decimal,
    pub created_at: Timestamp,
}

impl CbrDailyRate {
    /// Decimal places kept on the per-unit rate.
    pub const ROUND: u32 = 15;

    pub fn new(date: NaiveDate, currency_pair: CurrencyPair, original_rate: Decimal, nominal: Decimal) -> Self {
        let rate = if nominal.is_zero() {
            Decimal::ZERO
        } else {
            (original_rate / nominal).round_dp(Self::ROUND)
        };
        Self {
            id: CbrDailyRateId::new(),
            date,
            currency_pair,
            rate,
            original_rate,
            nominal,
            created_at: now(),
        }
    }
}

impl Record for CbrDailyRate {
    type Id = CbrDailyRateId;
    const TABLE: &'static str = "cbr_daily_rates";

    fn id(&self) -> CbrDailyRateId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<CbrDailyRateId, Self> {
        &tables.cbr_daily_rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CbrDailyRateId, Self> {
        &mut tables.cbr_daily_rates
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        positive(Self::TABLE, "nominal", self.nominal)?;
        positive(Self::TABLE, "rate", self.rate)?;
        if view.cbr_daily_rate_taken(self) {
            return Err(duplicate(
                Self::TABLE,
                "currency_pair_date",
                format!("{} {}", self.currency_pair, self.date),
            ));
        }
        Ok(())
    }

    fn index(tables: &mut Tables, row: &Self) {
        index_row(&mut tables.cbr_daily_rates_by_pair, row.currency_pair.clone(), row.date, row.id);
    }
}
