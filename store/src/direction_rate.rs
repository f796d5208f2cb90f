//! Fee-adjusted rates between payment systems.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gera_common::{
    now, CurrencyRateId, DirectionRateId, DirectionRateSnapshotId, ExchangeRateId, PaymentSystemId,
    Timestamp,
};

use crate::currency_rate::CurrencyRate;
use crate::error::StoreResult;
use crate::payment_system::{ExchangeRate, PaymentSystem};
use crate::tables::{invalid, positive, require, Record, Tables};
use crate::view::View;

/// Batch marker for one direction worker run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionRateSnapshot {
    pub id: DirectionRateSnapshotId,
    pub created_at: Timestamp,
}

impl DirectionRateSnapshot {
    pub fn new() -> Self {
        Self {
            id: DirectionRateSnapshotId::new(),
            created_at: now(),
        }
    }
}

impl Default for DirectionRateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Record for DirectionRateSnapshot {
    type Id = DirectionRateSnapshotId;
    const TABLE: &'static str = "direction_rate_snapshots";

    fn id(&self) -> DirectionRateSnapshotId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<DirectionRateSnapshotId, Self> {
        &tables.direction_rate_snapshots
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<DirectionRateSnapshotId, Self> {
        &mut tables.direction_rate_snapshots
    }
}

/// Price of moving money from one payment system to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionRate {
    pub id: DirectionRateId,
    pub snapshot_id: DirectionRateSnapshotId,
    pub exchange_rate_id: ExchangeRateId,
    pub ps_from_id: PaymentSystemId,
    pub ps_to_id: PaymentSystemId,
    pub currency_rate_id: CurrencyRateId,
    pub base_rate_value: Decimal,
    /// Commission in percent.
    pub rate_percent: Decimal,
    pub rate_value: Decimal,
    /// Set once routing has quoted this rate to a customer.
    pub is_used: bool,
    pub created_at: Timestamp,
}

impl DirectionRate {
    /// `base × (1 − percent / 100)`
    pub fn compute_rate_value(base_rate_value: Decimal, rate_percent: Decimal) -> Decimal {
        base_rate_value * (Decimal::ONE - rate_percent / Decimal::ONE_HUNDRED)
    }

    pub fn new(
        snapshot_id: DirectionRateSnapshotId,
        exchange_rate: &ExchangeRate,
        currency_rate: &CurrencyRate,
    ) -> Self {
        let base_rate_value = currency_rate.rate_value;
        let rate_percent = exchange_rate.commission;
        Self {
            id: DirectionRateId::new(),
            snapshot_id,
            exchange_rate_id: exchange_rate.id,
            ps_from_id: exchange_rate.income_payment_system_id,
            ps_to_id: exchange_rate.outcome_payment_system_id,
            currency_rate_id: currency_rate.id,
            base_rate_value,
            rate_percent,
            rate_value: Self::compute_rate_value(base_rate_value, rate_percent),
            is_used: false,
            created_at: now(),
        }
    }
}

impl Record for DirectionRate {
    type Id = DirectionRateId;
    const TABLE: &'static str = "direction_rates";
    const MUTABLE: bool = true;

    fn id(&self) -> DirectionRateId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<DirectionRateId, Self> {
        &tables.direction_rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<DirectionRateId, Self> {
        &mut tables.direction_rates
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        if self.rate_percent.is_sign_negative() || self.rate_percent >= Decimal::ONE_HUNDRED {
            return Err(invalid(
                Self::TABLE,
                format!("rate_percent must be in [0, 100), got {}", self.rate_percent),
            ));
        }
        positive(Self::TABLE, "base_rate_value", self.base_rate_value)?;
        positive(Self::TABLE, "rate_value", self.rate_value)?;

        require::<DirectionRateSnapshot>(view, Self::TABLE, "snapshot_id", self.snapshot_id)?;
        require::<PaymentSystem>(view, Self::TABLE, "ps_from_id", self.ps_from_id)?;
        require::<PaymentSystem>(view, Self::TABLE, "ps_to_id", self.ps_to_id)?;

        let exchange_rate = view.get::<ExchangeRate>(self.exchange_rate_id);
        let currency_rate = view.get::<CurrencyRate>(self.currency_rate_id);
        match (exchange_rate, currency_rate) {
            (Some(exchange_rate), Some(currency_rate)) => {
                if exchange_rate.currency_pair != currency_rate.currency_pair {
                    return Err(invalid(
                        Self::TABLE,
                        format!(
                            "currency rate {} does not match exchange rate {}",
                            currency_rate.currency_pair, exchange_rate.currency_pair
                        ),
                    ));
                }
                Ok(())
            }
            (None, _) => require::<ExchangeRate>(view, Self::TABLE, "exchange_rate_id", self.exchange_rate_id),
            (_, None) => require::<CurrencyRate>(view, Self::TABLE, "currency_rate_id", self.currency_rate_id),
        }
    }
}
