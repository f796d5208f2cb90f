//! Currency rate routing configuration and resolved rates.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gera_common::{
    now, CurrencyPair, CurrencyRateId, CurrencyRateModeId, CurrencyRateModeSnapshotId,
    CurrencyRateSnapshotId, ExternalRateId, RateSourceId, Timestamp,
};

use crate::error::StoreResult;
use crate::external_rate::ExternalRate;
use crate::rate_source::RateSource;
use crate::tables::{duplicate, index_row, invalid, positive, require, Record, Tables};
use crate::view::View;

/// Longest supported cross chain.
pub const MAX_CROSS_LEGS: usize = 3;

/// Lifecycle of a mode configuration generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSnapshotStatus {
    Draft,
    Active,
    Archived,
}

impl fmt::Display for ModeSnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeSnapshotStatus::Draft => write!(f, "draft"),
            ModeSnapshotStatus::Active => write!(f, "active"),
            ModeSnapshotStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A named generation of routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRateModeSnapshot {
    pub id: CurrencyRateModeSnapshotId,
    pub title: String,
    pub details: Option<String>,
    pub status: ModeSnapshotStatus,
    pub created_at: Timestamp,
}

impl CurrencyRateModeSnapshot {
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            id: CurrencyRateModeSnapshotId::new(),
            title: title.into(),
            details: None,
            status: ModeSnapshotStatus::Draft,
            created_at: now(),
        }
    }
}

impl Record for CurrencyRateModeSnapshot {
    type Id = CurrencyRateModeSnapshotId;
    const TABLE: &'static str = "currency_rate_mode_snapshots";
    const MUTABLE: bool = true;

    fn id(&self) -> CurrencyRateModeSnapshotId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<CurrencyRateModeSnapshotId, Self> {
        &tables.mode_snapshots
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CurrencyRateModeSnapshotId, Self> {
        &mut tables.mode_snapshots
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(invalid(Self::TABLE, "title must not be blank"));
        }
        for other in view.iter::<CurrencyRateModeSnapshot>() {
            if other.id == self.id {
                continue;
            }
            if other.title == self.title {
                return Err(duplicate(Self::TABLE, "title", &self.title));
            }
            if self.status == ModeSnapshotStatus::Active && other.status == ModeSnapshotStatus::Active {
                return Err(duplicate(Self::TABLE, "single_active", other.id));
            }
        }
        Ok(())
    }
}

/// One hop of a cross rate chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossLeg {
    pub currency_pair: CurrencyPair,
    pub rate_source_id: RateSourceId,
}

/// How a pair is priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateMode {
    /// Read one source. Without a source the highest priority source that
    /// quotes the pair is used.
    Direct { rate_source_id: Option<RateSourceId> },
    /// Multiply a chain of quotes.
    Cross { legs: Vec<CrossLeg> },
}

impl RateMode {
    /// Check the chain runs from `pair.from` to `pair.to` without gaps.
    pub fn validate_for(&self, pair: &CurrencyPair) -> Result<(), String> {
        let RateMode::Cross { legs } = self else {
            return Ok(());
        };
        if legs.is_empty() || legs.len() > MAX_CROSS_LEGS {
            return Err(format!(
                "cross chain needs 1 to {} legs, got {}",
                MAX_CROSS_LEGS,
                legs.len()
            ));
        }
        let mut at = &pair.from;
        for leg in legs {
            if &leg.currency_pair.from != at {
                return Err(format!(
                    "leg {} does not continue from {}",
                    leg.currency_pair, at
                ));
            }
            at = &leg.currency_pair.to;
        }
        if at != &pair.to {
            return Err(format!("chain ends at {} instead of {}", at, pair.to));
        }
        Ok(())
    }
}

/// A routing rule for one pair inside a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRateMode {
    pub id: CurrencyRateModeId,
    pub mode_snapshot_id: CurrencyRateModeSnapshotId,
    pub currency_pair: CurrencyPair,
    pub mode: RateMode,
    pub created_at: Timestamp,
}

impl CurrencyRateMode {
    pub fn new(mode_snapshot_id: CurrencyRateModeSnapshotId, currency_pair: CurrencyPair, mode: RateMode) -> Self {
        Self {
            id: CurrencyRateModeId::new(),
            mode_snapshot_id,
            currency_pair,
            mode,
            created_at: now(),
        }
    }
}

impl Record for CurrencyRateMode {
    type Id = CurrencyRateModeId;
    const TABLE: &'static str = "currency_rate_modes";

    fn id(&self) -> CurrencyRateModeId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<CurrencyRateModeId, Self> {
        &tables.modes
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CurrencyRateModeId, Self> {
        &mut tables.modes
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        require::<CurrencyRateModeSnapshot>(view, Self::TABLE, "mode_snapshot_id", self.mode_snapshot_id)?;
        self.mode
            .validate_for(&self.currency_pair)
            .map_err(|message| invalid(Self::TABLE, message))?;
        match &self.mode {
            RateMode::Direct { rate_source_id: Some(source_id) } => {
                require::<RateSource>(view, Self::TABLE, "rate_source_id", *source_id)?;
            }
            RateMode::Direct { rate_source_id: None } => {}
            RateMode::Cross { legs } => {
                for leg in legs {
                    require::<RateSource>(view, Self::TABLE, "rate_source_id", leg.rate_source_id)?;
                }
            }
        }
        if view.mode_taken(self) {
            return Err(duplicate(
                Self::TABLE,
                "mode_snapshot_id_currency_pair",
                format!("{} {}", self.mode_snapshot_id, self.currency_pair),
            ));
        }
        Ok(())
    }

    fn index(tables: &mut Tables, row: &Self) {
        index_row(
            &mut tables.modes_by_snapshot,
            row.mode_snapshot_id,
            row.currency_pair.clone(),
            row.id,
        );
    }
}

/// Batch marker for one currency rate resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRateSnapshot {
    pub id: CurrencyRateSnapshotId,
    /// Generation in effect, absent when none was active.
    pub mode_snapshot_id: Option<CurrencyRateModeSnapshotId>,
    pub created_at: Timestamp,
}

impl CurrencyRateSnapshot {
    pub fn new(mode_snapshot_id: Option<CurrencyRateModeSnapshotId>) -> Self {
        Self {
            id: CurrencyRateSnapshotId::new(),
            mode_snapshot_id,
            created_at: now(),
        }
    }
}

impl Record for CurrencyRateSnapshot {
    type Id = CurrencyRateSnapshotId;
    const TABLE: &'static str = "currency_rate_snapshots";

    fn id(&self) -> CurrencyRateSnapshotId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<CurrencyRateSnapshotId, Self> {
        &tables.currency_rate_snapshots
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CurrencyRateSnapshotId, Self> {
        &mut tables.currency_rate_snapshots
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        match self.mode_snapshot_id {
            Some(id) => require::<CurrencyRateModeSnapshot>(view, Self::TABLE, "mode_snapshot_id", id),
            None => Ok(()),
        }
    }
}

/// Mode a resolved rate was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedMode {
    /// Both sides are the same currency.
    Same,
    Direct,
    Cross,
}

/// A resolved rate for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub id: CurrencyRateId,
    pub snapshot_id: CurrencyRateSnapshotId,
    pub currency_pair: CurrencyPair,
    pub rate_value: Decimal,
    pub mode: ResolvedMode,
    /// Source of a direct rate.
    pub rate_source_id: Option<RateSourceId>,
    /// Contributing quotes, in chain order.
    pub external_rate_ids: Vec<ExternalRateId>,
    pub created_at: Timestamp,
}

impl Record for CurrencyRate {
    type Id = CurrencyRateId;
    const TABLE: &'static str = "currency_rates";

    fn id(&self) -> CurrencyRateId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<CurrencyRateId, Self> {
        &tables.currency_rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<CurrencyRateId, Self> {
        &mut tables.currency_rates
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        positive(Self::TABLE, "rate_value", self.rate_value)?;
        require::<CurrencyRateSnapshot>(view, Self::TABLE, "snapshot_id", self.snapshot_id)?;
        if self.external_rate_ids.len() > MAX_CROSS_LEGS {
            return Err(invalid(Self::TABLE, "too many contributing external rates"));
        }
        for external_rate_id in &self.external_rate_ids {
            require::<ExternalRate>(view, Self::TABLE, "external_rate_id", *external_rate_id)?;
        }
        if view.currency_rate_taken(self) {
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
            &mut tables.currency_rates_by_snapshot,
            row.snapshot_id,
            row.currency_pair.clone(),
            row.id,
        );
    }
}
