//! Rate source configuration rows.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gera_common::{now, ExternalRateSnapshotId, RateSourceId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::external_rate::ExternalRateSnapshot;
use crate::tables::{duplicate, invalid, Record, Tables};
use crate::view::View;

/// Which fetcher feeds a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Central bank daily rates.
    Cbr,
    /// Averaged central bank rates.
    CbrAvg,
    /// Crypto exchange tickers.
    Bitfinex,
    /// Rates entered by operators.
    Manual,
}

/// An external quote provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateSource {
    pub id: RateSourceId,
    /// Stable lookup key (`cbr`, `bitfinex`, ...).
    pub key: String,
    pub title: String,
    pub kind: SourceKind,
    /// Higher wins when a direct mode does not name a source.
    pub priority: i32,
    pub is_enabled: bool,
    /// Cached tradable tickers.
    pub supported_tickers: BTreeSet<String>,
    pub supported_tickers_updated_at: Option<Timestamp>,
    /// Last fully published snapshot.
    pub actual_snapshot_id: Option<ExternalRateSnapshotId>,
    pub created_at: Timestamp,
}

impl RateSource {
    /// Create an enabled source with no published snapshot.
    pub fn new(key: impl Into<String>, title: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: RateSourceId::new(),
            key: key.into(),
            title: title.into(),
            kind,
            priority: 0,
            is_enabled: true,
            supported_tickers: BTreeSet::new(),
            supported_tickers_updated_at: None,
            actual_snapshot_id: None,
            created_at: now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Record for RateSource {
    type Id = RateSourceId;
    const TABLE: &'static str = "rate_sources";
    const MUTABLE: bool = true;

    fn id(&self) -> RateSourceId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<RateSourceId, Self> {
        &tables.rate_sources
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<RateSourceId, Self> {
        &mut tables.rate_sources
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        if self.key.trim().is_empty() {
            return Err(invalid(Self::TABLE, "key must not be blank"));
        }
        if view
            .iter::<RateSource>()
            .any(|other| other.id != self.id && other.key == self.key)
        {
            return Err(duplicate(Self::TABLE, "key", &self.key));
        }
        if let Some(snapshot_id) = self.actual_snapshot_id {
            match view.get::<ExternalRateSnapshot>(snapshot_id) {
                Some(snapshot) if snapshot.rate_source_id == self.id => {}
                Some(_) => {
                    return Err(invalid(
                        Self::TABLE,
                        format!("actual snapshot {} belongs to another source", snapshot_id),
                    ))
                }
                None => {
                    return Err(StoreError::ForeignKeyViolation {
                        table: Self::TABLE,
                        column: "actual_snapshot_id",
                        id: snapshot_id.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
