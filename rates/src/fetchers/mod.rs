//! External rate fetchers.
//!
//! Each fetcher pulls quotes from one upstream, writes them as
//! `ExternalRate` rows under a fresh snapshot of its source and moves the
//! source's actual pointer in the same transaction.

mod bitfinex;
mod cbr;
mod cbr_avg;

pub use bitfinex::{decode_ticker, BitfinexRatesFetcher, DEFAULT_TICKERS, SUPPORTED_TICKERS_UPDATE_PERIOD_SECS};
pub use cbr::{fetch_window, CbrRatesFetcher, CBR_CURRENCIES};
pub use cbr_avg::CbrAvgRatesFetcher;

use async_trait::async_trait;
use serde::Serialize;

use gera_common::{ExternalRateSnapshotId, RateSourceId};
use gera_store::Transaction;

use crate::error::{RatesError, RatesResult};

/// Outcome of one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Source key.
    pub source: String,
    /// Snapshot published by the run, if any.
    pub snapshot_id: Option<ExternalRateSnapshotId>,
    /// Raw samples stored.
    pub ingested: usize,
    /// External rates written.
    pub written: usize,
    /// Items skipped after a recoverable error.
    pub skipped: usize,
}

impl FetchReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn published(&self) -> bool {
        self.snapshot_id.is_some()
    }
}

/// A fetcher the pipeline can run.
#[async_trait]
pub trait RatesFetcher: Send + Sync {
    /// Source key this fetcher publishes under.
    fn name(&self) -> &str;

    /// Fetch, normalize and publish one snapshot.
    async fn perform(&self) -> RatesResult<FetchReport>;
}

/// Move a source's actual pointer inside the publishing transaction.
pub(crate) fn publish_snapshot(
    tx: &mut Transaction<'_>,
    source_id: RateSourceId,
    snapshot_id: ExternalRateSnapshotId,
) -> RatesResult<()> {
    let mut source = tx
        .view(|view| view.rate_source(source_id).cloned())
        .ok_or_else(|| RatesError::UnknownSource(source_id.to_string()))?;
    source.actual_snapshot_id = Some(snapshot_id);
    tx.update(source)?;
    Ok(())
}
