//! Currency rate mode generations.
//!
//! A generation starts as a draft, receives its per-pair modes, and is
//! activated as a whole. Activation archives the previous generation in the
//! same transaction, so exactly one generation is in effect for readers.

use std::sync::Arc;

use tracing::info;

use gera_common::{CurrencyPair, CurrencyRateModeId, CurrencyRateModeSnapshotId};
use gera_store::{
    CurrencyRateMode, CurrencyRateModeSnapshot, Database, LockScope, ModeSnapshotStatus, RateMode, Transaction,
};

use crate::error::{RatesError, RatesResult};

pub struct CurrencyRateModes {
    db: Arc<Database>,
}

impl CurrencyRateModes {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn draft(tx: &Transaction<'_>, id: CurrencyRateModeSnapshotId) -> RatesResult<CurrencyRateModeSnapshot> {
        let snapshot = tx
            .view(|view| view.mode_snapshot(id).cloned())
            .ok_or_else(|| RatesError::UnknownModeSnapshot(id.to_string()))?;
        if snapshot.status != ModeSnapshotStatus::Draft {
            return Err(RatesError::NotDraft(snapshot.title));
        }
        Ok(snapshot)
    }

    pub async fn create_draft(
        &self,
        title: impl Into<String>,
        details: Option<String>,
    ) -> RatesResult<CurrencyRateModeSnapshotId> {
        let mut snapshot = CurrencyRateModeSnapshot::draft(title);
        snapshot.details = details;

        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let id = tx.insert(snapshot)?;
        tx.commit()?;
        Ok(id)
    }

    /// Add the mode for `pair` to a draft generation.
    pub async fn add_mode(
        &self,
        snapshot_id: CurrencyRateModeSnapshotId,
        pair: CurrencyPair,
        mode: RateMode,
    ) -> RatesResult<CurrencyRateModeId> {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        Self::draft(&tx, snapshot_id)?;
        let id = tx.insert(CurrencyRateMode::new(snapshot_id, pair, mode))?;
        tx.commit()?;
        Ok(id)
    }

    /// Put a draft generation in effect.
    pub async fn activate(&self, snapshot_id: CurrencyRateModeSnapshotId) -> RatesResult<()> {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let mut snapshot = Self::draft(&tx, snapshot_id)?;

        if let Some(mut previous) = tx.view(|view| view.active_mode_snapshot().cloned()) {
            info!(title = %previous.title, "Archiving currency rate mode snapshot");
            previous.status = ModeSnapshotStatus::Archived;
            tx.update(previous)?;
        }

        info!(title = %snapshot.title, "Activating currency rate mode snapshot");
        snapshot.status = ModeSnapshotStatus::Active;
        tx.update(snapshot)?;
        tx.commit()?;
        Ok(())
    }

    /// Copy the active generation into a new draft.
    pub async fn fork_active(&self, title: impl Into<String>) -> RatesResult<CurrencyRateModeSnapshotId> {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let draft = CurrencyRateModeSnapshot::draft(title);
        let draft_id = tx.insert(draft)?;

        let modes: Vec<CurrencyRateMode> = tx.view(|view| match view.active_mode_snapshot() {
            Some(active) => view.modes_in(active.id).into_iter().cloned().collect(),
            None => Vec::new(),
        });
        for mode in modes {
            tx.insert(CurrencyRateMode::new(draft_id, mode.currency_pair, mode.mode))?;
        }
        tx.commit()?;
        Ok(draft_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_common::Currency;

    fn usd_rub() -> CurrencyPair {
        CurrencyPair::new(Currency::usd(), Currency::rub())
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let db = Arc::new(Database::new());
        let modes = CurrencyRateModes::new(db.clone());

        let first = modes.create_draft("v1", None).await.unwrap();
        modes
            .add_mode(first, usd_rub(), RateMode::Direct { rate_source_id: None })
            .await
            .unwrap();
        modes.activate(first).await.unwrap();

        // Active generations are frozen.
        let frozen = modes
            .add_mode(first, usd_rub().inverse(), RateMode::Direct { rate_source_id: None })
            .await;
        assert!(matches!(frozen, Err(RatesError::NotDraft(_))));

        let second = modes.fork_active("v2").await.unwrap();
        assert_eq!(db.read(|v| v.modes_in(second).len()), 1);
        modes.activate(second).await.unwrap();

        db.read(|v| {
            assert_eq!(v.active_mode_snapshot().unwrap().id, second);
            assert_eq!(v.mode_snapshot(first).unwrap().status, ModeSnapshotStatus::Archived);
        });
    }

    #[tokio::test]
    async fn test_duplicate_title_is_rejected() {
        let db = Arc::new(Database::new());
        let modes = CurrencyRateModes::new(db);
        modes.create_draft("v1", None).await.unwrap();
        assert!(matches!(
            modes.create_draft("v1", None).await,
            Err(RatesError::Store(_))
        ));
    }
}
