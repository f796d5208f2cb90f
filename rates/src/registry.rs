//! Rate source registry.

use std::collections::BTreeMap;

use tracing::info;

use gera_common::RateSourceId;
use gera_store::{Database, LockScope, RateSource, SourceKind};

use crate::error::{RatesError, RatesResult};

/// Central bank daily rates.
pub const CBR: &str = "cbr";
/// Averaged central bank rates.
pub const CBR_AVG: &str = "cbr_avg";
/// Bitfinex tickers.
pub const BITFINEX: &str = "bitfinex";

/// The sources every deployment carries.
pub fn default_sources() -> Vec<RateSource> {
    vec![
        RateSource::new(CBR, "Central Bank of Russia", SourceKind::Cbr).with_priority(20),
        RateSource::new(CBR_AVG, "Central Bank of Russia (average)", SourceKind::CbrAvg).with_priority(10),
        RateSource::new(BITFINEX, "Bitfinex", SourceKind::Bitfinex).with_priority(30),
    ]
}

/// Maps source keys to provisioned source ids.
///
/// Source rows themselves are read from the store on use, so enabled
/// flags and actual pointers are always current.
#[derive(Debug, Clone, Default)]
pub struct RateSourceRegistry {
    ids: BTreeMap<String, RateSourceId>,
}

impl RateSourceRegistry {
    /// Register every committed source.
    pub fn load(db: &Database) -> Self {
        let ids: BTreeMap<String, RateSourceId> = db.read(|view| {
            view.iter::<RateSource>()
                .map(|source| (source.key.clone(), source.id))
                .collect()
        });
        Self { ids }
    }

    /// Create missing sources by key and register all of them.
    pub async fn provision(db: &Database, sources: Vec<RateSource>) -> RatesResult<Self> {
        let mut tx = db.begin(&[LockScope::Configuration]).await;
        for source in sources {
            let exists = tx.view(|view| view.rate_source_by_key(&source.key).is_some());
            if exists {
                continue;
            }
            info!(source = %source.key, priority = source.priority, "Provisioning rate source");
            tx.insert(source)?;
        }
        tx.commit()?;
        Ok(Self::load(db))
    }

    /// Id of the source registered under `key`.
    pub fn id(&self, key: &str) -> RatesResult<RateSourceId> {
        self.ids
            .get(key)
            .copied()
            .ok_or_else(|| RatesError::UnknownSource(key.to_string()))
    }

    /// Current committed row of a source.
    pub fn source(&self, db: &Database, key: &str) -> RatesResult<RateSource> {
        let id = self.id(key)?;
        db.read(|view| view.rate_source(id).cloned())
            .ok_or_else(|| RatesError::UnknownSource(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.ids.keys().map(String::as_str)
    }
}
