//! Per-domain exclusive write locks.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use gera_common::RateSourceId;

/// A publication domain guarded by one exclusive lock.
///
/// The derived order is the acquisition order when a transaction needs
/// several scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockScope {
    /// Payment systems, exchange rates, rate sources and mode snapshots.
    Configuration,
    /// Snapshot publication of one rate source.
    RateSource(RateSourceId),
    /// Currency rate snapshot publication.
    CurrencyRates,
    /// Direction rate snapshot publication.
    DirectionRates,
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::Configuration => write!(f, "configuration"),
            LockScope::RateSource(id) => write!(f, "rate_source:{}", id),
            LockScope::CurrencyRates => write!(f, "currency_rates"),
            LockScope::DirectionRates => write!(f, "direction_rates"),
        }
    }
}

/// Registry of domain locks, created on first use.
#[derive(Default)]
pub struct DomainLocks {
    locks: DashMap<LockScope, Arc<Mutex<()>>>,
}

impl DomainLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, scope: LockScope) -> Arc<Mutex<()>> {
        self.locks
            .entry(scope)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire every scope, waiting for current holders to finish.
    pub async fn acquire(&self, scopes: &[LockScope]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered = scopes.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for scope in ordered {
            let lock = self.lock_for(scope);
            guards.push(lock.lock_owned().await);
            debug!(scope = %scope, "Domain lock acquired");
        }
        guards
    }

    /// Check whether a scope is currently held.
    pub fn is_locked(&self, scope: LockScope) -> bool {
        self.locks
            .get(&scope)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_are_held_until_guards_drop() {
        let locks = DomainLocks::new();
        let guards = tokio_test::block_on(locks.acquire(&[
            LockScope::DirectionRates,
            LockScope::CurrencyRates,
            LockScope::DirectionRates,
        ]));

        assert_eq!(guards.len(), 2);
        assert!(locks.is_locked(LockScope::DirectionRates));
        assert!(locks.is_locked(LockScope::CurrencyRates));
        assert!(!locks.is_locked(LockScope::Configuration));

        drop(guards);
        assert!(!locks.is_locked(LockScope::DirectionRates));
    }

    #[tokio::test]
    async fn test_second_writer_waits_for_first() {
        let locks = Arc::new(DomainLocks::new());
        let first = locks.acquire(&[LockScope::DirectionRates]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guards = locks.acquire(&[LockScope::DirectionRates]).await;
            })
        };

        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
    }
}
