//! Payment system provisioning.
//!
//! Adding a payment system also adds the exchange rates to and from every
//! other live payment system, so the direction worker prices the new
//! directions on its next run.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use gera_common::{now, PaymentSystemId};
use gera_store::{Database, ExchangeRate, LockScope, PaymentSystem, Transaction};

use crate::error::{WorkerError, WorkerResult};

/// Commission in percent for auto-provisioned exchange rates.
pub const DEFAULT_EXCHANGE_COMMISSION: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub payment_system_id: PaymentSystemId,
    pub priority: i32,
    pub exchange_rates_created: usize,
}

pub struct PaymentSystemProvisioner {
    db: Arc<Database>,
}

impl PaymentSystemProvisioner {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn find_or_create_exchange_rate(
        tx: &mut Transaction<'_>,
        income: &PaymentSystem,
        outcome: &PaymentSystem,
    ) -> WorkerResult<bool> {
        let exists = tx.view(|view| view.exchange_rate_for(income.id, outcome.id).is_some());
        if exists {
            return Ok(false);
        }
        tx.insert(ExchangeRate::new(income, outcome, DEFAULT_EXCHANGE_COMMISSION))?;
        Ok(true)
    }

    /// Store a new payment system with the next priority and wire it to
    /// every live payment system in both directions.
    #[instrument(skip(self, payment_system), fields(name = %payment_system.name))]
    pub async fn create_payment_system(&self, mut payment_system: PaymentSystem) -> WorkerResult<ProvisionReport> {
        // Unknown policies are configuration errors, not row errors.
        payment_system.fee_policy()?;

        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let (priority, others) = tx.view(|view| {
            let priority = view
                .iter::<PaymentSystem>()
                .map(|ps| ps.priority)
                .max()
                .unwrap_or(0)
                + 1;
            let others: Vec<PaymentSystem> = view
                .rows::<PaymentSystem>()
                .filter(|ps| ps.is_alive())
                .cloned()
                .collect();
            (priority, others)
        });

        payment_system.priority = priority;
        let id = tx.insert(payment_system.clone())?;

        let mut created = 0;
        for other in &others {
            if Self::find_or_create_exchange_rate(&mut tx, &payment_system, other)? {
                created += 1;
            }
            if Self::find_or_create_exchange_rate(&mut tx, other, &payment_system)? {
                created += 1;
            }
        }
        tx.commit()?;

        info!(payment_system_id = %id, priority, exchange_rates = created, "Payment system created");
        Ok(ProvisionReport {
            payment_system_id: id,
            priority,
            exchange_rates_created: created,
        })
    }

    /// Take a payment system out of every future direction rate run.
    pub async fn archive_payment_system(&self, id: PaymentSystemId) -> WorkerResult<()> {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let mut payment_system = tx
            .view(|view| view.payment_system(id).cloned())
            .ok_or(WorkerError::PaymentSystemNotFound(id))?;
        if payment_system.archived_at.is_none() {
            payment_system.archived_at = Some(now());
            tx.update(payment_system)?;
        }
        tx.commit()?;
        info!(payment_system_id = %id, "Payment system archived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_common::{Currency, DomainError};
    use gera_store::StoreError;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_exchange_rates_both_ways() {
        let db = Arc::new(Database::new());
        let provisioner = PaymentSystemProvisioner::new(db.clone());

        let first = provisioner
            .create_payment_system(PaymentSystem::new("Sber", Currency::rub()))
            .await
            .unwrap();
        assert_eq!(first.exchange_rates_created, 0);
        assert_eq!(first.priority, 1);

        let second = provisioner
            .create_payment_system(PaymentSystem::new("PayPal", Currency::usd()))
            .await
            .unwrap();
        assert_eq!(second.exchange_rates_created, 2);
        assert_eq!(second.priority, 2);

        db.read(|view| {
            let rub_to_usd = view
                .exchange_rate_for(first.payment_system_id, second.payment_system_id)
                .unwrap();
            assert_eq!(rub_to_usd.commission, dec!(10));
            assert_eq!(rub_to_usd.currency_pair.to_string(), "RUB/USD");
            assert!(view
                .exchange_rate_for(second.payment_system_id, first.payment_system_id)
                .is_some());
        });
    }

    #[tokio::test]
    async fn test_archived_systems_are_not_wired() {
        let db = Arc::new(Database::new());
        let provisioner = PaymentSystemProvisioner::new(db.clone());
        let sber = provisioner
            .create_payment_system(PaymentSystem::new("Sber", Currency::rub()))
            .await
            .unwrap();
        provisioner.archive_payment_system(sber.payment_system_id).await.unwrap();

        let paypal = provisioner
            .create_payment_system(PaymentSystem::new("PayPal", Currency::usd()))
            .await
            .unwrap();
        assert_eq!(paypal.exchange_rates_created, 0);
        assert!(!db.read(|v| v.payment_system(sber.payment_system_id).unwrap().is_alive()));
    }

    #[tokio::test]
    async fn test_invalid_payment_systems_are_rejected() {
        let db = Arc::new(Database::new());
        let provisioner = PaymentSystemProvisioner::new(db.clone());

        let mut flat = PaymentSystem::new("Flat", Currency::rub());
        flat.total_computation_method = "flat_fee".into();
        assert!(matches!(
            provisioner.create_payment_system(flat).await,
            Err(WorkerError::Domain(DomainError::UnsupportedFeePolicy(_)))
        ));

        let mut limits = PaymentSystem::new("Limits", Currency::rub());
        limits.minimal_income_amount = dec!(1000);
        limits.maximal_income_amount = dec!(100);
        assert!(matches!(
            provisioner.create_payment_system(limits).await,
            Err(WorkerError::Store(StoreError::Validation { .. }))
        ));

        provisioner
            .create_payment_system(PaymentSystem::new("Sber", Currency::rub()))
            .await
            .unwrap();
        assert!(matches!(
            provisioner
                .create_payment_system(PaymentSystem::new("Sber", Currency::usd()))
                .await,
            Err(WorkerError::Store(StoreError::UniqueViolation { .. }))
        ));
        assert_eq!(db.row_count(), 1);
    }

    #[tokio::test]
    async fn test_archive_unknown_payment_system() {
        let provisioner = PaymentSystemProvisioner::new(Arc::new(Database::new()));
        assert!(matches!(
            provisioner.archive_payment_system(PaymentSystemId::new()).await,
            Err(WorkerError::PaymentSystemNotFound(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_new_system_gets_two_rates_per_live_system(existing in 0usize..6) {
            let db = Arc::new(Database::new());
            let provisioner = PaymentSystemProvisioner::new(db.clone());
            let report = tokio_test::block_on(async {
                for i in 0..existing {
                    provisioner
                        .create_payment_system(PaymentSystem::new(format!("PS{i}"), Currency::rub()))
                        .await
                        .unwrap();
                }
                provisioner
                    .create_payment_system(PaymentSystem::new("New", Currency::usd()))
                    .await
                    .unwrap()
            });

            prop_assert_eq!(report.exchange_rates_created, 2 * existing);
            let all_default = db.read(|v| {
                v.iter::<ExchangeRate>().all(|rate| rate.commission == DEFAULT_EXCHANGE_COMMISSION)
            });
            prop_assert!(all_default);
        }
    }
}
