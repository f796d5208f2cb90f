//! Shared fixture for worker tests.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gera_common::{now, Currency, CurrencyPair, ExchangeRateId};
use gera_rates::{default_sources, CurrencyRateModes, RateSourceRegistry, CBR};
use gera_store::{Database, ExchangeRate, ExternalRate, ExternalRateSnapshot, LockScope, PaymentSystem, RateMode};

use crate::provisioning::PaymentSystemProvisioner;

pub fn usd_rub() -> CurrencyPair {
    CurrencyPair::new(Currency::usd(), Currency::rub())
}

pub fn eur_rub() -> CurrencyPair {
    CurrencyPair::new(Currency::eur(), Currency::rub())
}

/// `cbr` quotes USD/RUB at 90 and RUB/USD at 0.011. The active generation
/// routes both through `cbr` and also names EUR/RUB, which nobody quotes.
pub struct Fixture {
    pub db: Arc<Database>,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = Arc::new(Database::new());
        let registry = RateSourceRegistry::provision(&db, default_sources()).await.unwrap();
        let cbr_id = registry.id(CBR).unwrap();

        let fixture = Self { db: db.clone() };
        fixture
            .publish_cbr(&[(usd_rub(), dec!(90)), (usd_rub().inverse(), dec!(0.011))])
            .await;

        let modes = CurrencyRateModes::new(db.clone());
        let draft = modes.create_draft("fixture", None).await.unwrap();
        for pair in [usd_rub(), usd_rub().inverse(), eur_rub()] {
            modes
                .add_mode(draft, pair, RateMode::Direct { rate_source_id: Some(cbr_id) })
                .await
                .unwrap();
        }
        modes.activate(draft).await.unwrap();

        fixture
    }

    /// Replace the actual `cbr` snapshot with `quotes`.
    pub async fn publish_cbr(&self, quotes: &[(CurrencyPair, Decimal)]) {
        let cbr_id = RateSourceRegistry::load(&self.db).id(CBR).unwrap();
        let mut tx = self.db.begin(&[LockScope::RateSource(cbr_id)]).await;
        let snapshot = ExternalRateSnapshot::new(cbr_id, now());
        tx.insert(snapshot.clone()).unwrap();
        for (pair, value) in quotes {
            tx.insert(ExternalRate::new(&snapshot, pair.clone(), *value)).unwrap();
        }
        let mut cbr = tx.view(|v| v.rate_source(cbr_id).cloned()).unwrap();
        cbr.actual_snapshot_id = Some(snapshot.id);
        tx.update(cbr).unwrap();
        tx.commit().unwrap();
    }

    /// Provision a payment system with its exchange rates.
    pub async fn add_payment_system(&self, name: &str, currency: Currency) -> PaymentSystem {
        let report = PaymentSystemProvisioner::new(self.db.clone())
            .create_payment_system(PaymentSystem::new(name, currency))
            .await
            .unwrap();
        self.db
            .read(|v| v.payment_system(report.payment_system_id).cloned())
            .unwrap()
    }

    /// Store a payment system without exchange rates.
    pub async fn insert_payment_system(&self, payment_system: PaymentSystem) -> PaymentSystem {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        tx.insert(payment_system.clone()).unwrap();
        tx.commit().unwrap();
        payment_system
    }

    pub async fn insert_exchange_rate(
        &self,
        income: &PaymentSystem,
        outcome: &PaymentSystem,
        commission: Decimal,
    ) -> ExchangeRateId {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let id = tx.insert(ExchangeRate::new(income, outcome, commission)).unwrap();
        tx.commit().unwrap();
        id
    }

    pub async fn set_commission(&self, income: &PaymentSystem, outcome: &PaymentSystem, commission: Decimal) {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let mut rate = tx
            .view(|v| v.exchange_rate_for(income.id, outcome.id).cloned())
            .unwrap();
        rate.commission = commission;
        tx.update(rate).unwrap();
        tx.commit().unwrap();
    }

    pub async fn disable_income(&self, payment_system: &PaymentSystem) {
        let mut tx = self.db.begin(&[LockScope::Configuration]).await;
        let mut ps = tx.view(|v| v.payment_system(payment_system.id).cloned()).unwrap();
        ps.income_enabled = false;
        tx.update(ps).unwrap();
        tx.commit().unwrap();
    }
}
