//! Externally supplied configuration.
//!
//! A seed file carries the rate sources, payment systems and the mode
//! generation to activate. Applying a seed is idempotent: rows that already
//! exist by key, name or title are left alone.

use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use gera_common::{Currency, CurrencyPair};
use gera_rates::{default_sources, CurrencyRateModes, RateSourceRegistry};
use gera_store::{CrossLeg, Database, PaymentSystem, RateMode, RateSource, SourceKind};

use crate::error::{WorkerError, WorkerResult};
use crate::provisioning::PaymentSystemProvisioner;

fn enabled() -> bool {
    true
}

fn regular_fee() -> String {
    "regular_fee".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedSource {
    pub key: String,
    pub title: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "enabled")]
    pub is_enabled: bool,
}

impl SeedSource {
    fn into_rate_source(self) -> RateSource {
        let mut source = RateSource::new(self.key, self.title, self.kind).with_priority(self.priority);
        source.is_enabled = self.is_enabled;
        source
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPaymentSystem {
    pub name: String,
    pub currency: Currency,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default = "regular_fee")]
    pub total_computation_method: String,
    #[serde(default = "enabled")]
    pub income_enabled: bool,
    #[serde(default = "enabled")]
    pub outcome_enabled: bool,
    #[serde(default)]
    pub minimal_income_amount: Option<Decimal>,
    #[serde(default)]
    pub maximal_income_amount: Option<Decimal>,
    #[serde(default)]
    pub minimal_outcome_amount: Option<Decimal>,
    #[serde(default)]
    pub maximal_outcome_amount: Option<Decimal>,
}

impl SeedPaymentSystem {
    fn into_payment_system(self) -> PaymentSystem {
        let mut ps = PaymentSystem::new(self.name, self.currency);
        ps.commission = self.commission;
        ps.total_computation_method = self.total_computation_method;
        ps.income_enabled = self.income_enabled;
        ps.outcome_enabled = self.outcome_enabled;
        if let Some(amount) = self.minimal_income_amount {
            ps.minimal_income_amount = amount;
        }
        if let Some(amount) = self.maximal_income_amount {
            ps.maximal_income_amount = amount;
        }
        if let Some(amount) = self.minimal_outcome_amount {
            ps.minimal_outcome_amount = amount;
        }
        if let Some(amount) = self.maximal_outcome_amount {
            ps.maximal_outcome_amount = amount;
        }
        ps
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedLeg {
    /// `FROM/TO` notation.
    pub pair: String,
    pub source: String,
}

/// A direct mode when `legs` is empty, a cross mode otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedMode {
    pub pair: String,
    /// Source key; none picks the best enabled source.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub legs: Vec<SeedLeg>,
}

impl SeedMode {
    fn resolve(&self, registry: &RateSourceRegistry) -> WorkerResult<(CurrencyPair, RateMode)> {
        let pair: CurrencyPair = self.pair.parse()?;
        if self.legs.is_empty() {
            let rate_source_id = self.source.as_deref().map(|key| registry.id(key)).transpose()?;
            return Ok((pair, RateMode::Direct { rate_source_id }));
        }
        let legs = self
            .legs
            .iter()
            .map(|leg| -> WorkerResult<CrossLeg> {
                Ok(CrossLeg {
                    currency_pair: leg.pair.parse()?,
                    rate_source_id: registry.id(&leg.source)?,
                })
            })
            .collect::<WorkerResult<Vec<_>>>()?;
        Ok((pair, RateMode::Cross { legs }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedModeSnapshot {
    pub title: String,
    #[serde(default)]
    pub details: Option<String>,
    pub modes: Vec<SeedMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    /// Defaults to the built-in sources when empty.
    #[serde(default)]
    pub rate_sources: Vec<SeedSource>,
    #[serde(default)]
    pub payment_systems: Vec<SeedPaymentSystem>,
    #[serde(default)]
    pub mode_snapshot: Option<SeedModeSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub rate_sources: usize,
    pub payment_systems_created: usize,
    pub exchange_rates_created: usize,
    pub modes_created: usize,
}

impl Seed {
    pub fn parse(json: &str) -> WorkerResult<Self> {
        serde_json::from_str(json).map_err(|e| WorkerError::Seed(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| WorkerError::Seed(format!("{}: {e}", path.display())))?;
        Self::parse(&json)
    }

    pub async fn apply(self, db: &Arc<Database>) -> WorkerResult<SeedReport> {
        let mut report = SeedReport::default();

        let sources = if self.rate_sources.is_empty() {
            default_sources()
        } else {
            self.rate_sources.into_iter().map(SeedSource::into_rate_source).collect()
        };
        let registry = RateSourceRegistry::provision(db, sources).await?;
        report.rate_sources = registry.keys().count();

        let provisioner = PaymentSystemProvisioner::new(db.clone());
        for seed in self.payment_systems {
            if db.read(|view| view.payment_system_by_name(&seed.name).is_some()) {
                continue;
            }
            let created = provisioner.create_payment_system(seed.into_payment_system()).await?;
            report.payment_systems_created += 1;
            report.exchange_rates_created += created.exchange_rates_created;
        }

        if let Some(snapshot) = self.mode_snapshot {
            if db.read(|view| view.mode_snapshot_by_title(&snapshot.title).is_none()) {
                let modes = CurrencyRateModes::new(db.clone());
                let draft = modes.create_draft(snapshot.title.clone(), snapshot.details.clone()).await?;
                for mode in &snapshot.modes {
                    let (pair, mode) = mode.resolve(&registry)?;
                    modes.add_mode(draft, pair, mode).await?;
                    report.modes_created += 1;
                }
                modes.activate(draft).await?;
                info!(title = %snapshot.title, modes = report.modes_created, "Mode snapshot activated");
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gera_rates::{BITFINEX, CBR};
    use gera_store::ModeSnapshotStatus;

    const SEED: &str = r#"{
        "payment_systems": [
            {"name": "Sber", "currency": "RUB", "commission": "1.5"},
            {"name": "PayPal", "currency": "USD", "total_computation_method": "reverse_fee"},
            {"name": "Bitcoin", "currency": "BTC", "minimal_income_amount": 1000, "maximal_income_amount": 100000000}
        ],
        "mode_snapshot": {
            "title": "v1",
            "modes": [
                {"pair": "USD/RUB", "source": "cbr"},
                {"pair": "RUB/USD"},
                {"pair": "BTC/RUB", "legs": [
                    {"pair": "BTC/USD", "source": "bitfinex"},
                    {"pair": "USD/RUB", "source": "cbr"}
                ]}
            ]
        }
    }"#;

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let db = Arc::new(Database::new());
        let report = Seed::parse(SEED).unwrap().apply(&db).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                rate_sources: 3,
                payment_systems_created: 3,
                exchange_rates_created: 6,
                modes_created: 3,
            }
        );

        let rows = db.row_count();
        let again = Seed::parse(SEED).unwrap().apply(&db).await.unwrap();
        assert_eq!(again.payment_systems_created, 0);
        assert_eq!(again.modes_created, 0);
        assert_eq!(db.row_count(), rows);

        let registry = RateSourceRegistry::load(&db);
        db.read(|view| {
            let active = view.active_mode_snapshot().unwrap();
            assert_eq!(active.status, ModeSnapshotStatus::Active);
            let btc = view.mode_for(active.id, &"BTC/RUB".parse().unwrap()).unwrap();
            match &btc.mode {
                RateMode::Cross { legs } => {
                    assert_eq!(legs[0].rate_source_id, registry.id(BITFINEX).unwrap());
                    assert_eq!(legs[1].rate_source_id, registry.id(CBR).unwrap());
                }
                other => panic!("unexpected mode {other:?}"),
            }
            assert_eq!(view.payment_system_by_name("PayPal").unwrap().priority, 2);
        });
    }

    #[tokio::test]
    async fn test_unknown_source_is_rejected() {
        let db = Arc::new(Database::new());
        let seed = Seed::parse(r#"{"mode_snapshot": {"title": "v1", "modes": [{"pair": "USD/RUB", "source": "ecb"}]}}"#)
            .unwrap();
        assert!(matches!(
            seed.apply(&db).await,
            Err(WorkerError::Rates(gera_rates::RatesError::UnknownSource(_)))
        ));
    }

    #[test]
    fn test_malformed_seed() {
        assert!(matches!(Seed::parse("{\"payment_systems\": 1}"), Err(WorkerError::Seed(_))));
    }
}
