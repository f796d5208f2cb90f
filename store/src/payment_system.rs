//! Payment systems and the exchange rates between them.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gera_common::{
    fee, now, Currency, CurrencyPair, DomainError, ExchangeRateId, FeePolicy, Money, PaymentSystemId,
    Timestamp,
};

use crate::error::StoreResult;
use crate::tables::{duplicate, invalid, Record, Tables};
use crate::view::View;

/// A payment channel customers pay in or get paid out through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSystem {
    pub id: PaymentSystemId,
    pub name: String,
    pub priority: i32,
    pub currency: Currency,
    /// Commission in percent.
    pub commission: Decimal,
    /// Commission computation policy as supplied by configuration.
    pub total_computation_method: String,
    pub income_enabled: bool,
    pub outcome_enabled: bool,
    pub is_available: bool,
    /// Limits in minor units.
    pub minimal_income_amount: Decimal,
    pub maximal_income_amount: Decimal,
    pub minimal_outcome_amount: Decimal,
    pub maximal_outcome_amount: Decimal,
    pub archived_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl PaymentSystem {
    /// Create an enabled payment system with no commission and unbounded limits.
    pub fn new(name: impl Into<String>, currency: Currency) -> Self {
        Self {
            id: PaymentSystemId::new(),
            name: name.into(),
            priority: 0,
            currency,
            commission: Decimal::ZERO,
            total_computation_method: FeePolicy::RegularFee.as_str().to_string(),
            income_enabled: true,
            outcome_enabled: true,
            is_available: true,
            minimal_income_amount: Decimal::ZERO,
            maximal_income_amount: Decimal::MAX,
            minimal_outcome_amount: Decimal::ZERO,
            maximal_outcome_amount: Decimal::MAX,
            archived_at: None,
            created_at: now(),
        }
    }

    /// Not archived.
    pub fn is_alive(&self) -> bool {
        self.archived_at.is_none()
    }

    pub fn fee_policy(&self) -> Result<FeePolicy, DomainError> {
        self.total_computation_method.parse()
    }

    /// Gross amount a customer pays for `money` through this system.
    pub fn total_with_fee(&self, money: &Money) -> Result<Money, DomainError> {
        let policy = self.fee_policy()?;
        fee::total_money(money, self.commission / Decimal::ONE_HUNDRED, policy)
    }

    pub fn minimal_income(&self) -> Money {
        Money::from_minor(self.minimal_income_amount, self.currency.clone())
    }

    pub fn minimal_outcome(&self) -> Money {
        Money::from_minor(self.minimal_outcome_amount, self.currency.clone())
    }
}

impl Record for PaymentSystem {
    type Id = PaymentSystemId;
    const TABLE: &'static str = "payment_systems";
    const MUTABLE: bool = true;

    fn id(&self) -> PaymentSystemId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<PaymentSystemId, Self> {
        &tables.payment_systems
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<PaymentSystemId, Self> {
        &mut tables.payment_systems
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid(Self::TABLE, "name must not be blank"));
        }
        if self.commission.is_sign_negative() {
            return Err(invalid(Self::TABLE, "commission must not be negative"));
        }
        if self.minimal_income_amount >= self.maximal_income_amount {
            return Err(invalid(Self::TABLE, "minimal income amount must be below maximal"));
        }
        if self.minimal_outcome_amount >= self.maximal_outcome_amount {
            return Err(invalid(Self::TABLE, "minimal outcome amount must be below maximal"));
        }
        if view
            .iter::<PaymentSystem>()
            .any(|other| other.id != self.id && other.name == self.name)
        {
            return Err(duplicate(Self::TABLE, "name", &self.name));
        }
        Ok(())
    }
}

/// Directed mapping from an income payment system to an outcome one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: ExchangeRateId,
    pub income_payment_system_id: PaymentSystemId,
    pub outcome_payment_system_id: PaymentSystemId,
    pub currency_pair: CurrencyPair,
    /// Commission in percent.
    pub commission: Decimal,
    pub is_enabled: bool,
    pub created_at: Timestamp,
}

impl ExchangeRate {
    pub fn new(income: &PaymentSystem, outcome: &PaymentSystem, commission: Decimal) -> Self {
        Self {
            id: ExchangeRateId::new(),
            income_payment_system_id: income.id,
            outcome_payment_system_id: outcome.id,
            currency_pair: CurrencyPair::new(income.currency.clone(), outcome.currency.clone()),
            commission,
            is_enabled: true,
            created_at: now(),
        }
    }
}

impl Record for ExchangeRate {
    type Id = ExchangeRateId;
    const TABLE: &'static str = "exchange_rates";
    const MUTABLE: bool = true;

    fn id(&self) -> ExchangeRateId {
        self.id
    }

    fn rows(tables: &Tables) -> &BTreeMap<ExchangeRateId, Self> {
        &tables.exchange_rates
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<ExchangeRateId, Self> {
        &mut tables.exchange_rates
    }

    fn check(&self, view: &View<'_>) -> StoreResult<()> {
        if self.income_payment_system_id == self.outcome_payment_system_id {
            return Err(invalid(Self::TABLE, "income and outcome must differ"));
        }
        if self.commission.is_sign_negative() {
            return Err(invalid(Self::TABLE, "commission must not be negative"));
        }
        // Payment system references are checked by the direction worker so
        // a dangling one surfaces as an unknown exchange rate.
        if view.iter::<ExchangeRate>().any(|other| {
            other.id != self.id
                && other.income_payment_system_id == self.income_payment_system_id
                && other.outcome_payment_system_id == self.outcome_payment_system_id
        }) {
            return Err(duplicate(
                Self::TABLE,
                "income_outcome",
                format!("{} {}", self.income_payment_system_id, self.outcome_payment_system_id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_with_fee_uses_percent_commission() {
        let mut ps = PaymentSystem::new("Qiwi", Currency::rub());
        ps.commission = dec!(10);
        let total = ps.total_with_fee(&Money::new(dec!(100), Currency::rub())).unwrap();
        assert_eq!(total.value, dec!(110.00));

        ps.total_computation_method = "reverse_fee".to_string();
        let total = ps.total_with_fee(&Money::new(dec!(100), Currency::rub())).unwrap();
        assert_eq!(total.value, dec!(111.11));
    }

    #[test]
    fn test_unknown_policy_fails() {
        let mut ps = PaymentSystem::new("Qiwi", Currency::rub());
        ps.total_computation_method = "percent_of_moon".to_string();
        let result = ps.total_with_fee(&Money::new(dec!(100), Currency::rub()));
        assert!(matches!(result, Err(DomainError::UnsupportedFeePolicy(_))));
    }

    #[test]
    fn test_limits_are_minor_units() {
        let mut ps = PaymentSystem::new("Card", Currency::usd());
        ps.minimal_income_amount = dec!(1050);
        assert_eq!(ps.minimal_income().value, dec!(10.50));
    }
}
