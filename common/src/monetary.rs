//! Monetary types for Gera.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, Result};

/// Currency code (ISO 4217 or a crypto ticker code).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Longest code the schema accepts.
    pub const MAX_CODE_LEN: usize = 6;

    /// Parse and normalize a currency code.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        let valid = (2..=Self::MAX_CODE_LEN).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(DomainError::UnknownCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the number of decimal places of the minor unit.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            "BTC" | "BCH" | "LTC" | "DASH" | "XMR" | "ZEC" | "ETH" => 8,
            _ => 2,
        }
    }

    fn known(code: &str) -> Self {
        Self(code.to_string())
    }

    pub fn rub() -> Self {
        Self::known("RUB")
    }

    pub fn usd() -> Self {
        Self::known("USD")
    }

    pub fn eur() -> Self {
        Self::known("EUR")
    }

    pub fn kzt() -> Self {
        Self::known("KZT")
    }

    pub fn uah() -> Self {
        Self::known("UAH")
    }

    pub fn btc() -> Self {
        Self::known("BTC")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// An ordered (from, to) currency pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being converted.
    pub from: Currency,
    /// Currency received.
    pub to: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Both sides are the same currency.
    pub fn is_same(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

impl FromStr for CurrencyPair {
    type Err = DomainError;

    /// Parse `USD/RUB` notation.
    fn from_str(s: &str) -> Result<Self> {
        let (from, to) = s
            .split_once('/')
            .ok_or_else(|| DomainError::InvalidPair(s.to_string()))?;
        Ok(Self::new(Currency::parse(from)?, Currency::parse(to)?))
    }
}

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value in major units.
    pub value: Decimal,
    /// Currency of the amount.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from an amount expressed in minor units (cents).
    pub fn from_minor(minor: Decimal, currency: Currency) -> Self {
        let scale = Decimal::from(10u64.pow(currency.decimal_places()));
        Self {
            value: minor / scale,
            currency,
        }
    }

    /// Get the amount in minor units, rounded to a whole unit.
    pub fn to_minor(&self) -> Decimal {
        let scale = Decimal::from(10u64.pow(self.currency.decimal_places()));
        (self.value * scale).round()
    }

    /// Round to the currency's standard decimal places.
    pub fn round(&self) -> Self {
        let places = self.currency.decimal_places();
        Self {
            value: self.value.round_dp(places),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_parse_normalizes() {
        assert_eq!(Currency::parse("usd").unwrap(), Currency::usd());
        assert_eq!(Currency::parse(" dash ").unwrap().code(), "DASH");
    }

    #[test]
    fn test_currency_parse_rejects_garbage() {
        assert!(matches!(
            Currency::parse("U$D"),
            Err(DomainError::UnknownCurrency(_))
        ));
        assert!(Currency::parse("").is_err());
        assert!(Currency::parse("TOOLONGX").is_err());
    }

    #[test]
    fn test_pair_parse_and_display() {
        let pair: CurrencyPair = "usd/rub".parse().unwrap();
        assert_eq!(pair, CurrencyPair::new(Currency::usd(), Currency::rub()));
        assert_eq!(pair.to_string(), "USD/RUB");
        assert!("USDRUB".parse::<CurrencyPair>().is_err());
    }

    #[test]
    fn test_pair_deserialize_validates_codes() {
        let pair: CurrencyPair = serde_json::from_str(r#"{"from":"eur","to":"RUB"}"#).unwrap();
        assert_eq!(pair.from, Currency::eur());
        assert!(serde_json::from_str::<CurrencyPair>(r#"{"from":"€","to":"RUB"}"#).is_err());
    }

    #[test]
    fn test_money_minor_units() {
        let money = Money::from_minor(dec!(12345), Currency::usd());
        assert_eq!(money.value, dec!(123.45));
        assert_eq!(money.to_minor(), dec!(12345));

        let yen = Money::from_minor(dec!(500), Currency::parse("JPY").unwrap());
        assert_eq!(yen.value, dec!(500));
    }

    #[test]
    fn test_currency_decimal_places() {
        assert_eq!(Currency::usd().decimal_places(), 2);
        assert_eq!(Currency::btc().decimal_places(), 8);
        assert_eq!(Currency::parse("KWD").unwrap().decimal_places(), 3);
    }

    fn currency_strategy() -> impl Strategy<Value = Currency> {
        "[A-Z]{3,4}".prop_map(|code| Currency::parse(&code).unwrap())
    }

    proptest! {
        #[test]
        fn prop_inverse_is_an_involution(from in currency_strategy(), to in currency_strategy()) {
            let pair = CurrencyPair::new(from, to);
            prop_assert_eq!(pair.inverse().inverse(), pair.clone());
            prop_assert_eq!(pair.inverse().from, pair.to);
        }
    }
}
