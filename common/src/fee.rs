//! Commission fee calculation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, Result};
use crate::monetary::Money;

/// How a commission is applied to a net amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// `amount + amount * rate`
    RegularFee,
    /// `amount / (1 - rate)`: the fee is taken out of the gross total.
    ReverseFee,
}

impl FeePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeePolicy::RegularFee => "regular_fee",
            FeePolicy::ReverseFee => "reverse_fee",
        }
    }
}

impl fmt::Display for FeePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regular_fee" => Ok(FeePolicy::RegularFee),
            "reverse_fee" => Ok(FeePolicy::ReverseFee),
            other => Err(DomainError::UnsupportedFeePolicy(other.to_string())),
        }
    }
}

/// Compute the gross total for a net amount.
///
/// `commission_rate` is a fraction (`0.1` for ten percent).
pub fn total(amount: Decimal, commission_rate: Decimal, policy: FeePolicy) -> Result<Decimal> {
    if commission_rate.is_sign_negative() {
        return Err(DomainError::CommissionOutOfRange {
            rate: commission_rate,
            policy: policy.to_string(),
        });
    }

    match policy {
        FeePolicy::RegularFee => Ok(amount + amount * commission_rate),
        FeePolicy::ReverseFee => {
            if commission_rate >= Decimal::ONE {
                return Err(DomainError::CommissionOutOfRange {
                    rate: commission_rate,
                    policy: policy.to_string(),
                });
            }
            Ok(amount / (Decimal::ONE - commission_rate))
        }
    }
}

/// Compute the gross total for a money amount, rounded to the currency's minor unit.
pub fn total_money(money: &Money, commission_rate: Decimal, policy: FeePolicy) -> Result<Money> {
    let value = total(money.value, commission_rate, policy)?;
    Ok(Money::new(value, money.currency.clone()).round())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monetary::Currency;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_regular_fee() {
        let result = total(dec!(100), dec!(0.1), FeePolicy::RegularFee).unwrap();
        assert_eq!(result, dec!(110.00));
    }

    #[test]
    fn test_reverse_fee() {
        let money = Money::new(dec!(100), Currency::usd());
        let result = total_money(&money, dec!(0.1), FeePolicy::ReverseFee).unwrap();
        assert_eq!(result.value, dec!(111.11));
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let err = "flat_fee".parse::<FeePolicy>().unwrap_err();
        assert_eq!(err, DomainError::UnsupportedFeePolicy("flat_fee".to_string()));
        assert_eq!(err.error_code(), "UNSUPPORTED_FEE_POLICY");
    }

    #[test]
    fn test_reverse_fee_rejects_full_commission() {
        let result = total(dec!(100), dec!(1), FeePolicy::ReverseFee);
        assert!(matches!(result, Err(DomainError::CommissionOutOfRange { .. })));
    }

    #[test]
    fn test_negative_commission_is_rejected() {
        let result = total(dec!(100), dec!(-0.01), FeePolicy::RegularFee);
        assert!(matches!(result, Err(DomainError::CommissionOutOfRange { .. })));
    }

    #[test]
    fn test_policy_roundtrips_through_its_name() {
        for policy in [FeePolicy::RegularFee, FeePolicy::ReverseFee] {
            assert_eq!(policy.as_str().parse::<FeePolicy>().unwrap(), policy);
        }
    }

    proptest! {
        #[test]
        fn prop_reverse_fee_never_below_regular(cents in 1u32..10_000_000, bps in 0u32..9_000) {
            let amount = Decimal::from(cents) / dec!(100);
            let rate = Decimal::from(bps) / dec!(10000);
            let regular = total(amount, rate, FeePolicy::RegularFee).unwrap();
            let reverse = total(amount, rate, FeePolicy::ReverseFee).unwrap();
            prop_assert!(reverse >= regular);
            prop_assert!(regular >= amount);
        }
    }
}
