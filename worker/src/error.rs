//! Worker error types.

use thiserror::Error;

use gera_common::{DirectionRateId, DomainError, ExchangeRateId, PaymentSystemId};
use gera_rates::RatesError;
use gera_store::StoreError;

/// Errors raised by the direction rate worker and its read surface.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// No direction rate snapshot has been published yet.
    #[error("No actual direction rate snapshot")]
    NoActualSnapshot,

    /// The exchange rate or one of its payment systems is missing.
    #[error("Unknown exchange rate {0}")]
    UnknownExchangeRate(ExchangeRateId),

    #[error("Direction rate {0} not found")]
    DirectionRateNotFound(DirectionRateId),

    /// No direction rate was ever written for the exchange rate.
    #[error("No direction rate for exchange rate {0}")]
    NoDirectionRate(ExchangeRateId),

    #[error("Payment system {0} not found")]
    PaymentSystemNotFound(PaymentSystemId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The seed file cannot be read or applied.
    #[error("Seed error: {0}")]
    Seed(String),

    #[error(transparent)]
    Rates(#[from] RatesError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl WorkerError {
    /// The error affects a single row and the run continues without it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorkerError::UnknownExchangeRate(_) => true,
            WorkerError::Rates(err) => err.is_recoverable(),
            WorkerError::Store(err) => err.is_row_invalid(),
            _ => false,
        }
    }

    /// The error is reported to the fault tracker when a row is skipped.
    pub fn is_fault(&self) -> bool {
        match self {
            WorkerError::UnknownExchangeRate(_) => true,
            WorkerError::Store(err) => err.is_row_invalid(),
            WorkerError::Rates(RatesError::Store(err)) => err.is_row_invalid(),
            _ => false,
        }
    }

    /// Get error code for logs and fault reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkerError::NoActualSnapshot => "NO_ACTUAL_SNAPSHOT",
            WorkerError::UnknownExchangeRate(_) => "UNKNOWN_EXCHANGE_RATE",
            WorkerError::DirectionRateNotFound(_) => "DIRECTION_RATE_NOT_FOUND",
            WorkerError::NoDirectionRate(_) => "NO_DIRECTION_RATE",
            WorkerError::PaymentSystemNotFound(_) => "PAYMENT_SYSTEM_NOT_FOUND",
            WorkerError::Config(_) => "CONFIG_ERROR",
            WorkerError::Seed(_) => "SEED_ERROR",
            WorkerError::Rates(err) => err.error_code(),
            WorkerError::Store(err) => err.error_code(),
            WorkerError::Domain(err) => err.error_code(),
        }
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gera_common::{Currency, CurrencyPair};

    #[test]
    fn test_classification() {
        let unknown_pair = WorkerError::from(RatesError::UnknownPair(CurrencyPair::new(
            Currency::usd(),
            Currency::rub(),
        )));
        assert!(unknown_pair.is_recoverable());
        assert!(!unknown_pair.is_fault());

        let dangling = WorkerError::UnknownExchangeRate(ExchangeRateId::new());
        assert!(dangling.is_recoverable());
        assert!(dangling.is_fault());

        let invalid = WorkerError::from(StoreError::Validation {
            table: "direction_rates",
            message: "rate_percent out of range".into(),
        });
        assert!(invalid.is_fault());

        let policy = WorkerError::from(DomainError::UnsupportedFeePolicy("flat".into()));
        assert!(!policy.is_recoverable());
        assert_eq!(policy.error_code(), "UNSUPPORTED_FEE_POLICY");
    }
}
