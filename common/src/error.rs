//! Error types for shared value construction.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while building shared values from static configuration.
///
/// Every variant points at invalid configuration rather than transient data,
/// so callers abort the operation instead of skipping a row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The currency code cannot be resolved.
    #[error("Unknown currency code: {0:?}")]
    UnknownCurrency(String),

    /// The currency pair notation cannot be parsed.
    #[error("Invalid currency pair: {0:?}")]
    InvalidPair(String),

    /// No total computation exists for the commission policy.
    #[error("Unsupported commission computation policy: {0:?}")]
    UnsupportedFeePolicy(String),

    /// The commission rate cannot be applied with the policy.
    #[error("Commission rate {rate} is out of range for {policy}")]
    CommissionOutOfRange { rate: Decimal, policy: String },
}

impl DomainError {
    /// Get error code for logs and fault reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            DomainError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            DomainError::InvalidPair(_) => "INVALID_PAIR",
            DomainError::UnsupportedFeePolicy(_) => "UNSUPPORTED_FEE_POLICY",
            DomainError::CommissionOutOfRange { .. } => "COMMISSION_OUT_OF_RANGE",
        }
    }
}

/// Result type alias for shared value operations.
pub type Result<T> = std::result::Result<T, DomainError>;
