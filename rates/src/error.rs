//! Rate pipeline error types.

use chrono::NaiveDate;
use thiserror::Error;

use gera_common::{CurrencyPair, DomainError};
use gera_store::StoreError;

/// Errors raised while fetching, publishing or resolving rates.
#[derive(Debug, Error)]
pub enum RatesError {
    /// No rate can be produced for the pair.
    #[error("Unknown currency pair {0}")]
    UnknownPair(CurrencyPair),

    /// The upstream answered for another day.
    #[error("Request and response dates are different: {requested} <> {returned}")]
    WrongDate {
        requested: NaiveDate,
        returned: NaiveDate,
    },

    /// The upstream kept redirecting.
    #[error("HTTP redirection loop: {0}")]
    RedirectLoop(String),

    /// Network or HTTP status failure.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// The upstream payload could not be decoded.
    #[error("Failed to parse upstream payload: {0}")]
    Parse(String),

    /// A currency code has no mapping.
    #[error("Unknown currency code {0:?}")]
    UnknownCurrency(String),

    /// The rate source key is not provisioned.
    #[error("Unknown rate source {0:?}")]
    UnknownSource(String),

    /// The rate source is switched off.
    #[error("Rate source {0:?} is disabled")]
    SourceDisabled(String),

    /// The mode snapshot does not exist.
    #[error("Unknown currency rate mode snapshot {0}")]
    UnknownModeSnapshot(String),

    /// Modes can only change while a generation is a draft.
    #[error("Currency rate mode snapshot {0} is not a draft")]
    NotDraft(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RatesError {
    /// The error concerns one item and the surrounding run can continue.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RatesError::UnknownPair(_)
            | RatesError::WrongDate { .. }
            | RatesError::RedirectLoop(_)
            | RatesError::Upstream(_)
            | RatesError::SourceDisabled(_) => true,
            RatesError::Store(err) => err.is_row_invalid(),
            _ => false,
        }
    }

    /// Get error code for logs and fault reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            RatesError::UnknownPair(_) => "UNKNOWN_PAIR",
            RatesError::WrongDate { .. } => "WRONG_DATE",
            RatesError::RedirectLoop(_) => "REDIRECT_LOOP",
            RatesError::Upstream(_) => "UPSTREAM_FAILED",
            RatesError::Parse(_) => "PARSE_FAILED",
            RatesError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            RatesError::UnknownSource(_) => "UNKNOWN_SOURCE",
            RatesError::SourceDisabled(_) => "SOURCE_DISABLED",
            RatesError::UnknownModeSnapshot(_) => "UNKNOWN_MODE_SNAPSHOT",
            RatesError::NotDraft(_) => "NOT_DRAFT",
            RatesError::Store(err) => err.error_code(),
            RatesError::Domain(err) => err.error_code(),
        }
    }
}

/// Result type for rate operations.
pub type RatesResult<T> = Result<T, RatesError>;
