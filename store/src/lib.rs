//! Gera Store
//!
//! Transactional storage for the rate pipeline. Every entity lives in its
//! own table keyed by a typed identifier. Writers stage rows inside a
//! [`Transaction`] that holds exclusive per-domain locks; commit validates
//! uniqueness and references again and applies all rows at once.
//!
//! Readers use [`Database::read`] and only ever observe committed state,
//! including the actual-snapshot pointers.

pub mod currency_rate;
pub mod database;
pub mod direction_rate;
pub mod error;
pub mod external_rate;
pub mod lock;
pub mod payment_system;
pub mod rate_source;
pub mod tables;
pub mod transaction;
pub mod view;

pub use currency_rate::{
    CrossLeg, CurrencyRate, CurrencyRateMode, CurrencyRateModeSnapshot, CurrencyRateSnapshot,
    ModeSnapshotStatus, RateMode, ResolvedMode, MAX_CROSS_LEGS,
};
pub use database::Database;
pub use direction_rate::{DirectionRate, DirectionRateSnapshot};
pub use error::{StoreError, StoreResult};
pub use external_rate::{CbrDailyRate, ExternalRate, ExternalRateSnapshot};
pub use lock::LockScope;
pub use payment_system::{ExchangeRate, PaymentSystem};
pub use rate_source::{RateSource, SourceKind};
pub use tables::Record;
pub use transaction::{CommitSummary, Transaction};
pub use view::View;
