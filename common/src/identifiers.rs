//! Identifier types for Gera entities.
//!
//! Every table row is keyed by a surrogate UUID v7. Each entity gets its own
//! newtype to keep foreign-key fields from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of an external rate source (bank, exchange).
    RateSourceId
);
define_id!(
    /// Identifier of one fetch run's batch of external rates.
    ExternalRateSnapshotId
);
define_id!(ExternalRateId);
define_id!(
    /// Identifier of a raw primary-bank daily sample.
    CbrDailyRateId
);
define_id!(
    /// Identifier of a currency rate mode configuration generation.
    CurrencyRateModeSnapshotId
);
define_id!(CurrencyRateModeId);
define_id!(CurrencyRateSnapshotId);
define_id!(CurrencyRateId);
define_id!(PaymentSystemId);
define_id!(
    /// Identifier of an (income, outcome) payment-system mapping.
    ExchangeRateId
);
define_id!(DirectionRateSnapshotId);
define_id!(DirectionRateId);
