//! Gera Common Types
//!
//! Shared value types used across the Gera rate pipeline: entity
//! identifiers, currencies and currency pairs, money, the commission fee
//! calculator and business-day helpers.

pub mod identifiers;
pub mod monetary;
pub mod fee;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use fee::FeePolicy;
pub use error::*;
pub use time::*;
