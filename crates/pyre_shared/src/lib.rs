//! # PYRE Shared
//!
//! Common types used by the ritual ledger and by the adapters that call it.
//!
//! ## CRITICAL RULE
//!
//! This crate holds vocabulary only. Anything that mutates balances,
//! supply, cooldowns or configuration belongs in `pyre_ledger`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod types;

pub use constants::{DEFAULT_MIN_INTERVAL, DEFAULT_TIER_AMOUNT, GENESIS_NONCE};
pub use events::{ConfigValue, EventType, LedgerEvent};
pub use types::{ActorId, KindId, KindRole, PauseFlag, Rarity, RitualKind, Role, Tick};
