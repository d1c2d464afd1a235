//! # PYRE Ritual Ledger
//!
//! Authoritative token ledger for sacrifice and conversion rituals.
//!
//! ## Design Principles
//!
//! 1. **Integers only** - balances and supply are `u64`, overflow is an error
//! 2. **All-or-nothing rituals** - a failed mint restores the burn exactly
//! 3. **Fail closed** - every privileged call checks its role first
//! 4. **External configuration** - genesis policy lives in TOML files
//!
//! ## Thread Safety
//!
//! [`RitualEngine`] is `Send + Sync`. Rituals are serialized on the ledger
//! lock; views and preflight take read locks only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pyre_ledger::{GenesisConfig, RitualEngine, SecureSeed};
//!
//! let genesis = GenesisConfig::from_file("config/genesis.toml")?;
//! let engine = RitualEngine::with_journal(&genesis, SecureSeed::generate(&mut rng), "pyre.journal")?;
//!
//! engine.mint(shop, player, KEY, 1)?;
//! let outcome = engine.sacrifice(player, 1)?;
//! for event in engine.drain_events() {
//!     forward(event);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod limiter;
pub mod selector;

pub use access::{AccessRegistry, RoleChange};
pub use config::{
    ConfigChange, ConfigManager, ConfigSnapshot, GenesisConfig, KindMapping, RoleGrant, SupplyCap,
    TierAmount,
};
pub use engine::{LedgerRegion, PolicyRegion, RitualEngine, RitualOutcome};
pub use error::{LedgerError, LedgerResult};
pub use journal::{JournalOp, JournalTxn, RitualJournal};
pub use ledger::{BalanceEntry, LedgerAction, SupplyRecord, TokenLedger};
pub use limiter::{CooldownStatus, CooldownTable, PauseState};
pub use selector::{
    EntropySalt, RewardEntry, RewardPool, RewardSelector, SecureSeed, Selection,
    SelectionStatistics,
};
