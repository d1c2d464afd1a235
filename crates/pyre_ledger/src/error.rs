//! # Ledger Error Types
//!
//! All errors that can occur in the ritual ledger. Every one of them is
//! terminal for the current call and leaves state unchanged.

use pyre_shared::{ActorId, KindId, PauseFlag, Tick};
use thiserror::Error;

/// Errors that can occur in the ritual ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller lacks the role (or ownership) the action requires.
    #[error("unauthorized: {actor} may not {action}")]
    Unauthorized {
        /// The caller that was rejected.
        actor: ActorId,
        /// What it tried to do.
        action: String,
    },

    /// Burn would take a balance below zero.
    #[error("insufficient balance: {owner} holds {available} of kind {kind}, needs {required}")]
    InsufficientBalance {
        /// Owner of the balance.
        owner: ActorId,
        /// Kind being burned.
        kind: KindId,
        /// Amount requested.
        required: u64,
        /// Amount held.
        available: u64,
    },

    /// Mint would push supply past its cap.
    #[error("supply exceeded: kind {kind} at {current}/{max}, tried to mint {requested}")]
    SupplyExceeded {
        /// Kind being minted.
        kind: KindId,
        /// Supply before the mint.
        current: u64,
        /// Amount requested.
        requested: u64,
        /// The cap.
        max: u64,
    },

    /// Global or category pause is active.
    #[error("paused: {0}")]
    Paused(PauseFlag),

    /// Actor is still inside its cooldown window.
    #[error("cooldown active for {actor}: {remaining} ticks remaining")]
    CooldownActive {
        /// The rate-limited actor.
        actor: ActorId,
        /// Ticks until the next ritual is allowed.
        remaining: Tick,
    },

    /// Reward pool has no selectable outcome.
    #[error("reward pool has no entry with non-zero weight")]
    EmptyPool,

    /// Admin supplied a value that cannot produce a valid outcome.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed amount (zero, or too small to produce any output).
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        /// The rejected amount.
        amount: u64,
        /// Why it was rejected.
        reason: String,
    },

    /// Arithmetic overflow in a balance or supply calculation.
    #[error("arithmetic overflow in ledger calculation")]
    ArithmeticOverflow,

    /// Journal could not be written or read.
    #[error("journal error: {0}")]
    Journal(String),
}

impl LedgerError {
    /// Convenience constructor for [`LedgerError::Unauthorized`].
    #[must_use]
    pub fn unauthorized(actor: ActorId, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor,
            action: action.into(),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
