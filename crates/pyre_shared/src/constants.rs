//! # Ledger Constants
//!
//! Defaults applied when a genesis config leaves a value out.

use crate::types::Tick;

/// Cooldown between two rituals of the same actor, in ticks.
///
/// Zero disables the rate limiter entirely.
pub const DEFAULT_MIN_INTERVAL: Tick = 0;

/// Output amount for a randomized ritual when its tier has no configured amount.
pub const DEFAULT_TIER_AMOUNT: u64 = 1;

/// First selector nonce handed out by a fresh engine.
pub const GENESIS_NONCE: u64 = 0;
