//! # Rate Limiter & Pause Switch
//!
//! Per-actor cooldowns and independent pause flags.
//!
//! `check` is read-only so adapters can preflight without touching state;
//! `record` is only called once a ritual has fully succeeded.

use std::collections::BTreeMap;

use pyre_shared::{ActorId, PauseFlag, RitualKind, Tick};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Cooldown view for one actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
    /// Tick of the last successful ritual, if any.
    pub last_operation: Option<Tick>,
    /// Ticks until the next ritual is allowed. Zero means ready.
    pub remaining: Tick,
}

impl CooldownStatus {
    /// Returns true if the actor may perform a ritual now.
    #[inline]
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.remaining == 0
    }
}

/// Last-operation tick per actor.
///
/// Entries are created on an actor's first successful ritual and never removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownTable {
    last_operation: BTreeMap<ActorId, Tick>,
}

impl CooldownTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cooldown state of `actor` at tick `now`.
    ///
    /// A `now` earlier than the recorded tick counts as a full interval remaining.
    #[must_use]
    pub fn status(&self, actor: ActorId, now: Tick, min_interval: Tick) -> CooldownStatus {
        let Some(&last) = self.last_operation.get(&actor) else {
            return CooldownStatus {
                last_operation: None,
                remaining: 0,
            };
        };

        let remaining = if now < last {
            min_interval
        } else {
            min_interval.saturating_sub(now - last)
        };

        CooldownStatus {
            last_operation: Some(last),
            remaining,
        }
    }

    /// Fails if `actor` is still cooling down.
    ///
    /// # Errors
    ///
    /// `CooldownActive` with the ticks remaining.
    pub fn check(&self, actor: ActorId, now: Tick, min_interval: Tick) -> LedgerResult<()> {
        let status = self.status(actor, now, min_interval);
        if status.is_ready() {
            Ok(())
        } else {
            Err(LedgerError::CooldownActive {
                actor,
                remaining: status.remaining,
            })
        }
    }

    /// Records a successful ritual, returning the previous tick.
    pub fn record(&mut self, actor: ActorId, tick: Tick) -> Option<Tick> {
        self.last_operation.insert(actor, tick)
    }

    /// Puts back a value returned by [`CooldownTable::record`].
    pub(crate) fn unrecord(&mut self, actor: ActorId, previous: Option<Tick>) {
        match previous {
            Some(tick) => self.last_operation.insert(actor, tick),
            None => self.last_operation.remove(&actor),
        };
    }

    /// Number of actors with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_operation.len()
    }

    /// Returns true if nobody has performed a ritual yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_operation.is_empty()
    }

    /// Iterates (actor, last tick) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ActorId, Tick)> + '_ {
        self.last_operation.iter().map(|(actor, tick)| (*actor, *tick))
    }
}

/// The three pause flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    /// Halts everything.
    #[serde(default)]
    pub global: bool,
    /// Halts randomized sacrifices.
    #[serde(default)]
    pub sacrifices: bool,
    /// Halts deterministic conversions.
    #[serde(default)]
    pub conversions: bool,
}

impl PauseState {
    /// Reads one flag.
    #[inline]
    #[must_use]
    pub const fn is_paused(&self, flag: PauseFlag) -> bool {
        match flag {
            PauseFlag::Global => self.global,
            PauseFlag::Sacrifices => self.sacrifices,
            PauseFlag::Conversions => self.conversions,
        }
    }

    /// Sets one flag, returning its prior value.
    pub fn set(&mut self, flag: PauseFlag, paused: bool) -> bool {
        let slot = match flag {
            PauseFlag::Global => &mut self.global,
            PauseFlag::Sacrifices => &mut self.sacrifices,
            PauseFlag::Conversions => &mut self.conversions,
        };
        std::mem::replace(slot, paused)
    }

    /// Fails if `ritual` is halted by the global flag or its category flag.
    ///
    /// # Errors
    ///
    /// `Paused` naming the flag that blocked it. Global wins.
    pub fn check(&self, ritual: RitualKind) -> LedgerResult<()> {
        if self.global {
            return Err(LedgerError::Paused(PauseFlag::Global));
        }
        let flag = ritual.pause_flag();
        if self.is_paused(flag) {
            return Err(LedgerError::Paused(flag));
        }
        Ok(())
    }
}
