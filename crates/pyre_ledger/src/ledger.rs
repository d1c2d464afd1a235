//! # Token Ledger
//!
//! Owner/kind balance table with per-kind supply caps.
//!
//! ## Guarantees
//!
//! 1. **Conservation**: for every kind, `minted - burned == current == sum(balances)`
//! 2. **Caps**: `current <= max` whenever `max != 0`; an over-cap mint is rejected, never clamped
//! 3. **Fail closed**: authorization, amount and arithmetic are checked before anything is written
//!
//! The ledger knows nothing about rituals. It only asks the access registry
//! whether a caller may mint, or burn on someone else's behalf.

use std::collections::BTreeMap;

use pyre_shared::{ActorId, KindId, Role};
use serde::{Deserialize, Serialize};

use crate::access::AccessRegistry;
use crate::error::{LedgerError, LedgerResult};

/// Roles allowed to mint.
const MINT_ROLES: &[Role] = &[Role::RITUAL_EXECUTOR, Role::SHOP_MINTER];

/// Roles allowed to burn tokens they do not own.
const BURN_FROM_ROLES: &[Role] = &[Role::RITUAL_EXECUTOR];

/// A privileged ledger mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerAction {
    /// Create tokens.
    Mint,
    /// Destroy tokens held by someone other than the caller.
    BurnFrom,
}

impl LedgerAction {
    /// Roles that authorize this action.
    #[must_use]
    pub const fn required_roles(self) -> &'static [Role] {
        match self {
            Self::Mint => MINT_ROLES,
            Self::BurnFrom => BURN_FROM_ROLES,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::BurnFrom => "burn on behalf of another owner",
        }
    }
}

/// Supply bookkeeping for one kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyRecord {
    /// Units currently in existence.
    pub current: u64,
    /// Cap on `current`. Zero means unlimited.
    pub max: u64,
    /// Lifetime units minted.
    pub minted: u64,
    /// Lifetime units burned.
    pub burned: u64,
}

impl SupplyRecord {
    /// Returns true if this kind has no cap.
    #[inline]
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.max == 0
    }

    /// Units that can still be minted, or `None` if unlimited.
    #[inline]
    #[must_use]
    pub const fn headroom(&self) -> Option<u64> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.max.saturating_sub(self.current))
        }
    }
}

/// One (owner, kind, amount) row, used for export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    /// Owner.
    pub owner: ActorId,
    /// Kind.
    pub kind: KindId,
    /// Amount held.
    pub amount: u64,
}

/// Saved values of specific ledger cells, for rollback.
///
/// Only the cells named at checkpoint time are restored.
#[derive(Clone, Debug)]
pub struct LedgerCheckpoint {
    balances: Vec<((ActorId, KindId), Option<u64>)>,
    supplies: Vec<(KindId, Option<SupplyRecord>)>,
}

/// The balance table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenLedger {
    /// (owner, kind) -> amount. Zero balances are not stored.
    balances: BTreeMap<(ActorId, KindId), u64>,
    /// kind -> supply record.
    supplies: BTreeMap<KindId, SupplyRecord>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from exported rows.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the rows violate conservation or a cap.
    pub fn from_parts(
        balances: &[BalanceEntry],
        supplies: &BTreeMap<KindId, SupplyRecord>,
    ) -> LedgerResult<Self> {
        let mut ledger = Self {
            balances: BTreeMap::new(),
            supplies: supplies.clone(),
        };
        for entry in balances.iter().filter(|e| e.amount > 0) {
            ledger.balances.insert((entry.owner, entry.kind), entry.amount);
        }

        let unbalanced = ledger.unbalanced_kinds();
        if !unbalanced.is_empty() {
            return Err(LedgerError::InvalidConfig(format!(
                "ledger rows violate conservation for kinds {unbalanced:?}"
            )));
        }
        if let Some((kind, record)) = ledger
            .supplies
            .iter()
            .find(|(_, r)| !r.is_unlimited() && r.current > r.max)
        {
            return Err(LedgerError::InvalidConfig(format!(
                "kind {kind} supply {} exceeds cap {}",
                record.current, record.max
            )));
        }
        Ok(ledger)
    }

    /// Returns the balance of `owner` in `kind`.
    #[inline]
    #[must_use]
    pub fn balance_of(&self, owner: ActorId, kind: KindId) -> u64 {
        self.balances.get(&(owner, kind)).copied().unwrap_or(0)
    }

    /// Returns the supply record for `kind` (all zeros if never touched).
    #[inline]
    #[must_use]
    pub fn supply_of(&self, kind: KindId) -> SupplyRecord {
        self.supplies.get(&kind).copied().unwrap_or_default()
    }

    /// Checks that `caller` may perform `action` on `owner`'s tokens.
    ///
    /// Burning your own tokens never needs a role.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if no matching role is held.
    pub fn authorize(
        access: &AccessRegistry,
        caller: ActorId,
        owner: ActorId,
        action: LedgerAction,
    ) -> LedgerResult<()> {
        if action == LedgerAction::BurnFrom && caller == owner {
            return Ok(());
        }
        if access.has_any(action.required_roles(), caller) {
            Ok(())
        } else {
            Err(LedgerError::unauthorized(caller, action.describe()))
        }
    }

    /// Validates a mint without applying it.
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `SupplyExceeded` or `ArithmeticOverflow`.
    pub fn check_mint(&self, owner: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "mint amount must be positive".to_string(),
            });
        }

        let record = self.supply_of(kind);
        let next = record
            .current
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if !record.is_unlimited() && next > record.max {
            return Err(LedgerError::SupplyExceeded {
                kind,
                current: record.current,
                requested: amount,
                max: record.max,
            });
        }
        record
            .minted
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.balance_of(owner, kind)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Validates a burn without applying it.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` or `InsufficientBalance`.
    pub fn check_burn(&self, owner: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "burn amount must be positive".to_string(),
            });
        }

        let available = self.balance_of(owner, kind);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                owner,
                kind,
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Mints `amount` of `kind` to `owner`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidAmount`, `SupplyExceeded` or `ArithmeticOverflow`.
    /// Nothing is written on error.
    pub fn mint(
        &mut self,
        access: &AccessRegistry,
        caller: ActorId,
        owner: ActorId,
        kind: KindId,
        amount: u64,
    ) -> LedgerResult<()> {
        Self::authorize(access, caller, owner, LedgerAction::Mint)?;
        self.check_mint(owner, kind, amount)?;
        self.apply_mint(owner, kind, amount)
    }

    /// Burns `amount` of `kind` from `owner`.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidAmount` or `InsufficientBalance`.
    /// Nothing is written on error.
    pub fn burn(
        &mut self,
        access: &AccessRegistry,
        caller: ActorId,
        owner: ActorId,
        kind: KindId,
        amount: u64,
    ) -> LedgerResult<()> {
        Self::authorize(access, caller, owner, LedgerAction::BurnFrom)?;
        self.check_burn(owner, kind, amount)?;
        self.apply_burn(owner, kind, amount)
    }

    /// Credits without authorization or cap checks.
    ///
    /// Used after `check_mint` and for journal replay.
    pub(crate) fn apply_mint(&mut self, owner: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        let record = self.supply_of(kind);
        let balance = self.balance_of(owner, kind);

        let current = record.current.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        let minted = record.minted.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        let balance = balance.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;

        self.supplies.insert(
            kind,
            SupplyRecord {
                current,
                minted,
                ..record
            },
        );
        self.balances.insert((owner, kind), balance);
        Ok(())
    }

    /// Debits without authorization checks.
    ///
    /// Used after `check_burn` and for journal replay.
    pub(crate) fn apply_burn(&mut self, owner: ActorId, kind: KindId, amount: u64) -> LedgerResult<()> {
        let record = self.supply_of(kind);
        let available = self.balance_of(owner, kind);

        let balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                owner,
                kind,
                required: amount,
                available,
            })?;
        let current = record.current.checked_sub(amount).ok_or(LedgerError::ArithmeticOverflow)?;
        let burned = record.burned.checked_add(amount).ok_or(LedgerError::ArithmeticOverflow)?;

        self.supplies.insert(
            kind,
            SupplyRecord {
                current,
                burned,
                ..record
            },
        );
        if balance == 0 {
            self.balances.remove(&(owner, kind));
        } else {
            self.balances.insert((owner, kind), balance);
        }
        Ok(())
    }

    /// Replaces the cap for `kind`, returning the prior cap.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `max` is non-zero and below current supply.
    pub fn set_max_supply(&mut self, kind: KindId, max: u64) -> LedgerResult<u64> {
        let record = self.supply_of(kind);
        if max != 0 && max < record.current {
            return Err(LedgerError::InvalidConfig(format!(
                "cap {max} for kind {kind} is below current supply {}",
                record.current
            )));
        }
        self.supplies.insert(kind, SupplyRecord { max, ..record });
        Ok(record.max)
    }

    /// Saves the named cells so they can be restored later.
    #[must_use]
    pub fn checkpoint(&self, cells: &[(ActorId, KindId)]) -> LedgerCheckpoint {
        LedgerCheckpoint {
            balances: cells
                .iter()
                .map(|cell| (*cell, self.balances.get(cell).copied()))
                .collect(),
            supplies: cells
                .iter()
                .map(|(_, kind)| (*kind, self.supplies.get(kind).copied()))
                .collect(),
        }
    }

    /// Restores cells saved by [`TokenLedger::checkpoint`].
    pub fn restore(&mut self, checkpoint: &LedgerCheckpoint) {
        for (cell, saved) in &checkpoint.balances {
            match saved {
                Some(amount) => self.balances.insert(*cell, *amount),
                None => self.balances.remove(cell),
            };
        }
        for (kind, saved) in &checkpoint.supplies {
            match saved {
                Some(record) => self.supplies.insert(*kind, *record),
                None => self.supplies.remove(kind),
            };
        }
    }

    /// Sum of all balances of `kind`.
    #[must_use]
    pub fn total_held(&self, kind: KindId) -> u128 {
        self.balances
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .map(|(_, amount)| u128::from(*amount))
            .sum()
    }

    /// Kinds whose books do not balance. Empty means conservation holds.
    #[must_use]
    pub fn unbalanced_kinds(&self) -> Vec<KindId> {
        let mut kinds: Vec<KindId> = self.supplies.keys().copied().collect();
        for (_, kind) in self.balances.keys() {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        kinds
            .into_iter()
            .filter(|kind| {
                let record = self.supply_of(*kind);
                let net = i128::from(record.minted) - i128::from(record.burned);
                let held = self.total_held(*kind);
                net != i128::from(record.current) || u128::from(record.current) != held
            })
            .collect()
    }

    /// Returns true if every kind balances.
    #[must_use]
    pub fn conservation_holds(&self) -> bool {
        self.unbalanced_kinds().is_empty()
    }

    /// Exports every non-zero balance, ordered by (owner, kind).
    #[must_use]
    pub fn balance_entries(&self) -> Vec<BalanceEntry> {
        self.balances
            .iter()
            .map(|(&(owner, kind), &amount)| BalanceEntry { owner, kind, amount })
            .collect()
    }

    /// Exports every supply record.
    #[must_use]
    pub fn supply_records(&self) -> &BTreeMap<KindId, SupplyRecord> {
        &self.supplies
    }
}
